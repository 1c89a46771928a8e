use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Permission bits (scoped to a domain through its role masks)
// ---------------------------------------------------------------------------

pub const PERM_NONE: u64 = 0;
pub const PERM_VIEW: u64 = 1 << 0;
pub const PERM_VIEW_PROBLEM: u64 = 1 << 1;
pub const PERM_VIEW_PROBLEM_LIST: u64 = 1 << 2;
pub const PERM_CREATE_PROBLEM_LIST: u64 = 1 << 3;
pub const PERM_EDIT_PROBLEM_LIST: u64 = 1 << 4;
pub const PERM_DELETE_PROBLEM_LIST: u64 = 1 << 5;
pub const PERM_ALL: u64 = u64::MAX;

// ---------------------------------------------------------------------------
// Builtin roles and domains
// ---------------------------------------------------------------------------

/// Role assumed for a user with no assignment in a domain.
pub const ROLE_DEFAULT: &str = "default";
pub const ROLE_ADMIN: &str = "admin";

/// The reserved domain addressed when a route carries no domain id.
pub const DOMAIN_ID_SYSTEM: &str = "system";

/// Owner of the system domain.
pub const UID_SYSTEM: i64 = -1;

// ---------------------------------------------------------------------------
// Domain record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub owner_uid: i64,
    #[serde(default)]
    pub name: String,
    /// role name -> permission bitmask.
    #[serde(default)]
    pub roles: HashMap<String, u64>,
}

impl Domain {
    /// The builtin system domain.  Not a database row; the domain store
    /// resolves it before touching storage.
    pub fn system() -> Self {
        let mut roles = HashMap::new();
        roles.insert(
            ROLE_DEFAULT.to_string(),
            PERM_VIEW | PERM_VIEW_PROBLEM | PERM_VIEW_PROBLEM_LIST,
        );
        roles.insert(ROLE_ADMIN.to_string(), PERM_ALL);
        Domain {
            id: DOMAIN_ID_SYSTEM.into(),
            owner_uid: UID_SYSTEM,
            name: "System".into(),
            roles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_domain_default_role_can_view() {
        let d = Domain::system();
        let mask = d.roles[ROLE_DEFAULT];
        assert_eq!(mask & PERM_VIEW, PERM_VIEW);
        assert_eq!(mask & PERM_EDIT_PROBLEM_LIST, 0);
    }

    #[test]
    fn admin_role_carries_every_bit() {
        let d = Domain::system();
        assert_eq!(d.roles[ROLE_ADMIN], PERM_ALL);
    }
}
