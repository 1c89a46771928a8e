use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Privilege bits (global, domain-independent)
// ---------------------------------------------------------------------------

pub const PRIV_NONE: u64 = 0;
pub const PRIV_USER_PROFILE: u64 = 1 << 0;
pub const PRIV_REGISTER_USER: u64 = 1 << 1;
pub const PRIV_SET_PRIV: u64 = 1 << 2;
pub const PRIV_CREATE_DOMAIN: u64 = 1 << 3;
pub const PRIV_ALL: u64 = u64::MAX;

/// Privileges granted to everyone, including the guest identity.
pub const PRIV_DEFAULT: u64 = PRIV_REGISTER_USER;

/// Reserved uid for the guest identity.  Never a database row.
pub const UID_GUEST: i64 = 0;

// ---------------------------------------------------------------------------
// User record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub uid: i64,
    pub uname: String,
    /// Per-domain role assignment: domain_id -> role name.
    #[serde(default)]
    pub roles: HashMap<String, String>,
    /// Global privilege bitmask.
    #[serde(rename = "priv")]
    pub priv_bits: u64,
    /// Preferred display language; falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_lang: Option<String>,
    /// argon2 PHC string.  Never serialized out.
    #[serde(default, skip_serializing)]
    pub password_hash: Option<String>,
}

impl User {
    /// The identity every request falls back to when no session resolves
    /// to an authenticated user.  Guest is a real `User` value, never a
    /// null: permission checks run against it like any other account.
    pub fn guest() -> Self {
        User {
            uid: UID_GUEST,
            uname: "Guest".into(),
            roles: HashMap::new(),
            priv_bits: PRIV_DEFAULT,
            view_lang: None,
            password_hash: None,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.uid == UID_GUEST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_has_default_priv_and_no_roles() {
        let g = User::guest();
        assert!(g.is_guest());
        assert!(g.roles.is_empty());
        assert_eq!(g.priv_bits, PRIV_DEFAULT);
    }

    #[test]
    fn password_hash_never_serialized() {
        let mut u = User::guest();
        u.password_hash = Some("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into());
        let json = serde_json::to_value(&u).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
