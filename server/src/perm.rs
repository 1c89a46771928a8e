use shared::types::domain::{PERM_NONE, ROLE_DEFAULT};
use shared::types::{Domain, User, UserFacingError};

// ---------------------------------------------------------------------------
// Permission / privilege resolution
// ---------------------------------------------------------------------------
//
// Permissions are domain-scoped: the user's role inside the domain maps
// to a bitmask through the domain's role table.  Privileges are global
// bits on the user record and ignore the domain entirely.

/// The user's role inside `domain_id`, falling back to the default role.
pub fn effective_role<'a>(user: &'a User, domain_id: &str) -> &'a str {
    user.roles.get(domain_id).map(String::as_str).unwrap_or(ROLE_DEFAULT)
}

/// The permission bitmask the domain grants to `role`; no entry means
/// no permissions.
pub fn permission_mask(domain: &Domain, role: &str) -> u64 {
    domain.roles.get(role).copied().unwrap_or(PERM_NONE)
}

/// Whether the user holds every bit of `perm` in `domain`.  The domain
/// owner bypasses the role mask unconditionally.
pub fn has_perm(user: &User, domain: &Domain, perm: u64) -> bool {
    let role = effective_role(user, &domain.id);
    let mask = permission_mask(domain, role);
    (perm & mask) == perm || domain.owner_uid == user.uid
}

pub fn check_perm(user: &User, domain: &Domain, perm: u64) -> Result<(), UserFacingError> {
    if has_perm(user, domain, perm) {
        Ok(())
    } else {
        Err(UserFacingError::PermissionDenied(perm))
    }
}

/// Whether the user holds every bit of the global privilege `priv_bit`.
pub fn has_priv(user: &User, priv_bit: u64) -> bool {
    (priv_bit & user.priv_bits) == priv_bit
}

pub fn check_priv(user: &User, priv_bit: u64) -> Result<(), UserFacingError> {
    if has_priv(user, priv_bit) {
        Ok(())
    } else {
        Err(UserFacingError::PrivilegeDenied(priv_bit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::domain::{PERM_ALL, PERM_VIEW, PERM_VIEW_PROBLEM_LIST};
    use shared::types::user::PRIV_REGISTER_USER;

    fn domain_with_default_mask(mask: u64) -> Domain {
        let mut d = Domain::system();
        d.id = "numeric".into();
        d.owner_uid = 100;
        d.roles.insert(ROLE_DEFAULT.into(), mask);
        d
    }

    #[test]
    fn role_mask_grants_requested_bits() {
        let d = domain_with_default_mask(PERM_VIEW | PERM_VIEW_PROBLEM_LIST);
        let u = User::guest();
        assert!(has_perm(&u, &d, PERM_VIEW));
        assert!(has_perm(&u, &d, PERM_VIEW | PERM_VIEW_PROBLEM_LIST));
    }

    #[test]
    fn missing_bit_denies() {
        let d = domain_with_default_mask(PERM_VIEW);
        let u = User::guest();
        assert!(!has_perm(&u, &d, PERM_VIEW_PROBLEM_LIST));
        assert!(check_perm(&u, &d, PERM_VIEW_PROBLEM_LIST).is_err());
    }

    #[test]
    fn owner_bypass_is_unconditional() {
        // Owner holds every permission, including bits the role mask lacks.
        let d = domain_with_default_mask(PERM_NONE);
        let mut u = User::guest();
        u.uid = d.owner_uid;
        for perm in [PERM_VIEW, PERM_VIEW_PROBLEM_LIST, PERM_ALL] {
            assert!(has_perm(&u, &d, perm));
        }
    }

    #[test]
    fn unknown_role_has_no_permissions() {
        let mut d = domain_with_default_mask(PERM_ALL);
        d.roles.clear();
        let u = User::guest();
        assert!(!has_perm(&u, &d, PERM_VIEW));
    }

    #[test]
    fn priv_is_domain_independent() {
        let mut u = User::guest();
        u.priv_bits = PRIV_REGISTER_USER;
        assert!(has_priv(&u, PRIV_REGISTER_USER));
        assert!(check_priv(&u, u64::MAX).is_err());
    }

    #[test]
    fn check_perm_error_carries_requested_bit() {
        let d = domain_with_default_mask(PERM_NONE);
        let u = User::guest();
        let err = check_perm(&u, &d, PERM_VIEW_PROBLEM_LIST).unwrap_err();
        assert_eq!(
            err,
            shared::types::UserFacingError::PermissionDenied(PERM_VIEW_PROBLEM_LIST)
        );
    }
}
