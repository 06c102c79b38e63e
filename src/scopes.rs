//! Scope grants embedded in access tokens, derived from role and status.

use crate::identity::{AccountStatus, Role};

/// Scopes granted to a principal. Non-active identities only ever get
/// enough to finish onboarding.
#[must_use]
pub fn scopes_for(role: Role, status: AccountStatus) -> Vec<String> {
    let scopes: &[&str] = match (role, status) {
        (Role::Admin, AccountStatus::Active) => {
            &["admin:users", "admin:vendors", "admin:sessions"]
        }
        (Role::User, AccountStatus::Active) => {
            &["profile:read", "profile:write", "orders:create"]
        }
        (Role::Vendor, AccountStatus::Active) => &[
            "profile:read",
            "profile:write",
            "catalog:manage",
            "orders:fulfill",
        ],
        (Role::Vendor, AccountStatus::Pending) => &["profile:read"],
        (_, AccountStatus::Incomplete) => &["profile:complete"],
        _ => &[],
    };
    scopes.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::scopes_for;
    use crate::identity::{AccountStatus, Role};

    #[test]
    fn active_vendor_gets_catalog_scopes() {
        let scopes = scopes_for(Role::Vendor, AccountStatus::Active);
        assert!(scopes.contains(&"catalog:manage".to_string()));
    }

    #[test]
    fn pending_vendor_is_read_only() {
        assert_eq!(scopes_for(Role::Vendor, AccountStatus::Pending), vec!["profile:read"]);
    }

    #[test]
    fn blocked_identity_gets_nothing() {
        assert!(scopes_for(Role::User, AccountStatus::Blocked).is_empty());
        assert!(scopes_for(Role::Admin, AccountStatus::Blocked).is_empty());
    }

    #[test]
    fn incomplete_identity_can_only_finish_onboarding() {
        assert_eq!(
            scopes_for(Role::User, AccountStatus::Incomplete),
            vec!["profile:complete"]
        );
    }
}
