use crate::audit::AuditTracker;
use crate::models::tenant::{AccessScope, ScopeLabel, TenantIdentity, SENTINEL_PRACTICE_ID};

/// Derives the set of practices a caller may see. Rule order matters:
/// the first matching permission wins, and an organization-scoped caller
/// with no reachable practices is fail-closed rather than unfiltered.
pub struct AccessScopeResolver {
    audit: AuditTracker,
}

impl AccessScopeResolver {
    pub fn new(audit: AuditTracker) -> Self {
        Self { audit }
    }

    pub fn resolve(&self, identity: &TenantIdentity) -> AccessScope {
        if identity.is_superuser || identity.has_permission("read:all") {
            return AccessScope {
                label: ScopeLabel::All,
                practice_ids: None,
                provider_id: None,
                organization_ids: identity.organization_ids.clone(),
            };
        }

        if identity.has_permission("read:organization") {
            let practice_ids = if identity.organization_practice_ids.is_empty() {
                self.audit.fail_closed(
                    "access_scope_resolver",
                    "organization-scoped caller resolved to empty practice set",
                );
                vec![SENTINEL_PRACTICE_ID]
            } else {
                identity.organization_practice_ids.clone()
            };
            return AccessScope {
                label: ScopeLabel::Organization,
                practice_ids: Some(practice_ids),
                provider_id: None,
                organization_ids: identity.organization_ids.clone(),
            };
        }

        if identity.has_permission("read:own") {
            return AccessScope {
                label: ScopeLabel::Own,
                practice_ids: Some(vec![]),
                provider_id: identity.provider_id,
                organization_ids: Vec::new(),
            };
        }

        self.audit.fail_closed(
            "access_scope_resolver",
            "caller holds no recognized read permission",
        );
        AccessScope {
            label: ScopeLabel::None,
            practice_ids: Some(vec![SENTINEL_PRACTICE_ID]),
            provider_id: None,
            organization_ids: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(perms: &[&str]) -> TenantIdentity {
        TenantIdentity {
            caller_id: uuid::Uuid::nil(),
            is_superuser: false,
            permissions: perms.iter().map(|s| s.to_string()).collect(),
            organization_practice_ids: Vec::new(),
            organization_ids: Vec::new(),
            provider_id: None,
            includes_hierarchy: false,
        }
    }

    #[test]
    fn superuser_gets_unrestricted_scope() {
        let resolver = AccessScopeResolver::new(AuditTracker::noop());
        let mut id = identity(&[]);
        id.is_superuser = true;
        let scope = resolver.resolve(&id);
        assert_eq!(scope.label, ScopeLabel::All);
        assert!(scope.practice_ids.is_none());
    }

    #[test]
    fn empty_org_practice_set_is_fail_closed() {
        let resolver = AccessScopeResolver::new(AuditTracker::noop());
        let id = identity(&["read:organization"]);
        let scope = resolver.resolve(&id);
        assert!(scope.is_fail_closed());
    }

    #[test]
    fn org_scope_with_practices_is_not_fail_closed() {
        let resolver = AccessScopeResolver::new(AuditTracker::noop());
        let mut id = identity(&["read:organization"]);
        id.organization_practice_ids = vec![10, 20, 30];
        let scope = resolver.resolve(&id);
        assert!(!scope.is_fail_closed());
        assert_eq!(scope.practice_ids, Some(vec![10, 20, 30]));
    }

    #[test]
    fn no_permission_is_fail_closed() {
        let resolver = AccessScopeResolver::new(AuditTracker::noop());
        let id = identity(&[]);
        let scope = resolver.resolve(&id);
        assert_eq!(scope.label, ScopeLabel::None);
        assert!(scope.is_fail_closed());
    }
}
