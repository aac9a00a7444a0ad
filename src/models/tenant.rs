use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The sentinel practice id substituted whenever an organization-scoped
/// caller would otherwise resolve to an empty accessible-practice set.
/// Never a real practice; its only job is to make the resulting filter
/// unsatisfiable.
pub const SENTINEL_PRACTICE_ID: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLabel {
    All,
    Organization,
    Own,
    None,
}

/// The caller of a request, already authenticated; carries whatever the
/// Access Scope Resolver needs to derive accessible practices.
#[derive(Debug, Clone)]
pub struct TenantIdentity {
    pub caller_id: Uuid,
    pub is_superuser: bool,
    pub permissions: Vec<String>,
    /// Practice ids reachable through the caller's organization membership(s).
    pub organization_practice_ids: Vec<i64>,
    pub organization_ids: Vec<Uuid>,
    pub provider_id: Option<i64>,
    pub includes_hierarchy: bool,
}

impl TenantIdentity {
    pub fn has_permission(&self, perm: &str) -> bool {
        self.is_superuser || self.permissions.iter().any(|p| p == perm)
    }
}

/// Resolved accessible scope for one request. `practice_ids: None` means
/// "no filter" (full access); `Some(vec![])` never occurs because the
/// resolver always substitutes the sentinel before returning.
#[derive(Debug, Clone)]
pub struct AccessScope {
    pub label: ScopeLabel,
    pub practice_ids: Option<Vec<i64>>,
    pub provider_id: Option<i64>,
    pub organization_ids: Vec<Uuid>,
}

impl AccessScope {
    pub fn unrestricted() -> Self {
        Self {
            label: ScopeLabel::All,
            practice_ids: None,
            provider_id: None,
            organization_ids: Vec::new(),
        }
    }

    pub fn is_fail_closed(&self) -> bool {
        matches!(self.practice_ids.as_deref(), Some([id]) if *id == SENTINEL_PRACTICE_ID)
    }
}
