pub mod chart_definitions;
pub mod charts;
pub mod data_sources;
pub mod health;
pub mod measures;
pub mod report_cards;

use crate::error::AppError;
use crate::models::tenant::TenantIdentity;

/// Control-plane CRUD (data sources, measures, chart definitions) isn't
/// tenant-scoped by the Access Scope Resolver; it uses this one flat
/// permission check instead.
pub fn require_admin(identity: &TenantIdentity) -> Result<(), AppError> {
    if identity.is_superuser || identity.has_permission("analytics:admin") {
        Ok(())
    } else {
        Err(AppError::PermissionDenied("caller lacks analytics:admin".into()))
    }
}
