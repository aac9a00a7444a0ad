use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use uuid::Uuid;

use crate::models::tenant::TenantIdentity;

/// Session issuance is someone else's problem; this service trusts the
/// identity headers an upstream gateway attaches to every request and
/// only derives access scope from them.
pub struct Identity(pub TenantIdentity);

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name)?.to_str().ok()
}

fn csv_ids(value: &str) -> Vec<i64> {
    value.split(',').filter_map(|s| s.trim().parse().ok()).collect()
}

fn csv_uuids(value: &str) -> Vec<Uuid> {
    value.split(',').filter_map(|s| Uuid::parse_str(s.trim()).ok()).collect()
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller_id = header_str(parts, "x-caller-id")
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing or invalid x-caller-id"))?;

        let is_superuser = header_str(parts, "x-is-superuser")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(false);

        let permissions = header_str(parts, "x-permissions")
            .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        let organization_practice_ids = header_str(parts, "x-organization-practice-ids")
            .map(csv_ids)
            .unwrap_or_default();

        let organization_ids = header_str(parts, "x-organization-ids").map(csv_uuids).unwrap_or_default();

        let provider_id = header_str(parts, "x-provider-id").and_then(|s| s.parse().ok());

        let includes_hierarchy = header_str(parts, "x-includes-hierarchy")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(false);

        Ok(Identity(TenantIdentity {
            caller_id,
            is_superuser,
            permissions,
            organization_practice_ids,
            organization_ids,
            provider_id,
            includes_hierarchy,
        }))
    }
}
