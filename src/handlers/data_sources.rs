use axum::extract::{Path, State};
use axum::Json;

use super::require_admin;
use crate::auth::Identity;
use crate::error::{AppError, AppResult};
use crate::models::data_source::{CreateDataSourceRequest, DataSourceDescriptor, UpdateDataSourceRequest};
use crate::AppState;

pub async fn list(State(state): State<AppState>, Identity(identity): Identity) -> AppResult<Json<Vec<DataSourceDescriptor>>> {
    require_admin(&identity)?;
    let sources = state.config_db.list_data_sources().map_err(AppError::Internal)?;
    Ok(Json(sources))
}

pub async fn get(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(id): Path<i64>,
) -> AppResult<Json<DataSourceDescriptor>> {
    require_admin(&identity)?;
    let source = state.config_db.get_data_source(id).map_err(AppError::Internal)?.ok_or(AppError::DataSourceNotFound(id))?;
    Ok(Json(source))
}

pub async fn create(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<CreateDataSourceRequest>,
) -> AppResult<Json<DataSourceDescriptor>> {
    require_admin(&identity)?;
    let id = state
        .config_db
        .create_data_source(&req.logical_name, &req.schema_name, &req.table_name, &req.column_catalog)
        .map_err(AppError::Internal)?;
    let source = state.config_db.get_data_source(id).map_err(AppError::Internal)?.ok_or(AppError::DataSourceNotFound(id))?;
    Ok(Json(source))
}

pub async fn update(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(id): Path<i64>,
    Json(req): Json<UpdateDataSourceRequest>,
) -> AppResult<Json<DataSourceDescriptor>> {
    require_admin(&identity)?;
    let updated = state
        .config_db
        .update_data_source(id, req.logical_name.as_deref(), req.column_catalog.as_deref(), req.is_active)
        .map_err(AppError::Internal)?;
    if !updated {
        return Err(AppError::DataSourceNotFound(id));
    }
    if let Some(cache) = &state.cache {
        cache.invalidate_data_source(id);
    }
    let source = state.config_db.get_data_source(id).map_err(AppError::Internal)?.ok_or(AppError::DataSourceNotFound(id))?;
    Ok(Json(source))
}

pub async fn delete(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    require_admin(&identity)?;
    let deleted = state.config_db.delete_data_source(id).map_err(AppError::Internal)?;
    if !deleted {
        return Err(AppError::DataSourceNotFound(id));
    }
    if let Some(cache) = &state.cache {
        cache.invalidate_data_source(id);
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
