use axum::extract::{Path, State};
use axum::Json;

use super::require_admin;
use crate::auth::Identity;
use crate::error::{AppError, AppResult};
use crate::models::chart::{ChartDefinition, CreateChartDefinitionRequest, UpdateChartDefinitionRequest};
use crate::AppState;

pub async fn list(State(state): State<AppState>, Identity(identity): Identity) -> AppResult<Json<Vec<ChartDefinition>>> {
    require_admin(&identity)?;
    let definitions = state.config_db.list_chart_definitions().map_err(AppError::Internal)?;
    Ok(Json(definitions))
}

pub async fn get(State(state): State<AppState>, Identity(identity): Identity, Path(id): Path<i64>) -> AppResult<Json<ChartDefinition>> {
    require_admin(&identity)?;
    let definition = state
        .config_db
        .get_chart_definition(id)
        .map_err(AppError::Internal)?
        .ok_or(AppError::ChartDefinitionNotFound(id))?;
    Ok(Json(definition))
}

pub async fn create(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<CreateChartDefinitionRequest>,
) -> AppResult<Json<ChartDefinition>> {
    require_admin(&identity)?;
    let id = state
        .config_db
        .create_chart_definition(&req.chart_type, req.data_source_id, &req.chart_config)
        .map_err(AppError::Internal)?;
    let definition = state
        .config_db
        .get_chart_definition(id)
        .map_err(AppError::Internal)?
        .ok_or(AppError::ChartDefinitionNotFound(id))?;
    Ok(Json(definition))
}

pub async fn update(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(id): Path<i64>,
    Json(req): Json<UpdateChartDefinitionRequest>,
) -> AppResult<Json<ChartDefinition>> {
    require_admin(&identity)?;
    let updated = state
        .config_db
        .update_chart_definition(id, req.chart_type.as_deref(), req.chart_config.as_ref(), req.is_active)
        .map_err(AppError::Internal)?;
    if !updated {
        return Err(AppError::ChartDefinitionNotFound(id));
    }
    let definition = state
        .config_db
        .get_chart_definition(id)
        .map_err(AppError::Internal)?
        .ok_or(AppError::ChartDefinitionNotFound(id))?;
    Ok(Json(definition))
}

pub async fn delete(State(state): State<AppState>, Identity(identity): Identity, Path(id): Path<i64>) -> AppResult<Json<serde_json::Value>> {
    require_admin(&identity)?;
    let deleted = state.config_db.delete_chart_definition(id).map_err(AppError::Internal)?;
    if !deleted {
        return Err(AppError::ChartDefinitionNotFound(id));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
