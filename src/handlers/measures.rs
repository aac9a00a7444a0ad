use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::require_admin;
use crate::auth::Identity;
use crate::error::{AppError, AppResult};
use crate::models::measure::{CreateMeasureRequest, MeasureConfig, UpdateMeasureRequest};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListMeasuresQuery {
    pub data_source_id: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Query(q): Query<ListMeasuresQuery>,
) -> AppResult<Json<Vec<MeasureConfig>>> {
    require_admin(&identity)?;
    let measures = state.config_db.list_measures(q.data_source_id).map_err(AppError::Internal)?;
    Ok(Json(measures))
}

pub async fn get(State(state): State<AppState>, Identity(identity): Identity, Path(id): Path<i64>) -> AppResult<Json<MeasureConfig>> {
    require_admin(&identity)?;
    let measure = state.config_db.get_measure(id).map_err(AppError::Internal)?.ok_or_else(|| AppError::MeasureNotFound(id.to_string()))?;
    Ok(Json(measure))
}

fn format_kind_str(kind: crate::models::measure::FormatKind) -> &'static str {
    match kind {
        crate::models::measure::FormatKind::Number => "number",
        crate::models::measure::FormatKind::Currency => "currency",
        crate::models::measure::FormatKind::Percentage => "percentage",
    }
}

pub async fn create(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<CreateMeasureRequest>,
) -> AppResult<Json<MeasureConfig>> {
    require_admin(&identity)?;
    if state.config_db.get_measure_by_name(&req.name).map_err(AppError::Internal)?.is_some() {
        return Err(AppError::MeasureDuplicate(req.name));
    }
    let id = state
        .config_db
        .create_measure(
            &req.name,
            &req.display_name,
            req.weight,
            req.higher_is_better,
            format_kind_str(req.format_kind),
            req.data_source_id,
            &req.value_column,
            &req.filter_criteria,
        )
        .map_err(AppError::Internal)?;
    let measure = state.config_db.get_measure(id).map_err(AppError::Internal)?.ok_or_else(|| AppError::MeasureNotFound(id.to_string()))?;
    Ok(Json(measure))
}

pub async fn update(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(id): Path<i64>,
    Json(req): Json<UpdateMeasureRequest>,
) -> AppResult<Json<MeasureConfig>> {
    require_admin(&identity)?;
    let format_kind = req.format_kind.map(format_kind_str);
    let updated = state
        .config_db
        .update_measure(id, req.display_name.as_deref(), req.weight, req.higher_is_better, format_kind, req.is_active)
        .map_err(AppError::Internal)?;
    if !updated {
        return Err(AppError::MeasureNotFound(id.to_string()));
    }
    let measure = state.config_db.get_measure(id).map_err(AppError::Internal)?.ok_or_else(|| AppError::MeasureNotFound(id.to_string()))?;
    Ok(Json(measure))
}

pub async fn delete(State(state): State<AppState>, Identity(identity): Identity, Path(id): Path<i64>) -> AppResult<Json<serde_json::Value>> {
    require_admin(&identity)?;
    let deleted = state.config_db.delete_measure(id).map_err(AppError::Internal)?;
    if !deleted {
        return Err(AppError::MeasureNotFound(id.to_string()));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
