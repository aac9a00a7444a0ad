use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::auth::Identity;
use crate::error::AppResult;
use crate::models::report_card::{AnnualReview, GradeHistoryEntry, PeerComparison, PreviousMonthSummary, ReportCard};
use crate::models::trend::TrendRow;
use crate::AppState;

pub async fn get_latest(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(organization_id): Path<String>,
) -> AppResult<Json<ReportCard>> {
    let card = state.report_cards.get_by_organization(&identity, &organization_id).await?;
    Ok(Json(card))
}

pub async fn get_for_month(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path((organization_id, month)): Path<(String, String)>,
) -> AppResult<Json<ReportCard>> {
    let card = state.report_cards.get_by_organization_and_month(&identity, &organization_id, &month).await?;
    Ok(Json(card))
}

pub async fn available_months(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(organization_id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> AppResult<Json<Vec<String>>> {
    let months = state.report_cards.available_months(&identity, &organization_id, q.limit).await?;
    Ok(Json(months))
}

pub async fn previous_month_summary(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(organization_id): Path<String>,
) -> AppResult<Json<PreviousMonthSummary>> {
    let summary = state.report_cards.previous_month_summary(&identity, &organization_id).await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_grade_history_limit")]
    pub limit: usize,
}

fn default_grade_history_limit() -> usize {
    12
}

pub async fn grade_history(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(organization_id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> AppResult<Json<Vec<GradeHistoryEntry>>> {
    let entries = state.report_cards.grade_history(&identity, &organization_id, q.limit).await?;
    Ok(Json(entries))
}

pub async fn annual_review(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(organization_id): Path<String>,
) -> AppResult<Json<AnnualReview>> {
    let review = state.report_cards.annual_review(&identity, &organization_id).await?;
    Ok(Json(review))
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    #[serde(default = "default_period")]
    pub period: String,
}

fn default_period() -> String {
    "3_month".to_string()
}

pub async fn trends_for_org(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Path(organization_id): Path<String>,
    Query(q): Query<PeriodQuery>,
) -> AppResult<Json<Vec<TrendRow>>> {
    let trends = state.report_cards.trends_by_organization(&identity, &organization_id, &q.period).await?;
    Ok(Json(trends))
}

#[derive(Debug, Deserialize)]
pub struct PeerComparisonQuery {
    pub practice_id: i64,
}

pub async fn peer_comparison(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Query(q): Query<PeerComparisonQuery>,
) -> AppResult<Json<PeerComparison>> {
    let comparison = state.report_cards.peer_comparison(&identity, q.practice_id).await?;
    Ok(Json(comparison))
}
