use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::auth::Identity;
use crate::error::{AppError, AppResult};
use crate::models::chart::{ChartConfig, OrchestrationResult, RuntimeFilters};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OrchestrateChartRequest {
    pub chart_definition_id: Option<i64>,
    pub config: Option<ChartConfig>,
    #[serde(default)]
    pub overrides: RuntimeFilters,
}

/// Single entry point for both stored-definition and inline ad-hoc
/// charts; exactly one of `chart_definition_id` / `config` must be set.
pub async fn orchestrate_chart(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<OrchestrateChartRequest>,
) -> AppResult<Json<OrchestrationResult>> {
    let result = match (req.chart_definition_id, req.config) {
        (Some(id), None) => {
            state
                .orchestrator
                .orchestrate_by_definition(&identity, id, req.overrides)
                .await?
        }
        (None, Some(config)) => {
            state.orchestrator.orchestrate_inline(&identity, config, req.overrides).await?
        }
        _ => {
            return Err(AppError::InvalidConfig(
                "exactly one of chart_definition_id or config must be set".to_string(),
            ))
        }
    };
    Ok(Json(result))
}
