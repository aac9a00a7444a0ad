use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::AppState;

pub async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let warehouse_ok = state.ch.query("SELECT 1").execute().await.is_ok();
    Json(json!({
        "status": if warehouse_ok { "ok" } else { "degraded" },
        "warehouse": warehouse_ok,
    }))
}
