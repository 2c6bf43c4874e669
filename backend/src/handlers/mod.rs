pub mod automations;
pub mod leads;
pub mod submissions;

pub use automations::automation_routes;
pub use leads::lead_routes;
pub use submissions::submission_routes;

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppState;

pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, StatusCode> {
    if crate::database::health_check(&state.pool).await {
        Ok(Json(json!({ "status": "ok" })))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
