//! Automation CRUD. `flow_data` is stored exactly as the editor sent
//! it, but a graph that fails validation is rejected up front so broken
//! automations never reach the executor.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use leadflow_shared::Automation;

use crate::auth::{require_member, UserId};
use crate::error::{ApiResult, AppError};
use crate::workflows::WorkflowGraph;
use crate::AppState;

#[derive(Deserialize)]
pub struct AutomationCreate {
    pub name: String,
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_config: Value,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub flow_data: Value,
}

#[derive(Deserialize)]
pub struct AutomationUpdate {
    pub name: Option<String>,
    pub trigger_config: Option<Value>,
    pub is_active: Option<bool>,
    pub flow_data: Option<Value>,
}

fn default_active() -> bool {
    true
}

pub fn automation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_automations).post(create_automation))
        .route(
            "/:id",
            get(get_automation)
                .put(update_automation)
                .delete(delete_automation),
        )
}

fn validate_flow(flow_data: &Value) -> Result<(), AppError> {
    WorkflowGraph::parse(flow_data)
        .map(|_| ())
        .map_err(|err| AppError::validation_single("flow_data", err.to_string()))
}

async fn list_automations(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<Uuid>,
    UserId(user_id): UserId,
) -> ApiResult<Json<Vec<Automation>>> {
    require_member(&state.pool, workspace_id, user_id).await?;
    let automations = sqlx::query_as::<_, Automation>(
        "SELECT * FROM automations WHERE workspace_id = $1 ORDER BY created_at DESC",
    )
    .bind(workspace_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(automations))
}

async fn get_automation(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, automation_id)): Path<(Uuid, Uuid)>,
    UserId(user_id): UserId,
) -> ApiResult<Json<Automation>> {
    require_member(&state.pool, workspace_id, user_id).await?;
    let automation = fetch_automation(&state, workspace_id, automation_id).await?;
    Ok(Json(automation))
}

async fn create_automation(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<Uuid>,
    UserId(user_id): UserId,
    Json(body): Json<AutomationCreate>,
) -> ApiResult<(StatusCode, Json<Automation>)> {
    require_member(&state.pool, workspace_id, user_id).await?;

    if body.name.trim().is_empty() {
        return Err(AppError::validation_single("name", "name must not be empty"));
    }
    if body.trigger_type != "form_submission" {
        return Err(AppError::validation_single(
            "trigger_type",
            "unsupported trigger type",
        ));
    }
    validate_flow(&body.flow_data)?;

    let automation = sqlx::query_as::<_, Automation>(
        "INSERT INTO automations (id, workspace_id, name, trigger_type, trigger_config, is_active, flow_data)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(workspace_id)
    .bind(body.name.trim())
    .bind(&body.trigger_type)
    .bind(&body.trigger_config)
    .bind(body.is_active)
    .bind(&body.flow_data)
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(automation)))
}

async fn update_automation(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, automation_id)): Path<(Uuid, Uuid)>,
    UserId(user_id): UserId,
    Json(body): Json<AutomationUpdate>,
) -> ApiResult<Json<Automation>> {
    require_member(&state.pool, workspace_id, user_id).await?;

    let existing = fetch_automation(&state, workspace_id, automation_id).await?;

    let name = body.name.unwrap_or(existing.name);
    if name.trim().is_empty() {
        return Err(AppError::validation_single("name", "name must not be empty"));
    }
    let trigger_config = body.trigger_config.unwrap_or(existing.trigger_config);
    let is_active = body.is_active.unwrap_or(existing.is_active);
    let flow_data = body.flow_data.unwrap_or(existing.flow_data);
    validate_flow(&flow_data)?;

    let automation = sqlx::query_as::<_, Automation>(
        "UPDATE automations
         SET name = $3, trigger_config = $4, is_active = $5, flow_data = $6, updated_at = NOW()
         WHERE workspace_id = $1 AND id = $2
         RETURNING *",
    )
    .bind(workspace_id)
    .bind(automation_id)
    .bind(name.trim())
    .bind(&trigger_config)
    .bind(is_active)
    .bind(&flow_data)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(automation))
}

async fn delete_automation(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, automation_id)): Path<(Uuid, Uuid)>,
    UserId(user_id): UserId,
) -> ApiResult<StatusCode> {
    require_member(&state.pool, workspace_id, user_id).await?;
    let result = sqlx::query("DELETE FROM automations WHERE workspace_id = $1 AND id = $2")
        .bind(workspace_id)
        .bind(automation_id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Automation".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_automation(
    state: &AppState,
    workspace_id: Uuid,
    automation_id: Uuid,
) -> Result<Automation, AppError> {
    sqlx::query_as::<_, Automation>(
        "SELECT * FROM automations WHERE workspace_id = $1 AND id = $2",
    )
    .bind(workspace_id)
    .bind(automation_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Automation".to_string()))
}
