//! Manual lead management surface for the dashboard. Every route is
//! guarded by workspace membership.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use leadflow_shared::{Lead, LeadEvent};

use crate::auth::{require_member, UserId};
use crate::error::{ApiResult, AppError};
use crate::leads::ManualLead;
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::AppState;

#[derive(Deserialize)]
pub struct LeadListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub status: Option<String>,
}

impl LeadListQuery {
    fn pagination(&self) -> PaginationParams {
        let defaults = PaginationParams::default();
        PaginationParams {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
    }
}

#[derive(Deserialize)]
pub struct LeadCreate {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
}

#[derive(Deserialize)]
pub struct TagsBody {
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
pub struct StatusBody {
    pub status: String,
}

#[derive(Deserialize)]
pub struct ScoreBody {
    pub score: i32,
    pub reason: String,
}

pub fn lead_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_leads).post(create_lead))
        .route("/:id", get(get_lead).delete(delete_lead))
        .route("/:id/events", get(lead_events))
        .route("/:id/tags", post(add_tags))
        .route("/:id/tags/:tag", delete(remove_tag))
        .route("/:id/status", put(set_status))
        .route("/:id/score", put(override_score))
}

async fn list_leads(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<Uuid>,
    UserId(user_id): UserId,
    Query(params): Query<LeadListQuery>,
) -> ApiResult<Json<PaginatedResponse<Lead>>> {
    require_member(&state.pool, workspace_id, user_id).await?;

    let pagination = params.pagination();
    let (leads, total) = state
        .repo
        .list(
            workspace_id,
            &pagination,
            params.search.as_deref(),
            params.status.as_deref(),
        )
        .await?;
    Ok(Json(PaginatedResponse::new(leads, &pagination, total)))
}

async fn create_lead(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<Uuid>,
    UserId(user_id): UserId,
    Json(body): Json<LeadCreate>,
) -> ApiResult<(StatusCode, Json<Lead>)> {
    require_member(&state.pool, workspace_id, user_id).await?;

    let email = body.email.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation_single("email", "a valid email is required"));
    }

    let entry = ManualLead {
        email,
        name: body.name,
        phone: body.phone,
        company: body.company,
        job_title: body.job_title,
    };
    match state.repo.create_manual(workspace_id, &entry).await? {
        Some(lead) => Ok((StatusCode::CREATED, Json(lead))),
        None => Err(AppError::Conflict(
            "A lead with this email already exists in the workspace".to_string(),
        )),
    }
}

async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, lead_id)): Path<(Uuid, Uuid)>,
    UserId(user_id): UserId,
) -> ApiResult<Json<Lead>> {
    require_member(&state.pool, workspace_id, user_id).await?;
    let lead = state.repo.get(workspace_id, lead_id).await?;
    Ok(Json(lead))
}

async fn lead_events(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, lead_id)): Path<(Uuid, Uuid)>,
    UserId(user_id): UserId,
) -> ApiResult<Json<Vec<LeadEvent>>> {
    require_member(&state.pool, workspace_id, user_id).await?;
    // 404 instead of an empty history for a foreign lead id.
    state.repo.get(workspace_id, lead_id).await?;
    let events = state.repo.events(lead_id).await?;
    Ok(Json(events))
}

async fn add_tags(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, lead_id)): Path<(Uuid, Uuid)>,
    UserId(user_id): UserId,
    Json(body): Json<TagsBody>,
) -> ApiResult<Json<Lead>> {
    require_member(&state.pool, workspace_id, user_id).await?;
    if body.tags.iter().all(|t| t.trim().is_empty()) {
        return Err(AppError::validation_single("tags", "at least one non-empty tag required"));
    }
    state.repo.get(workspace_id, lead_id).await?;
    let lead = state.repo.add_tags(lead_id, &body.tags).await?;
    Ok(Json(lead))
}

async fn remove_tag(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, lead_id, tag)): Path<(Uuid, Uuid, String)>,
    UserId(user_id): UserId,
) -> ApiResult<Json<Lead>> {
    require_member(&state.pool, workspace_id, user_id).await?;
    state.repo.get(workspace_id, lead_id).await?;
    let lead = state.repo.remove_tag(lead_id, &tag).await?;
    Ok(Json(lead))
}

async fn set_status(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, lead_id)): Path<(Uuid, Uuid)>,
    UserId(user_id): UserId,
    Json(body): Json<StatusBody>,
) -> ApiResult<Json<Lead>> {
    require_member(&state.pool, workspace_id, user_id).await?;
    if body.status.trim().is_empty() {
        return Err(AppError::validation_single("status", "status must not be empty"));
    }
    state.repo.get(workspace_id, lead_id).await?;
    let lead = state.repo.set_status(lead_id, body.status.trim()).await?;
    Ok(Json(lead))
}

async fn override_score(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, lead_id)): Path<(Uuid, Uuid)>,
    UserId(user_id): UserId,
    Json(body): Json<ScoreBody>,
) -> ApiResult<Json<Lead>> {
    require_member(&state.pool, workspace_id, user_id).await?;
    if !(0..=100).contains(&body.score) {
        return Err(AppError::validation_single("score", "score must be between 0 and 100"));
    }
    state.repo.get(workspace_id, lead_id).await?;
    let lead = state
        .repo
        .override_score(lead_id, body.score, &body.reason)
        .await?;
    Ok(Json(lead))
}

async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, lead_id)): Path<(Uuid, Uuid)>,
    UserId(user_id): UserId,
) -> ApiResult<StatusCode> {
    require_member(&state.pool, workspace_id, user_id).await?;
    if state.repo.delete(workspace_id, lead_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Lead".to_string()))
    }
}
