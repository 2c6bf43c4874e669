//! Public form submission ingestion.
//!
//! The endpoint reports success as soon as the raw submission row is
//! persisted. Lead extraction, scoring and automation runs happen off
//! the request path; a slow CRM webhook or SMTP server never stalls a
//! form post.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use leadflow_shared::{FormField, LeadSourceType};

use crate::error::{ApiResult, AppError};
use crate::leads::{extract, FindOrCreateOutcome, SourceMeta};
use crate::AppState;

#[derive(Deserialize)]
pub struct SubmissionBody {
    pub submission_data: Map<String, Value>,
    /// Client-supplied id makes ingestion retries idempotent.
    pub submission_id: Option<Uuid>,
    pub utm: Option<Value>,
}

#[derive(Serialize)]
pub struct SubmissionAccepted {
    pub id: Uuid,
}

#[derive(sqlx::FromRow)]
struct FormRow {
    id: Uuid,
    workspace_id: Uuid,
    fields: Value,
}

pub fn submission_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:form_id/submissions", post(ingest_submission))
}

async fn ingest_submission(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<Uuid>,
    Json(body): Json<SubmissionBody>,
) -> ApiResult<(StatusCode, Json<SubmissionAccepted>)> {
    let form = sqlx::query_as::<_, FormRow>(
        "SELECT id, workspace_id, fields FROM forms WHERE id = $1",
    )
    .bind(form_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Form".to_string()))?;

    let submission_id = body.submission_id.unwrap_or_else(Uuid::new_v4);
    sqlx::query(
        "INSERT INTO form_submissions (id, form_id, data, utm)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(submission_id)
    .bind(form.id)
    .bind(Value::Object(body.submission_data.clone()))
    .bind(&body.utm)
    .execute(&state.pool)
    .await?;

    tokio::spawn(process_submission(
        state.clone(),
        form,
        submission_id,
        body.submission_data,
        body.utm,
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmissionAccepted { id: submission_id }),
    ))
}

/// The async half of the pipeline: extract, dedupe-or-create, enrich,
/// then hand off to the automation engine. Every failure here is
/// logged and dropped; the submission itself is already durable.
async fn process_submission(
    state: Arc<AppState>,
    form: FormRow,
    submission_id: Uuid,
    submission: Map<String, Value>,
    utm: Option<Value>,
) {
    let schema: Option<Vec<FormField>> = serde_json::from_value(form.fields).ok();
    let extracted = extract(&submission, schema.as_deref());

    let source = SourceMeta {
        source_type: LeadSourceType::Form,
        source_id: Some(submission_id),
        utm,
    };

    let outcome = match state
        .repo
        .find_or_create(form.workspace_id, &extracted, &submission, &source)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(%submission_id, "lead processing failed: {}", err);
            return;
        }
    };

    let lead = match outcome {
        FindOrCreateOutcome::SkippedNoIdentity => {
            info!(%submission_id, "submission has no email; raw submission kept only");
            return;
        }
        FindOrCreateOutcome::Created(lead) => {
            if state.enrichment.is_enabled() {
                if let Some(analysis) = state.enrichment.analyze(&lead).await {
                    if let Err(err) = state.repo.merge_ai_analysis(lead.id, analysis).await {
                        error!(lead_id = %lead.id, "failed to store enrichment: {}", err);
                    }
                }
            }
            lead
        }
        FindOrCreateOutcome::Existing(lead) => lead,
    };

    state
        .engine
        .handle_form_submission(form.workspace_id, form.id, &lead, &submission)
        .await;
}
