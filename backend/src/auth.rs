//! Workspace access guard.
//!
//! Authentication itself is an upstream collaborator; requests arrive with
//! the caller identity already resolved into an `x-user-id` header. This
//! module only answers "is this user a member of this workspace" for the
//! manual lead/automation CRUD surface. The public submission endpoint is
//! intentionally unauthenticated.

use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// Caller identity extracted from the `x-user-id` header.
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Uuid);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing x-user-id header".to_string()))?;

        raw.parse::<Uuid>()
            .map(UserId)
            .map_err(|_| AppError::Unauthorized("Invalid x-user-id header".to_string()))
    }
}

/// Reject the request unless the user is a member of the workspace.
/// Fatal to this request only; no partial mutation happens after a
/// failed check.
pub async fn require_member(
    pool: &PgPool,
    workspace_id: Uuid,
    user_id: Uuid,
) -> Result<(), AppError> {
    let member: Option<(Uuid,)> = sqlx::query_as(
        "SELECT user_id FROM workspace_members WHERE workspace_id = $1 AND user_id = $2",
    )
    .bind(workspace_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match member {
        Some(_) => Ok(()),
        None => Err(AppError::Forbidden(
            "You are not a member of this workspace".to_string(),
        )),
    }
}
