//! Action handlers for workflow nodes.
//!
//! Each handler is one narrow capability. The live dispatcher writes
//! tag/status mutations through the lead repository so every side
//! effect lands in the lead's event log; webhook and email calls go out
//! under bounded timeouts and are never retried within a run.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use leadflow_shared::Lead;

use super::graph::EmailConfig;
use crate::leads::LeadRepository;
use crate::services::{render_merge_tags, EmailService};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("webhook call failed: {0}")]
    Webhook(String),
    #[error("email dispatch failed: {0}")]
    Email(String),
}

/// Everything a handler may need about the run it executes in.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub automation_id: Uuid,
    pub workspace_id: Uuid,
    pub lead: Lead,
    /// The triggering submission, keyed by field id
    pub trigger: Map<String, Value>,
}

impl RunContext {
    /// Merge-tag render context: `{{lead.*}}` and `{{trigger.*}}`.
    pub fn render_context(&self) -> Value {
        json!({
            "lead": {
                "email": self.lead.email,
                "name": self.lead.name,
                "company": self.lead.company,
                "job_title": self.lead.job_title,
                "score": self.lead.score,
                "status": self.lead.status,
            },
            "trigger": Value::Object(self.trigger.clone()),
        })
    }
}

/// Pluggable action execution, one method per action node type. Delay
/// nodes are not dispatched here; the executor persists their
/// continuation itself.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn add_tags(&self, ctx: &RunContext, tags: &[String]) -> Result<(), ActionError>;
    async fn set_status(&self, ctx: &RunContext, status: &str) -> Result<(), ActionError>;
    async fn send_webhook(&self, ctx: &RunContext, url: &str) -> Result<(), ActionError>;
    async fn send_email(&self, ctx: &RunContext, config: &EmailConfig) -> Result<(), ActionError>;
}

/// Production dispatcher backed by the repository, an SMTP transport
/// and a shared HTTP client.
pub struct LiveDispatcher {
    repo: LeadRepository,
    email: Option<EmailService>,
    http: reqwest::Client,
}

impl LiveDispatcher {
    pub fn new(
        repo: LeadRepository,
        email: Option<EmailService>,
        webhook_timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(webhook_timeout)
            .build()
            .unwrap_or_default();
        Self { repo, email, http }
    }
}

#[async_trait]
impl ActionDispatcher for LiveDispatcher {
    async fn add_tags(&self, ctx: &RunContext, tags: &[String]) -> Result<(), ActionError> {
        self.repo.add_tags(ctx.lead.id, tags).await?;
        Ok(())
    }

    async fn set_status(&self, ctx: &RunContext, status: &str) -> Result<(), ActionError> {
        self.repo.set_status(ctx.lead.id, status).await?;
        Ok(())
    }

    async fn send_webhook(&self, ctx: &RunContext, url: &str) -> Result<(), ActionError> {
        let payload = json!({
            "automation_id": ctx.automation_id,
            "workspace_id": ctx.workspace_id,
            "lead": ctx.lead,
            "trigger": Value::Object(ctx.trigger.clone()),
        });

        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ActionError::Webhook(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ActionError::Webhook(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        info!(lead_id = %ctx.lead.id, url, "webhook delivered");
        Ok(())
    }

    async fn send_email(&self, ctx: &RunContext, config: &EmailConfig) -> Result<(), ActionError> {
        let email = self
            .email
            .as_ref()
            .ok_or_else(|| ActionError::Email("SMTP is not configured".to_string()))?;

        let render_ctx = ctx.render_context();
        let to = config
            .to
            .as_deref()
            .map(|t| render_merge_tags(t, &render_ctx))
            .unwrap_or_else(|| ctx.lead.email.clone());
        let subject = render_merge_tags(&config.subject, &render_ctx);
        let body = render_merge_tags(&config.body, &render_ctx);

        email
            .send_email(&to, &subject, &body)
            .await
            .map_err(|e| ActionError::Email(e.to_string()))?;
        Ok(())
    }
}
