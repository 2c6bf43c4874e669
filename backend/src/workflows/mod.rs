//! Workflow automation: trigger matching, graph parsing and run
//! execution.
//!
//! The engine is fire-and-continue: every matched automation runs
//! independently and a failing run never affects the submission path or
//! sibling runs.

pub mod actions;
pub mod executor;
pub mod graph;
pub mod matcher;

pub use actions::{ActionDispatcher, ActionError, LiveDispatcher, RunContext};
pub use executor::{PgRunJournal, RunReport, RunState, WorkflowExecutor};
pub use graph::WorkflowGraph;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use leadflow_shared::{Automation, Lead};

use crate::leads::LeadRepository;

pub struct AutomationEngine {
    pool: PgPool,
    executor: WorkflowExecutor,
}

/// A persisted delayed continuation, due when `resume_at` passes.
#[derive(Debug, sqlx::FromRow)]
struct ResumptionRow {
    id: Uuid,
    automation_id: Uuid,
    lead_id: Uuid,
    resume_node_id: String,
    trigger_payload: Value,
    visited: Value,
    resume_at: DateTime<Utc>,
}

impl AutomationEngine {
    pub fn new(pool: PgPool, repo: LeadRepository, dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        let journal = Arc::new(PgRunJournal::new(pool.clone(), repo));
        Self {
            pool,
            executor: WorkflowExecutor::new(journal, dispatcher),
        }
    }

    /// Run every active automation matching a form submission. Reports
    /// are logged; nothing propagates back to the caller.
    pub async fn handle_form_submission(
        &self,
        workspace_id: Uuid,
        form_id: Uuid,
        lead: &Lead,
        trigger: &Map<String, Value>,
    ) {
        let automations =
            match matcher::matching_automations(&self.pool, workspace_id, form_id).await {
                Ok(automations) => automations,
                Err(err) => {
                    error!(%workspace_id, "failed to load automations: {}", err);
                    return;
                }
            };

        for automation in automations {
            let report = self.executor.run(&automation, lead, trigger).await;
            match &report.error {
                Some(error) => warn!(
                    automation_id = %report.automation_id,
                    lead_id = %report.lead_id,
                    state = ?report.state,
                    "automation run ended with error: {}", error
                ),
                None => info!(
                    automation_id = %report.automation_id,
                    lead_id = %report.lead_id,
                    state = ?report.state,
                    steps = report.steps.len(),
                    "automation run finished"
                ),
            }
        }
    }

    /// Resume every due delayed continuation. Delivery is
    /// at-least-once; step claims make a double resume harmless.
    pub async fn run_due_resumptions(&self) -> Result<usize, sqlx::Error> {
        let due: Vec<ResumptionRow> = sqlx::query_as(
            "SELECT * FROM workflow_resumptions WHERE resume_at <= NOW()
             ORDER BY resume_at LIMIT 100",
        )
        .fetch_all(&self.pool)
        .await?;

        let count = due.len();
        for row in due {
            if let Err(err) = self.resume_one(&row).await {
                // Row stays in place; the next poll retries it.
                error!(resumption_id = %row.id, "failed to resume workflow: {}", err);
            }
        }
        Ok(count)
    }

    async fn resume_one(&self, row: &ResumptionRow) -> Result<(), sqlx::Error> {
        let automation = sqlx::query_as::<_, Automation>("SELECT * FROM automations WHERE id = $1")
            .bind(row.automation_id)
            .fetch_optional(&self.pool)
            .await?;
        let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
            .bind(row.lead_id)
            .fetch_optional(&self.pool)
            .await?;

        match (automation, lead) {
            (Some(automation), Some(lead)) => {
                let trigger = row
                    .trigger_payload
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                let visited: Vec<String> =
                    serde_json::from_value(row.visited.clone()).unwrap_or_default();

                let report = self
                    .executor
                    .resume(&automation, &lead, &trigger, &row.resume_node_id, visited)
                    .await;
                info!(
                    automation_id = %automation.id,
                    lead_id = %lead.id,
                    state = ?report.state,
                    due_at = %row.resume_at,
                    "resumed workflow after delay"
                );
            }
            _ => info!(
                resumption_id = %row.id,
                "dropping resumption for deleted automation or lead"
            ),
        }

        sqlx::query("DELETE FROM workflow_resumptions WHERE id = $1")
            .bind(row.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
