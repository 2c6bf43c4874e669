//! Workflow run state machine.
//!
//! One run walks one automation's graph for one lead and one triggering
//! submission, sequentially, within a single logical thread of control.
//! Failures stop the run at the failing node and never propagate across
//! run boundaries; the submission path and sibling automations are
//! unaffected.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use leadflow_shared::{Automation, Lead, LeadEventType};

use super::actions::{ActionDispatcher, RunContext};
use super::graph::{NodeKind, WorkflowGraph};
use crate::leads::LeadRepository;

/// Lifecycle of a run. `Branched` and `ActionFailed` are observable in
/// the step trace; a run always ends `Completed` or `ActionFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Ready,
    Running,
    Branched,
    ActionFailed,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StepOutcome {
    Completed,
    /// Step had already run for this (automation, lead, node); side
    /// effect skipped.
    Skipped,
    Failed { error: String },
    Branch { followed: bool },
    DelayScheduled { resume_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub node_id: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Per-run report collected by the orchestrator; the core never throws
/// across a run boundary.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub automation_id: Uuid,
    pub lead_id: Uuid,
    pub state: RunState,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
}

impl RunReport {
    fn new(automation_id: Uuid, lead_id: Uuid) -> Self {
        Self {
            automation_id,
            lead_id,
            state: RunState::Ready,
            steps: Vec::new(),
            error: None,
        }
    }
}

/// A delayed continuation to be persisted; carries everything needed to
/// resume deterministically after a restart.
#[derive(Debug, Clone)]
pub struct PendingResumption {
    pub automation_id: Uuid,
    pub lead_id: Uuid,
    pub resume_node_id: String,
    pub trigger_payload: Value,
    pub visited: Vec<String>,
    pub resume_at: DateTime<Utc>,
}

/// Durable run bookkeeping: step idempotency claims, delay
/// continuations and error events.
#[async_trait]
pub trait RunJournal: Send + Sync {
    /// Claim a step before executing it. `false` means the step already
    /// has a record for this (automation, lead, node) and must be
    /// skipped.
    async fn claim_step(
        &self,
        automation_id: Uuid,
        lead_id: Uuid,
        node_id: &str,
    ) -> Result<bool, sqlx::Error>;

    async fn finish_step(
        &self,
        automation_id: Uuid,
        lead_id: Uuid,
        node_id: &str,
        outcome: &str,
        detail: Option<Value>,
    ) -> Result<(), sqlx::Error>;

    /// Claim a delay step and persist its continuation as one atomic
    /// write, so a claim can never exist without the continuation the
    /// poller needs. `false` means the step was already claimed.
    async fn schedule_delay(&self, pending: PendingResumption) -> Result<bool, sqlx::Error>;

    /// Configuration errors (cycles, bad node config) become an error
    /// event on the lead so the run trace stays reconstructible.
    async fn record_run_error(
        &self,
        automation_id: Uuid,
        lead_id: Uuid,
        message: &str,
    ) -> Result<(), sqlx::Error>;
}

/// Journal backed by `automation_step_events` and
/// `workflow_resumptions`; the uniqueness constraint on
/// (automation_id, lead_id, node_id) is the idempotency guard.
pub struct PgRunJournal {
    pool: PgPool,
    repo: LeadRepository,
}

impl PgRunJournal {
    pub fn new(pool: PgPool, repo: LeadRepository) -> Self {
        Self { pool, repo }
    }
}

#[async_trait]
impl RunJournal for PgRunJournal {
    async fn claim_step(
        &self,
        automation_id: Uuid,
        lead_id: Uuid,
        node_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO automation_step_events (id, automation_id, lead_id, node_id, outcome)
             VALUES ($1, $2, $3, $4, 'started')
             ON CONFLICT (automation_id, lead_id, node_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(automation_id)
        .bind(lead_id)
        .bind(node_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn finish_step(
        &self,
        automation_id: Uuid,
        lead_id: Uuid,
        node_id: &str,
        outcome: &str,
        detail: Option<Value>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE automation_step_events SET outcome = $4, detail = $5
             WHERE automation_id = $1 AND lead_id = $2 AND node_id = $3",
        )
        .bind(automation_id)
        .bind(lead_id)
        .bind(node_id)
        .bind(outcome)
        .bind(detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn schedule_delay(&self, pending: PendingResumption) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let claim = sqlx::query(
            "INSERT INTO automation_step_events (id, automation_id, lead_id, node_id, outcome, detail)
             VALUES ($1, $2, $3, $4, 'delay_scheduled', $5)
             ON CONFLICT (automation_id, lead_id, node_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(pending.automation_id)
        .bind(pending.lead_id)
        .bind(&pending.resume_node_id)
        .bind(json!({ "resume_at": pending.resume_at }))
        .execute(&mut *tx)
        .await?;
        if claim.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO workflow_resumptions
                 (id, automation_id, lead_id, resume_node_id, trigger_payload, visited, resume_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::new_v4())
        .bind(pending.automation_id)
        .bind(pending.lead_id)
        .bind(&pending.resume_node_id)
        .bind(&pending.trigger_payload)
        .bind(json!(pending.visited))
        .bind(pending.resume_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn record_run_error(
        &self,
        automation_id: Uuid,
        lead_id: Uuid,
        message: &str,
    ) -> Result<(), sqlx::Error> {
        self.repo
            .append_event(
                lead_id,
                LeadEventType::AutomationError,
                json!({ "automation_id": automation_id, "error": message }),
            )
            .await
    }
}

pub struct WorkflowExecutor {
    journal: Arc<dyn RunJournal>,
    dispatcher: Arc<dyn ActionDispatcher>,
}

impl WorkflowExecutor {
    pub fn new(journal: Arc<dyn RunJournal>, dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        Self { journal, dispatcher }
    }

    /// Execute one automation for one triggering submission.
    pub async fn run(
        &self,
        automation: &Automation,
        lead: &Lead,
        trigger: &Map<String, Value>,
    ) -> RunReport {
        let mut report = RunReport::new(automation.id, lead.id);

        let graph = match WorkflowGraph::parse(&automation.flow_data) {
            Ok(graph) => graph,
            Err(err) => {
                warn!(automation_id = %automation.id, "invalid workflow graph: {}", err);
                self.report_error(&mut report, err.to_string()).await;
                report.state = RunState::Completed;
                return report;
            }
        };

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(graph.trigger_id().to_string());

        let start = graph.next_default(graph.trigger_id());
        self.walk(&graph, start.map(|n| n.id.clone()), visited, automation, lead, trigger, &mut report)
            .await;
        report
    }

    /// Resume a run after a delay node, from durable state.
    pub async fn resume(
        &self,
        automation: &Automation,
        lead: &Lead,
        trigger: &Map<String, Value>,
        resume_node_id: &str,
        previously_visited: Vec<String>,
    ) -> RunReport {
        let mut report = RunReport::new(automation.id, lead.id);

        let graph = match WorkflowGraph::parse(&automation.flow_data) {
            Ok(graph) => graph,
            Err(err) => {
                self.report_error(&mut report, err.to_string()).await;
                report.state = RunState::Completed;
                return report;
            }
        };

        if self
            .journal
            .finish_step(automation.id, lead.id, resume_node_id, "completed", None)
            .await
            .is_err()
        {
            warn!(automation_id = %automation.id, "could not close out delay step");
        }

        let mut visited: HashSet<String> = previously_visited.into_iter().collect();
        visited.insert(resume_node_id.to_string());

        let start = graph.next_default(resume_node_id);
        self.walk(&graph, start.map(|n| n.id.clone()), visited, automation, lead, trigger, &mut report)
            .await;
        report
    }

    #[allow(clippy::too_many_arguments)]
    async fn walk(
        &self,
        graph: &WorkflowGraph,
        start: Option<String>,
        mut visited: HashSet<String>,
        automation: &Automation,
        lead: &Lead,
        trigger: &Map<String, Value>,
        report: &mut RunReport,
    ) {
        let ctx = RunContext {
            automation_id: automation.id,
            workspace_id: automation.workspace_id,
            lead: lead.clone(),
            trigger: trigger.clone(),
        };

        report.state = RunState::Running;
        let mut current = start;

        while let Some(node_id) = current.take() {
            // Graphs stored before write-time validation existed may
            // still contain a cycle; a revisit ends the run.
            if !visited.insert(node_id.clone()) {
                let message = format!("cycle detected at node '{}'", node_id);
                self.report_error(report, message).await;
                break;
            }

            let node = match graph.node(&node_id) {
                Some(node) => node,
                None => break,
            };

            match &node.kind {
                NodeKind::Trigger => {
                    current = graph.next_default(&node.id).map(|n| n.id.clone());
                }
                NodeKind::Condition(config) => {
                    let actual = trigger.get(&config.field).and_then(value_text);
                    let followed = config.operator.evaluate(actual.as_deref(), &config.value);
                    report.state = RunState::Branched;
                    report.steps.push(StepRecord {
                        node_id: node.id.clone(),
                        outcome: StepOutcome::Branch { followed },
                    });
                    current = graph.next_branch(&node.id, followed).map(|n| n.id.clone());
                }
                NodeKind::ActionDelay(config) => {
                    let resume_at = Utc::now() + Duration::minutes(config.minutes);
                    let pending = PendingResumption {
                        automation_id: automation.id,
                        lead_id: lead.id,
                        resume_node_id: node.id.clone(),
                        trigger_payload: Value::Object(trigger.clone()),
                        visited: visited.iter().cloned().collect(),
                        resume_at,
                    };
                    match self.journal.schedule_delay(pending).await {
                        Ok(true) => {
                            report.steps.push(StepRecord {
                                node_id: node.id.clone(),
                                outcome: StepOutcome::DelayScheduled { resume_at },
                            });
                            info!(automation_id = %automation.id, lead_id = %lead.id,
                                  "run paused until {}", resume_at);
                        }
                        Ok(false) => {
                            // Continuation already scheduled or executed.
                            report.steps.push(StepRecord {
                                node_id: node.id.clone(),
                                outcome: StepOutcome::Skipped,
                            });
                        }
                        Err(err) => {
                            self.report_error(report, err.to_string()).await;
                        }
                    }
                    break;
                }
                kind => {
                    match self.journal.claim_step(automation.id, lead.id, &node.id).await {
                        Ok(true) => match self.dispatch(kind, &ctx).await {
                            Ok(()) => {
                                let _ = self
                                    .journal
                                    .finish_step(automation.id, lead.id, &node.id, "completed", None)
                                    .await;
                                report.steps.push(StepRecord {
                                    node_id: node.id.clone(),
                                    outcome: StepOutcome::Completed,
                                });
                                current = graph.next_default(&node.id).map(|n| n.id.clone());
                            }
                            Err(err) => {
                                error!(automation_id = %automation.id, node = %node.id,
                                       "action failed: {}", err);
                                let _ = self
                                    .journal
                                    .finish_step(
                                        automation.id,
                                        lead.id,
                                        &node.id,
                                        "failed",
                                        Some(json!({ "error": err.to_string() })),
                                    )
                                    .await;
                                report.steps.push(StepRecord {
                                    node_id: node.id.clone(),
                                    outcome: StepOutcome::Failed {
                                        error: err.to_string(),
                                    },
                                });
                                let message = format!("action '{}' failed: {}", node.id, err);
                                self.report_error(report, message).await;
                                report.state = RunState::ActionFailed;
                                break;
                            }
                        },
                        Ok(false) => {
                            report.steps.push(StepRecord {
                                node_id: node.id.clone(),
                                outcome: StepOutcome::Skipped,
                            });
                            current = graph.next_default(&node.id).map(|n| n.id.clone());
                        }
                        Err(err) => {
                            self.report_error(report, err.to_string()).await;
                            break;
                        }
                    }
                }
            }
        }

        if report.state != RunState::ActionFailed {
            report.state = RunState::Completed;
        }
    }

    async fn dispatch(
        &self,
        kind: &NodeKind,
        ctx: &RunContext,
    ) -> Result<(), super::actions::ActionError> {
        match kind {
            NodeKind::ActionTag { tags } => self.dispatcher.add_tags(ctx, tags).await,
            NodeKind::ActionStatus { status } => self.dispatcher.set_status(ctx, status).await,
            NodeKind::ActionWebhook(config) => self.dispatcher.send_webhook(ctx, &config.url).await,
            NodeKind::ActionEmail(config) => self.dispatcher.send_email(ctx, config).await,
            // Trigger, condition and delay are handled by the walk itself.
            _ => Ok(()),
        }
    }

    async fn report_error(&self, report: &mut RunReport, message: String) {
        if let Err(err) = self
            .journal
            .record_run_error(report.automation_id, report.lead_id, &message)
            .await
        {
            error!("failed to record run error event: {}", err);
        }
        report.error = Some(message);
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
