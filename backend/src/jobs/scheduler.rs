use std::sync::Arc;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};

use crate::workflows::AutomationEngine;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

pub type JobResult<T> = Result<T, JobError>;

pub struct JobScheduler {
    scheduler: TokioScheduler,
    engine: Arc<AutomationEngine>,
    poll_interval_secs: u64,
}

impl JobScheduler {
    pub async fn new(engine: Arc<AutomationEngine>, poll_interval_secs: u64) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;
        Ok(Self {
            scheduler,
            engine,
            poll_interval_secs,
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");
        self.schedule_delay_monitor().await?;
        self.scheduler.start().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    /// Poll for due workflow resumptions. Resumption delivery is
    /// at-least-once; the step event claims make a duplicate poll
    /// harmless.
    async fn schedule_delay_monitor(&self) -> JobResult<()> {
        let cron_expr = cron_every(self.poll_interval_secs);
        let engine = self.engine.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            Box::pin(async move {
                match engine.run_due_resumptions().await {
                    Ok(0) => {}
                    Ok(resumed) => info!("delay monitor resumed {} workflow run(s)", resumed),
                    Err(err) => error!("delay monitor failed: {}", err),
                }
            })
        })?;

        self.scheduler.add(job).await?;
        Ok(())
    }
}

fn cron_every(secs: u64) -> String {
    if secs < 60 {
        format!("*/{} * * * * *", secs.max(1))
    } else {
        format!("0 */{} * * * *", (secs / 60).clamp(1, 59))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_expression_covers_second_and_minute_intervals() {
        assert_eq!(cron_every(15), "*/15 * * * * *");
        assert_eq!(cron_every(60), "0 */1 * * * *");
        assert_eq!(cron_every(300), "0 */5 * * * *");
        assert_eq!(cron_every(0), "*/1 * * * * *");
    }
}
