// Background jobs, scheduled with tokio-cron-scheduler. The only
// recurring job is the delay monitor: it wakes paused workflow runs
// whose resume time has passed.

pub mod scheduler;

pub use scheduler::{JobError, JobResult, JobScheduler};
