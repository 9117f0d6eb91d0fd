//! Job types available to every registry out of the box.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{ExecutableJob, JobContext, JobError};

/// Does nothing and succeeds.
pub struct NoopJob;

#[async_trait]
impl ExecutableJob for NoopJob {
    async fn work(&self, ctx: &JobContext) -> Result<(), JobError> {
        debug!(job = %ctx.job_name, "noop");
        Ok(())
    }
}

/// Sleeps for `params.millis` milliseconds (default 100) and succeeds.
pub struct SleepJob;

#[async_trait]
impl ExecutableJob for SleepJob {
    async fn work(&self, ctx: &JobContext) -> Result<(), JobError> {
        let millis = ctx.params.get("millis").and_then(|v| v.as_u64()).unwrap_or(100);
        info!(job = %ctx.job_name, millis, "sleeping");
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(())
    }
}

/// Always fails with `params.message` (default `"job failed"`).
pub struct FailJob;

#[async_trait]
impl ExecutableJob for FailJob {
    async fn work(&self, ctx: &JobContext) -> Result<(), JobError> {
        let message = ctx
            .params
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("job failed");
        Err(JobError::failed(message))
    }
}

/// `(type tag, implementation)` pairs for every built-in job.
pub fn all() -> Vec<(&'static str, Arc<dyn ExecutableJob>)> {
    vec![
        ("noop", Arc::new(NoopJob) as Arc<dyn ExecutableJob>),
        ("sleep", Arc::new(SleepJob) as Arc<dyn ExecutableJob>),
        ("fail", Arc::new(FailJob) as Arc<dyn ExecutableJob>),
    ]
}
