//! The `ExecutableJob` trait, the contract every job type must fulfil.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::JobError;

/// Context passed to a job for one execution.
///
/// Defined here (in the jobs crate) so both the engine and individual job
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// ID of the workflow instance the job belongs to.
    pub workflow_id: Uuid,
    /// Name of the job node inside the workflow.
    pub job_name: String,
    /// Type tag the job was registered under.
    pub job_type: String,
    /// Per-instance parameters declared alongside the job.
    pub params: Value,
}

/// The core job trait.
///
/// Implementations are opaque to the engine; whatever they do, the only
/// thing the engine observes is the returned `Result`.
#[async_trait]
pub trait ExecutableJob: Send + Sync {
    async fn work(&self, ctx: &JobContext) -> Result<(), JobError>;
}
