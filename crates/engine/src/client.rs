//! The persistence client contract.
//!
//! Everything the engine knows about durable state goes through this trait.
//! Implementations must offer strongly consistent single-record reads and
//! writes; the engine does no local locking of its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ClientError, JobNode, Workflow, WorkflowStatus};

#[async_trait]
pub trait PersistenceClient: Send + Sync {
    /// The workflow with all of its (materialized) jobs.
    async fn find_workflow(&self, id: Uuid) -> Result<Workflow, ClientError>;

    /// An id no stored workflow uses.
    async fn next_free_id(&self) -> Result<Uuid, ClientError>;

    /// Upsert workflow metadata (`name`, `klass`, `stopped`) and insert any
    /// jobs the store doesn't have yet.  Stored job state is never rewritten
    /// here; that is `persist_job`'s job.
    async fn persist_workflow(&self, workflow: &Workflow) -> Result<(), ClientError>;

    /// Upsert one job's lifecycle state.
    async fn persist_job(&self, workflow_id: Uuid, job: &JobNode) -> Result<(), ClientError>;

    async fn load_job(&self, workflow_id: Uuid, name: &str) -> Result<JobNode, ClientError>;

    /// Atomically claim `job` for dispatch by moving its stored status from
    /// `pending` to `enqueued`.
    ///
    /// Must return `Ok(true)` to exactly one caller even when several race
    /// for the same job; every other caller gets `Ok(false)`.
    async fn enqueue_job(&self, workflow_id: Uuid, job: &JobNode) -> Result<bool, ClientError>;

    /// Undo a claim whose dispatch never happened: `enqueued` back to
    /// `pending`.  Returns whether the stored job was still `enqueued`.
    async fn release_job(&self, workflow_id: Uuid, job: &JobNode) -> Result<bool, ClientError>;

    /// Mark the workflow runnable (clears `stopped`).
    async fn start_workflow(&self, workflow: &Workflow) -> Result<(), ClientError>;

    async fn worker_report(&self, report: WorkerReport) -> Result<(), ClientError>;

    async fn workflow_report(&self, report: WorkflowReport) -> Result<(), ClientError>;
}

/// Per-job event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Started,
    Finished,
    Failed,
}

/// `{status, workflow_id, job, duration, error?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub status: ReportStatus,
    pub workflow_id: Uuid,
    pub job: String,
    /// Seconds since the cascade began, rounded to milliseconds.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `{workflow_id, status, started_at, finished_at}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowReport {
    pub fn of(workflow_id: Uuid, workflow: &Workflow) -> Self {
        Self {
            workflow_id,
            status: workflow.status(),
            started_at: workflow.started_at(),
            finished_at: workflow.finished_at(),
        }
    }
}
