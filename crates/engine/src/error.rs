//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::job::JobStatus;

/// Errors produced by the workflow engine (graph building + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Build errors ------

    /// Two jobs in one workflow share a name.
    #[error("duplicate job name: '{0}'")]
    DuplicateJobName(String),

    /// A dependency references a job name that was never declared.
    #[error("dependency references unknown job '{name}' ({side} side)")]
    UnknownJobReference {
        name: String,
        side: &'static str,
    },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    #[error("unknown workflow type '{0}'")]
    UnknownWorkflowType(String),

    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    // ------ Lifecycle errors ------

    /// A job was asked to move along an edge its state machine doesn't have.
    #[error("job '{job}' cannot move from {from} to {to}")]
    InvalidTransition {
        job: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job '{0}' not found in workflow")]
    JobNotFound(String),

    /// The operation needs an id, but the workflow was never saved.
    #[error("workflow has not been saved yet")]
    NotSaved,

    // ------ Collaborator errors ------

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Queue(#[from] queue::QueueError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by a [`crate::PersistenceClient`] implementation.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("job '{name}' not found in workflow {workflow_id}")]
    JobNotFound { workflow_id: Uuid, name: String },

    /// The backing store itself failed.
    #[error("persistence backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}
