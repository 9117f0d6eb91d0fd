//! Payload carried by the dispatch queue.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One `(workflow id, job name, configuration)` delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub workflow_id: Uuid,
    pub job: String,
    /// Executor configuration, serialized as JSON by the sender.
    pub configuration: String,
}

impl DispatchMessage {
    pub fn new(workflow_id: Uuid, job: impl Into<String>, configuration: impl Into<String>) -> Self {
        Self {
            workflow_id,
            job: job.into(),
            configuration: configuration.into(),
        }
    }
}
