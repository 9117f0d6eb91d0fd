//! Executor configuration.
//!
//! The configuration is serialized into every dispatch message so the
//! executor that picks a job up runs it with the same settings that were in
//! force when the job was dispatched.

use serde::{Deserialize, Serialize};

use crate::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Prefix for everything this deployment owns (log spans, channels).
    pub namespace: String,
    /// Maximum number of cascades a worker runs at once.
    pub concurrency: usize,
    pub database_url: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            namespace: "dagflow".into(),
            concurrency: 5,
            database_url: None,
        }
    }
}

impl Configuration {
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(raw)?)
    }
}
