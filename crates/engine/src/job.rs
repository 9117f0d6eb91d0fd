//! The job node: one vertex of a workflow graph and its lifecycle.
//!
//! Transitions are pure; persisting a node after a transition is the
//! caller's job (see [`crate::executor::ExecutionCascade`]).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EngineError;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a single job: `pending → enqueued → running → finished | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Enqueued,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending  => write!(f, "pending"),
            Self::Enqueued => write!(f, "enqueued"),
            Self::Running  => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Failed   => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"  => Ok(Self::Pending),
            "enqueued" => Ok(Self::Enqueued),
            "running"  => Ok(Self::Running),
            "finished" => Ok(Self::Finished),
            "failed"   => Ok(Self::Failed),
            other      => Err(format!("unknown job status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// JobNode
// ---------------------------------------------------------------------------

/// A single job inside a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobNode {
    /// Unique within the workflow; what dependencies refer to.
    pub name: String,
    /// Job type tag, resolved against the job registry at execution time.
    pub klass: String,
    /// Names this job waits for.
    #[serde(default)]
    pub incoming: BTreeSet<String>,
    /// Names waiting for this job.
    #[serde(default)]
    pub outgoing: BTreeSet<String>,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    status: JobStatus,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
}

impl JobNode {
    pub fn new(name: impl Into<String>, klass: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            klass: klass.into(),
            incoming: BTreeSet::new(),
            outgoing: BTreeSet::new(),
            params,
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    /// Rehydrate lifecycle state loaded from a store.
    pub fn with_state(
        mut self,
        status: JobStatus,
        started_at: Option<DateTime<Utc>>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.status = status;
        self.started_at = started_at;
        self.finished_at = finished_at;
        self
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == JobStatus::Pending
    }

    pub fn is_enqueued(&self) -> bool {
        self.status == JobStatus::Enqueued
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    pub fn is_finished(&self) -> bool {
        self.status == JobStatus::Finished
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }

    pub fn has_no_dependencies(&self) -> bool {
        self.incoming.is_empty()
    }

    /// `pending → enqueued`.
    pub fn enqueue(&mut self) -> Result<(), EngineError> {
        self.transition(&[JobStatus::Pending], JobStatus::Enqueued)
    }

    /// `enqueued → pending`; only for a store undoing a claim whose dispatch
    /// failed.
    pub(crate) fn release(&mut self) -> Result<(), EngineError> {
        self.transition(&[JobStatus::Enqueued], JobStatus::Pending)
    }

    /// `pending | enqueued → running`, stamping `started_at`.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.transition(&[JobStatus::Pending, JobStatus::Enqueued], JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `running → finished`, stamping `finished_at`.
    pub fn finish(&mut self) -> Result<(), EngineError> {
        self.transition(&[JobStatus::Running], JobStatus::Finished)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// `running → failed`, stamping `finished_at`.
    pub fn fail(&mut self) -> Result<(), EngineError> {
        self.transition(&[JobStatus::Running], JobStatus::Failed)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// True iff every predecessor is known and finished.
    ///
    /// `status_of` resolves a predecessor name to its current status; names it
    /// can't resolve count as not finished.
    pub fn ready_to_start<F>(&self, status_of: F) -> bool
    where
        F: Fn(&str) -> Option<JobStatus>,
    {
        self.incoming
            .iter()
            .all(|name| status_of(name) == Some(JobStatus::Finished))
    }

    fn transition(&mut self, from: &[JobStatus], to: JobStatus) -> Result<(), EngineError> {
        if !from.contains(&self.status) {
            return Err(EngineError::InvalidTransition {
                job: self.name.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
