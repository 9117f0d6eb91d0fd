//! `MockJob`, a test double for `ExecutableJob`.
//!
//! Useful in engine tests where the work itself is irrelevant and only the
//! outcome (and how often it ran) matters.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Barrier;

use crate::{ExecutableJob, JobContext, JobError};

/// Behaviour injected into `MockJob` at construction time.
pub enum MockBehaviour {
    Succeed,
    Fail(String),
    Panic(String),
}

/// A mock job that records every call it receives and returns a
/// programmer-specified result.
pub struct MockJob {
    pub behaviour: MockBehaviour,
    /// Names of the job nodes this implementation ran for (in call order).
    pub calls: Arc<Mutex<Vec<String>>>,
    /// When set, `work` waits here before returning.
    barrier: Option<Arc<Barrier>>,
}

impl MockJob {
    pub fn succeeding() -> Self {
        Self::with(MockBehaviour::Succeed)
    }

    pub fn failing(msg: impl Into<String>) -> Self {
        Self::with(MockBehaviour::Fail(msg.into()))
    }

    pub fn panicking(msg: impl Into<String>) -> Self {
        Self::with(MockBehaviour::Panic(msg.into()))
    }

    /// Hold every call on `barrier` so several jobs finish at the same moment.
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    fn with(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
            barrier: None,
        }
    }

    /// Number of times this job has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutableJob for MockJob {
    async fn work(&self, ctx: &JobContext) -> Result<(), JobError> {
        self.calls.lock().unwrap().push(ctx.job_name.clone());

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }

        match &self.behaviour {
            MockBehaviour::Succeed => Ok(()),
            MockBehaviour::Fail(msg) => Err(JobError::Failed(msg.clone())),
            MockBehaviour::Panic(msg) => panic!("{}", msg),
        }
    }
}
