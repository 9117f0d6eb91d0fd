//! The execution cascade.
//!
//! `ExecutionCascade::execute` runs once per `(workflow id, job name,
//! configuration)` delivered by the dispatch queue:
//! 1. Loads the workflow and the target job through the persistence client.
//! 2. Reports `started`, moves the job to `running` and persists it.
//! 3. Runs the job's `work` on its own task so that neither an error nor a
//!    panic can escape.
//! 4. On success: `finished`, persist, report, then evaluates every
//!    successor and dispatches the ones that became ready.
//! 5. On failure: `failed`, persist, report with the error message.  No
//!    successor is evaluated; there are no retries.
//!
//! Delivering an already finished job skips straight to successor
//! evaluation, so a caller can retry a cascade that broke off there.
//!
//! Infrastructure errors (store or queue unavailable, missing records) are
//! returned to the caller untouched.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use jobs::{JobContext, JobError};
use queue::DispatchQueue;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::client::{ReportStatus, WorkerReport, WorkflowReport};
use crate::{Configuration, Dispatcher, EngineError, JobNode, JobRegistry, PersistenceClient};

// ---------------------------------------------------------------------------
// Outcome of one invocation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    /// The job finished; `dispatched` lists the successors this invocation
    /// claimed and enqueued.
    Finished { dispatched: Vec<String> },
    /// The job failed terminally.
    Failed { error: String },
    /// The job is already running or failed; nothing ran.
    Skipped,
}

// ---------------------------------------------------------------------------
// ExecutionCascade
// ---------------------------------------------------------------------------

/// Stateless executor for single job deliveries.
///
/// One instance can serve any number of concurrent `execute` calls.
pub struct ExecutionCascade {
    client: Arc<dyn PersistenceClient>,
    dispatcher: Dispatcher,
    registry: JobRegistry,
}

impl ExecutionCascade {
    pub fn new(
        client: Arc<dyn PersistenceClient>,
        queue: Arc<dyn DispatchQueue>,
        registry: JobRegistry,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(client.clone(), queue),
            client,
            registry,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run `job_name` of workflow `workflow_id` and cascade to its successors.
    ///
    /// # Errors
    /// Only infrastructure failures; a failing job is reported through
    /// [`CascadeOutcome::Failed`].
    #[instrument(skip(self, config), fields(namespace = %config.namespace))]
    pub async fn execute(
        &self,
        workflow_id: Uuid,
        job_name: &str,
        config: &Configuration,
    ) -> Result<CascadeOutcome, EngineError> {
        let workflow = self.client.find_workflow(workflow_id).await?;
        let mut job = workflow.job(job_name)?.clone();

        if job.is_finished() {
            // A retry after successor evaluation broke off; the claim keeps
            // already dispatched successors from going out twice.
            debug!("job already finished, re-evaluating successors");
            let dispatched = self.enqueue_outgoing_jobs(workflow_id, &job, config).await?;
            self.report_workflow_status(workflow_id).await?;
            return Ok(CascadeOutcome::Finished { dispatched });
        }
        if !(job.is_pending() || job.is_enqueued()) {
            warn!(status = %job.status(), "job already picked up, skipping duplicate delivery");
            return Ok(CascadeOutcome::Skipped);
        }

        let start = Instant::now();
        self.report(workflow_id, &job, ReportStatus::Started, start, None).await?;
        self.mark_as_started(workflow_id, &mut job).await?;

        let outcome = match self.perform(workflow_id, &job).await {
            Ok(()) => {
                self.mark_as_finished(workflow_id, &mut job).await?;
                self.report(workflow_id, &job, ReportStatus::Finished, start, None).await?;
                info!("job finished");

                let dispatched = self.enqueue_outgoing_jobs(workflow_id, &job, config).await?;
                CascadeOutcome::Finished { dispatched }
            }
            Err(err) => {
                let message = err.to_string();
                self.mark_as_failed(workflow_id, &mut job).await?;
                self.report(workflow_id, &job, ReportStatus::Failed, start, Some(message.clone()))
                    .await?;
                error!(error = %message, "job failed");

                CascadeOutcome::Failed { error: message }
            }
        };

        self.report_workflow_status(workflow_id).await?;
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Transitions (each followed by a persist)
    // -----------------------------------------------------------------------

    async fn mark_as_started(&self, workflow_id: Uuid, job: &mut JobNode) -> Result<(), EngineError> {
        job.start()?;
        Ok(self.client.persist_job(workflow_id, job).await?)
    }

    async fn mark_as_finished(&self, workflow_id: Uuid, job: &mut JobNode) -> Result<(), EngineError> {
        job.finish()?;
        Ok(self.client.persist_job(workflow_id, job).await?)
    }

    async fn mark_as_failed(&self, workflow_id: Uuid, job: &mut JobNode) -> Result<(), EngineError> {
        job.fail()?;
        Ok(self.client.persist_job(workflow_id, job).await?)
    }

    // -----------------------------------------------------------------------
    // Work
    // -----------------------------------------------------------------------

    async fn perform(&self, workflow_id: Uuid, job: &JobNode) -> Result<(), JobError> {
        let implementation = self.registry.get(&job.klass).ok_or_else(|| {
            JobError::failed(format!("no implementation registered for job type '{}'", job.klass))
        })?;

        let ctx = JobContext {
            workflow_id,
            job_name: job.name.clone(),
            job_type: job.klass.clone(),
            params: job.params.clone(),
        };

        match tokio::spawn(async move { implementation.work(&ctx).await }).await {
            Ok(result) => result,
            Err(join) if join.is_panic() => Err(JobError::Panicked(panic_message(join.into_panic()))),
            Err(join) => Err(JobError::failed(join.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Successor evaluation
    // -----------------------------------------------------------------------

    /// Evaluate every successor of `job` against persisted state and dispatch
    /// the ready ones.  The dispatcher's claim makes concurrent evaluations
    /// of the same successor enqueue it once.
    pub(crate) async fn enqueue_outgoing_jobs(
        &self,
        workflow_id: Uuid,
        job: &JobNode,
        config: &Configuration,
    ) -> Result<Vec<String>, EngineError> {
        let mut dispatched = Vec::new();

        for name in &job.outgoing {
            let successor = self.client.load_job(workflow_id, name).await?;
            if !self.ready_to_start(workflow_id, &successor).await? {
                debug!(successor = %name, "successor still waiting on predecessors");
                continue;
            }
            if self.dispatcher.dispatch(workflow_id, &successor, config).await? {
                dispatched.push(name.clone());
            }
        }

        Ok(dispatched)
    }

    async fn ready_to_start(&self, workflow_id: Uuid, job: &JobNode) -> Result<bool, EngineError> {
        let mut statuses = HashMap::with_capacity(job.incoming.len());
        for name in &job.incoming {
            let predecessor = self.client.load_job(workflow_id, name).await?;
            statuses.insert(name.as_str(), predecessor.status());
        }
        Ok(job.ready_to_start(|name| statuses.get(name).copied()))
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    async fn report(
        &self,
        workflow_id: Uuid,
        job: &JobNode,
        status: ReportStatus,
        start: Instant,
        error: Option<String>,
    ) -> Result<(), EngineError> {
        let report = WorkerReport {
            status,
            workflow_id,
            job: job.name.clone(),
            duration: elapsed(start),
            error,
        };
        Ok(self.client.worker_report(report).await?)
    }

    async fn report_workflow_status(&self, workflow_id: Uuid) -> Result<(), EngineError> {
        let workflow = self.client.find_workflow(workflow_id).await?;
        let report = WorkflowReport::of(workflow_id, &workflow);
        Ok(self.client.workflow_report(report).await?)
    }
}

fn elapsed(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 1000.0).round() / 1000.0
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}
