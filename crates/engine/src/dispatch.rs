//! Dispatch: claim a ready job in the store, then hand it to the queue.

use std::sync::Arc;

use queue::{DispatchMessage, DispatchQueue};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{Configuration, EngineError, JobNode, PersistenceClient, Workflow};

/// Composes the persistence client's claim with the dispatch transport.
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn PersistenceClient>,
    queue: Arc<dyn DispatchQueue>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn PersistenceClient>, queue: Arc<dyn DispatchQueue>) -> Self {
        Self { client, queue }
    }

    pub fn client(&self) -> &Arc<dyn PersistenceClient> {
        &self.client
    }

    /// Dispatch `job` unless another caller already claimed it.
    ///
    /// Returns whether this call won the claim and pushed the job.  If the
    /// push fails the claim is released, so a later evaluation can retry.
    pub async fn dispatch(
        &self,
        workflow_id: Uuid,
        job: &JobNode,
        config: &Configuration,
    ) -> Result<bool, EngineError> {
        let configuration = config.to_json()?;
        if !self.client.enqueue_job(workflow_id, job).await? {
            debug!(%workflow_id, job = %job.name, "already claimed, not dispatching");
            return Ok(false);
        }

        let message = DispatchMessage::new(workflow_id, job.name.clone(), configuration);
        if let Err(err) = self.queue.push(message).await {
            warn!(%workflow_id, job = %job.name, error = %err, "push failed, releasing claim");
            self.client.release_job(workflow_id, job).await?;
            return Err(err.into());
        }
        Ok(true)
    }

    /// Save `workflow` if it never was, clear its stopped flag and dispatch
    /// its initial jobs.  Returns the names that were dispatched.
    #[instrument(skip_all, fields(workflow = %workflow.name()))]
    pub async fn start_workflow(
        &self,
        workflow: &mut Workflow,
        config: &Configuration,
    ) -> Result<Vec<String>, EngineError> {
        if !workflow.is_persisted() {
            workflow.save(self.client.as_ref()).await?;
        }
        let id = workflow.require_id()?;

        workflow.mark_as_started();
        self.client.start_workflow(workflow).await?;

        let initial: Vec<JobNode> = workflow.initial_jobs().into_iter().cloned().collect();
        let mut dispatched = Vec::with_capacity(initial.len());
        for job in &initial {
            if self.dispatch(id, job, config).await? {
                if let Some(local) = workflow.find_job_mut(&job.name).filter(|j| j.is_pending()) {
                    local.enqueue()?;
                }
                dispatched.push(job.name.clone());
            }
        }

        info!(workflow_id = %id, ?dispatched, "workflow started");
        Ok(dispatched)
    }
}
