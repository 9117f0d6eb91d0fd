//! In-process `PersistenceClient`.
//!
//! Backs the CLI's `run` command and the engine tests.  All state sits
//! behind one mutex, which makes the dispatch claim a single critical
//! section.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::{
    ClientError, JobNode, PersistenceClient, WorkerReport, Workflow, WorkflowReport,
};

#[derive(Default)]
struct State {
    workflows: HashMap<Uuid, Workflow>,
    worker_reports: Vec<WorkerReport>,
    workflow_reports: Vec<WorkflowReport>,
}

#[derive(Default)]
pub struct MemoryClient {
    state: Mutex<State>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worker_reports(&self) -> Vec<WorkerReport> {
        self.state().worker_reports.clone()
    }

    pub fn workflow_reports(&self) -> Vec<WorkflowReport> {
        self.state().workflow_reports.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn stored_job<'a>(
    state: &'a mut State,
    workflow_id: Uuid,
    name: &str,
) -> Result<&'a mut JobNode, ClientError> {
    state
        .workflows
        .get_mut(&workflow_id)
        .ok_or(ClientError::WorkflowNotFound(workflow_id))?
        .find_job_mut(name)
        .ok_or_else(|| ClientError::JobNotFound {
            workflow_id,
            name: name.to_owned(),
        })
}

#[async_trait]
impl PersistenceClient for MemoryClient {
    async fn find_workflow(&self, id: Uuid) -> Result<Workflow, ClientError> {
        self.state()
            .workflows
            .get(&id)
            .cloned()
            .ok_or(ClientError::WorkflowNotFound(id))
    }

    async fn next_free_id(&self) -> Result<Uuid, ClientError> {
        let state = self.state();
        loop {
            let id = Uuid::new_v4();
            if !state.workflows.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    async fn persist_workflow(&self, workflow: &Workflow) -> Result<(), ClientError> {
        let id = workflow
            .id()
            .ok_or_else(|| ClientError::Backend("cannot persist a workflow without an id".into()))?;

        let mut state = self.state();
        match state.workflows.get_mut(&id) {
            Some(stored) => {
                stored.set_metadata_from(workflow);
                stored.merge_new_jobs(workflow);
            }
            None => {
                let mut stored = workflow.clone();
                stored.mark_as_persisted();
                state.workflows.insert(id, stored);
            }
        }
        Ok(())
    }

    async fn persist_job(&self, workflow_id: Uuid, job: &JobNode) -> Result<(), ClientError> {
        let mut state = self.state();
        *stored_job(&mut state, workflow_id, &job.name)? = job.clone();
        Ok(())
    }

    async fn load_job(&self, workflow_id: Uuid, name: &str) -> Result<JobNode, ClientError> {
        let mut state = self.state();
        Ok(stored_job(&mut state, workflow_id, name)?.clone())
    }

    async fn enqueue_job(&self, workflow_id: Uuid, job: &JobNode) -> Result<bool, ClientError> {
        let mut state = self.state();
        let stored = stored_job(&mut state, workflow_id, &job.name)?;
        Ok(stored.enqueue().is_ok())
    }

    async fn release_job(&self, workflow_id: Uuid, job: &JobNode) -> Result<bool, ClientError> {
        let mut state = self.state();
        let stored = stored_job(&mut state, workflow_id, &job.name)?;
        Ok(stored.release().is_ok())
    }

    async fn start_workflow(&self, workflow: &Workflow) -> Result<(), ClientError> {
        let id = workflow
            .id()
            .ok_or_else(|| ClientError::Backend("cannot start a workflow without an id".into()))?;

        let mut state = self.state();
        let stored = state
            .workflows
            .get_mut(&id)
            .ok_or(ClientError::WorkflowNotFound(id))?;
        stored.mark_as_started();
        Ok(())
    }

    async fn worker_report(&self, report: WorkerReport) -> Result<(), ClientError> {
        info!(
            workflow_id = %report.workflow_id,
            job = %report.job,
            status = ?report.status,
            duration = report.duration,
            error = report.error.as_deref().unwrap_or(""),
            "worker report"
        );
        self.state().worker_reports.push(report);
        Ok(())
    }

    async fn workflow_report(&self, report: WorkflowReport) -> Result<(), ClientError> {
        info!(workflow_id = %report.workflow_id, status = %report.status, "workflow report");
        self.state().workflow_reports.push(report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobStatus, RunOptions};

    async fn saved_pair(client: &MemoryClient) -> Uuid {
        let mut wf = Workflow::new("Pair");
        wf.run("a", RunOptions::new())
            .run("b", RunOptions::new().after(["a"]));
        wf.save(client).await.unwrap()
    }

    #[tokio::test]
    async fn save_assigns_id_and_marks_persisted() {
        let client = MemoryClient::new();
        let mut wf = Workflow::new("Pair");
        wf.run("a", RunOptions::new());
        assert!(wf.id().is_none());

        let id = wf.save(&client).await.unwrap();
        assert_eq!(wf.id(), Some(id));
        assert!(wf.is_persisted());

        let found = Workflow::find(&client, id).await.unwrap();
        assert_eq!(found.jobs().len(), 1);
        assert!(found.is_persisted());
    }

    #[tokio::test]
    async fn claim_succeeds_exactly_once() {
        let client = MemoryClient::new();
        let id = saved_pair(&client).await;
        let job = client.load_job(id, "a").await.unwrap();

        assert!(client.enqueue_job(id, &job).await.unwrap());
        assert!(!client.enqueue_job(id, &job).await.unwrap());
        assert_eq!(client.load_job(id, "a").await.unwrap().status(), JobStatus::Enqueued);
    }

    #[tokio::test]
    async fn released_claim_can_be_won_again() {
        let client = MemoryClient::new();
        let id = saved_pair(&client).await;
        let job = client.load_job(id, "a").await.unwrap();

        assert!(!client.release_job(id, &job).await.unwrap());
        assert!(client.enqueue_job(id, &job).await.unwrap());
        assert!(client.release_job(id, &job).await.unwrap());
        assert_eq!(client.load_job(id, "a").await.unwrap().status(), JobStatus::Pending);
        assert!(client.enqueue_job(id, &job).await.unwrap());
    }

    #[tokio::test]
    async fn persisting_workflow_metadata_keeps_job_state() {
        let client = MemoryClient::new();
        let id = saved_pair(&client).await;

        let mut stale = client.find_workflow(id).await.unwrap();

        let mut job = client.load_job(id, "a").await.unwrap();
        job.start().unwrap();
        client.persist_job(id, &job).await.unwrap();

        stale.mark_as_stopped();
        stale.persist(&client).await.unwrap();

        let fresh = stale.reload(&client).await.unwrap();
        assert!(fresh.is_stopped());
        assert!(fresh.job("a").unwrap().is_running());
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let client = MemoryClient::new();
        let id = saved_pair(&client).await;

        assert!(matches!(
            client.find_workflow(Uuid::new_v4()).await,
            Err(ClientError::WorkflowNotFound(_))
        ));
        assert!(matches!(
            client.load_job(id, "zzz").await,
            Err(ClientError::JobNotFound { name, .. }) if name == "zzz"
        ));
    }
}
