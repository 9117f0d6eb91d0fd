//! `PgClient`: the Postgres implementation of `engine::PersistenceClient`.

use async_trait::async_trait;
use tracing::{debug, instrument};
use uuid::Uuid;

use engine::{
    ClientError, JobNode, PersistenceClient, WorkerReport, Workflow, WorkflowReport,
};

use crate::models::{into_workflow, JobRow};
use crate::repository::{jobs as job_repo, workflows as wf_repo};
use crate::{DbError, DbPool};

/// Channel names used for report notifications.
pub const WORKER_REPORT_CHANNEL: &str = "dagflow_worker_report";
pub const WORKFLOW_REPORT_CHANNEL: &str = "dagflow_workflow_report";

#[derive(Debug, Clone)]
pub struct PgClient {
    pool: DbPool,
}

impl PgClient {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn workflow_error(id: Uuid) -> impl FnOnce(DbError) -> ClientError {
    move |err| match err {
        DbError::NotFound => ClientError::WorkflowNotFound(id),
        other => other.into(),
    }
}

fn job_error(workflow_id: Uuid, name: &str) -> impl FnOnce(DbError) -> ClientError + '_ {
    move |err| match err {
        DbError::NotFound => ClientError::JobNotFound {
            workflow_id,
            name: name.to_owned(),
        },
        other => other.into(),
    }
}

fn require_id(workflow: &Workflow) -> Result<Uuid, ClientError> {
    workflow
        .id()
        .ok_or_else(|| ClientError::Backend("workflow has no id".into()))
}

#[async_trait]
impl PersistenceClient for PgClient {
    #[instrument(skip(self))]
    async fn find_workflow(&self, id: Uuid) -> Result<Workflow, ClientError> {
        let row = wf_repo::get_workflow(&self.pool, id)
            .await
            .map_err(workflow_error(id))?;
        let jobs = job_repo::list_jobs(&self.pool, id).await?;
        Ok(into_workflow(row, jobs)?)
    }

    async fn next_free_id(&self) -> Result<Uuid, ClientError> {
        loop {
            let id = Uuid::new_v4();
            if !wf_repo::workflow_exists(&self.pool, id).await? {
                return Ok(id);
            }
        }
    }

    #[instrument(skip_all, fields(workflow = %workflow.name()))]
    async fn persist_workflow(&self, workflow: &Workflow) -> Result<(), ClientError> {
        let id = require_id(workflow)?;
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        wf_repo::upsert_workflow(
            &mut *tx,
            id,
            workflow.name(),
            workflow.klass(),
            workflow.is_stopped(),
        )
        .await?;

        for (position, job) in workflow.jobs().iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| DbError::Corrupt(format!("too many jobs in workflow {id}")))?;
            job_repo::insert_job_if_absent(&mut *tx, &JobRow::from_node(id, position, job)).await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        debug!(workflow_id = %id, jobs = workflow.total(), "workflow persisted");
        Ok(())
    }

    async fn persist_job(&self, workflow_id: Uuid, job: &JobNode) -> Result<(), ClientError> {
        let row = JobRow::from_node(workflow_id, 0, job);
        job_repo::update_job_state(&self.pool, &row)
            .await
            .map_err(job_error(workflow_id, &job.name))
    }

    async fn load_job(&self, workflow_id: Uuid, name: &str) -> Result<JobNode, ClientError> {
        let row = job_repo::get_job(&self.pool, workflow_id, name)
            .await
            .map_err(job_error(workflow_id, name))?;
        Ok(JobNode::try_from(row)?)
    }

    async fn enqueue_job(&self, workflow_id: Uuid, job: &JobNode) -> Result<bool, ClientError> {
        Ok(job_repo::claim_job(&self.pool, workflow_id, &job.name).await?)
    }

    async fn release_job(&self, workflow_id: Uuid, job: &JobNode) -> Result<bool, ClientError> {
        Ok(job_repo::release_job(&self.pool, workflow_id, &job.name).await?)
    }

    async fn start_workflow(&self, workflow: &Workflow) -> Result<(), ClientError> {
        let id = require_id(workflow)?;
        wf_repo::set_stopped(&self.pool, id, false)
            .await
            .map_err(workflow_error(id))
    }

    async fn worker_report(&self, report: WorkerReport) -> Result<(), ClientError> {
        let payload = serde_json::to_string(&report).map_err(DbError::from)?;
        Ok(job_repo::notify(&self.pool, WORKER_REPORT_CHANNEL, &payload).await?)
    }

    async fn workflow_report(&self, report: WorkflowReport) -> Result<(), ClientError> {
        let payload = serde_json::to_string(&report).map_err(DbError::from)?;
        Ok(job_repo::notify(&self.pool, WORKFLOW_REPORT_CHANNEL, &payload).await?)
    }
}
