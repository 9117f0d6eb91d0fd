//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models; the conversions at the bottom turn them
//! into the engine's domain types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use engine::{JobNode, JobStatus, Workflow};

use crate::DbError;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// Workflow metadata row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    /// Workflow type tag.
    pub klass: String,
    pub stopped: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// workflow_jobs
// ---------------------------------------------------------------------------

/// One job of one workflow.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub workflow_id: Uuid,
    /// Declaration order inside the workflow.
    pub position: i32,
    pub name: String,
    pub klass: String,
    /// Text form of `engine::JobStatus`.
    pub status: String,
    pub incoming: Json<Vec<String>>,
    pub outgoing: Json<Vec<String>>,
    pub params: Json<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRow {
    pub fn from_node(workflow_id: Uuid, position: i32, job: &JobNode) -> Self {
        Self {
            workflow_id,
            position,
            name: job.name.clone(),
            klass: job.klass.clone(),
            status: job.status().to_string(),
            incoming: Json(job.incoming.iter().cloned().collect()),
            outgoing: Json(job.outgoing.iter().cloned().collect()),
            params: Json(job.params.clone()),
            started_at: job.started_at(),
            finished_at: job.finished_at(),
        }
    }
}

impl TryFrom<JobRow> for JobNode {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row.status.parse().map_err(DbError::Corrupt)?;
        let mut node = JobNode::new(row.name, row.klass, row.params.0)
            .with_state(status, row.started_at, row.finished_at);
        node.incoming = row.incoming.0.into_iter().collect::<BTreeSet<_>>();
        node.outgoing = row.outgoing.0.into_iter().collect::<BTreeSet<_>>();
        Ok(node)
    }
}

/// Assemble a workflow from its metadata row and job rows (any order).
pub fn into_workflow(row: WorkflowRow, mut jobs: Vec<JobRow>) -> Result<Workflow, DbError> {
    jobs.sort_by_key(|j| j.position);
    let jobs = jobs
        .into_iter()
        .map(JobNode::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Workflow::restore(row.id, row.name, row.klass, jobs, row.stopped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node() -> JobNode {
        let mut node = JobNode::new("persist", "sleep", json!({ "millis": 5 }));
        node.incoming.insert("fetch".into());
        node.outgoing.insert("notify".into());
        node.start().unwrap();
        node
    }

    #[test]
    fn job_row_maps_back_to_the_same_node() {
        let original = node();
        let row = JobRow::from_node(Uuid::new_v4(), 1, &original);
        assert_eq!(row.status, "running");

        let restored = JobNode::try_from(row).unwrap();
        assert_eq!(restored, original);
    }

    const SCHEMA: &str = include_str!("../../../migrations/20240101000000_create_workflows.sql");

    const ALL_STATUSES: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Enqueued,
        JobStatus::Running,
        JobStatus::Finished,
        JobStatus::Failed,
    ];

    #[test]
    fn claim_states_are_stored_as_plain_text() {
        let mut job = JobNode::new("a", "noop", serde_json::Value::Null);
        assert_eq!(JobRow::from_node(Uuid::new_v4(), 0, &job).status, "pending");
        job.enqueue().unwrap();
        assert_eq!(JobRow::from_node(Uuid::new_v4(), 0, &job).status, "enqueued");
    }

    #[test]
    fn every_status_text_is_allowed_by_the_schema_and_parses_back() {
        for status in ALL_STATUSES {
            let text = status.to_string();
            assert!(
                SCHEMA.contains(&format!("'{text}'")),
                "status '{text}' missing from the workflow_jobs CHECK constraint"
            );
            assert_eq!(text.parse::<JobStatus>().unwrap(), status);
        }
        assert!(SCHEMA.contains("DEFAULT 'pending'"));
    }

    #[test]
    fn unknown_status_text_is_corrupt() {
        let mut row = JobRow::from_node(Uuid::new_v4(), 0, &node());
        row.status = "exploded".into();
        assert!(matches!(JobNode::try_from(row), Err(DbError::Corrupt(_))));
    }

    #[test]
    fn jobs_are_restored_in_declaration_order() {
        let id = Uuid::new_v4();
        let first = JobNode::new("first", "noop", serde_json::Value::Null);
        let second = JobNode::new("second", "noop", serde_json::Value::Null);
        let rows = vec![JobRow::from_node(id, 1, &second), JobRow::from_node(id, 0, &first)];
        let meta = WorkflowRow {
            id,
            name: "Ordered".into(),
            klass: "Ordered".into(),
            stopped: true,
            created_at: Utc::now(),
        };

        let wf = into_workflow(meta, rows).unwrap();
        let names: Vec<_> = wf.jobs().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(wf.is_stopped());
        assert_eq!(wf.id(), Some(id));
    }
}
