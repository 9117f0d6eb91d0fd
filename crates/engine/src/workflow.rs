//! The workflow aggregate: the job nodes of one workflow instance plus the
//! status derived from them.
//!
//! A workflow is populated through [`Workflow::run`] during configuration,
//! has its declared dependencies materialized once by
//! [`Workflow::create_dependencies`], and is then saved.  After that it only
//! changes through individual job transitions persisted by executors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dag::{self, Dependency};
use crate::{Configuration, Dispatcher, EngineError, JobNode, PersistenceClient};

// ---------------------------------------------------------------------------
// WorkflowStatus
// ---------------------------------------------------------------------------

/// Status of a workflow, always derived from its jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Pending,
    Running,
    Finished,
    Failed,
    Stopped,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending  => write!(f, "pending"),
            Self::Running  => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Failed   => write!(f, "failed"),
            Self::Stopped  => write!(f, "stopped"),
        }
    }
}

// ---------------------------------------------------------------------------
// RunOptions
// ---------------------------------------------------------------------------

/// Dependencies and per-instance settings for one `Workflow::run` call.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Jobs that must finish before this one.
    pub after: Vec<String>,
    /// Jobs that must wait for this one.
    pub before: Vec<String>,
    /// Node name; defaults to the job type.
    pub name: Option<String>,
    pub params: Value,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn after<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn before<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.before.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "WorkflowRepr", from = "WorkflowRepr")]
pub struct Workflow {
    id: Option<Uuid>,
    name: String,
    klass: String,
    jobs: Vec<JobNode>,
    dependencies: Vec<Dependency>,
    stopped: bool,
    persisted: bool,
}

impl Workflow {
    /// An empty, unsaved workflow whose type tag equals its name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: None,
            klass: name.clone(),
            name,
            jobs: Vec::new(),
            dependencies: Vec::new(),
            stopped: false,
            persisted: false,
        }
    }

    /// Rebuild a workflow from stored parts; the jobs must already carry
    /// their materialized adjacency.
    pub fn restore(
        id: Uuid,
        name: impl Into<String>,
        klass: impl Into<String>,
        jobs: Vec<JobNode>,
        stopped: bool,
    ) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            klass: klass.into(),
            jobs,
            dependencies: Vec::new(),
            stopped,
            persisted: true,
        }
    }

    pub fn with_klass(mut self, klass: impl Into<String>) -> Self {
        self.klass = klass.into();
        self
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn require_id(&self) -> Result<Uuid, EngineError> {
        self.id.ok_or(EngineError::NotSaved)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn klass(&self) -> &str {
        &self.klass
    }

    pub fn jobs(&self) -> &[JobNode] {
        &self.jobs
    }

    /// Dependency pairs declared but not yet materialized.
    pub fn pending_dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Declare a job of type `job_type` with the given dependencies.
    pub fn run(&mut self, job_type: impl Into<String>, options: RunOptions) -> &mut Self {
        let klass = job_type.into();
        let name = options.name.unwrap_or_else(|| klass.clone());

        for dep in options.after {
            self.dependencies.push(Dependency { from: dep, to: name.clone() });
        }
        for dep in options.before {
            self.dependencies.push(Dependency { from: name.clone(), to: dep });
        }

        self.jobs.push(JobNode::new(name, klass, options.params));
        self
    }

    /// Resolve every pending dependency into `incoming`/`outgoing` adjacency.
    ///
    /// Pending pairs are consumed only on success; an unknown name, duplicate
    /// job or cycle leaves the workflow untouched.  Returns job names in
    /// topological order.
    pub fn create_dependencies(&mut self) -> Result<Vec<String>, EngineError> {
        let order = dag::materialize(&mut self.jobs, &self.dependencies)?;
        self.dependencies.clear();
        Ok(order)
    }

    /// Topological order of the materialized graph.
    pub fn topological_order(&self) -> Result<Vec<String>, EngineError> {
        dag::validate(&self.jobs, &self.dependencies)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    pub async fn find(client: &dyn PersistenceClient, id: Uuid) -> Result<Self, EngineError> {
        Ok(client.find_workflow(id).await?)
    }

    /// Fresh copy of this workflow from the store.
    pub async fn reload(&self, client: &dyn PersistenceClient) -> Result<Self, EngineError> {
        Self::find(client, self.require_id()?).await
    }

    /// Materialize pending dependencies, assign an id if needed and persist.
    pub async fn save(&mut self, client: &dyn PersistenceClient) -> Result<Uuid, EngineError> {
        if !self.dependencies.is_empty() {
            self.create_dependencies()?;
        }

        let id = match self.id {
            Some(id) => id,
            None => {
                let id = client.next_free_id().await?;
                self.id = Some(id);
                id
            }
        };

        client.persist_workflow(self).await?;
        self.mark_as_persisted();
        Ok(id)
    }

    /// Persist metadata of an already-saved workflow (e.g. after stopping it).
    pub async fn persist(&self, client: &dyn PersistenceClient) -> Result<(), EngineError> {
        self.require_id()?;
        Ok(client.persist_workflow(self).await?)
    }

    /// Mark runnable and dispatch the initial jobs.
    pub async fn start(
        &mut self,
        dispatcher: &Dispatcher,
        config: &Configuration,
    ) -> Result<Vec<String>, EngineError> {
        dispatcher.start_workflow(self, config).await
    }

    pub fn mark_as_stopped(&mut self) {
        self.stopped = true;
    }

    pub fn mark_as_started(&mut self) {
        self.stopped = false;
    }

    pub fn mark_as_persisted(&mut self) {
        self.persisted = true;
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn find_job(&self, name: &str) -> Option<&JobNode> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn job(&self, name: &str) -> Result<&JobNode, EngineError> {
        self.find_job(name)
            .ok_or_else(|| EngineError::JobNotFound(name.to_owned()))
    }

    pub(crate) fn find_job_mut(&mut self, name: &str) -> Option<&mut JobNode> {
        self.jobs.iter_mut().find(|j| j.name == name)
    }

    /// Append jobs from `other` that this copy doesn't know yet.
    pub(crate) fn merge_new_jobs(&mut self, other: &Workflow) {
        for job in &other.jobs {
            if self.find_job(&job.name).is_none() {
                self.jobs.push(job.clone());
            }
        }
    }

    pub(crate) fn set_metadata_from(&mut self, other: &Workflow) {
        self.name = other.name.clone();
        self.klass = other.klass.clone();
        self.stopped = other.stopped;
    }

    /// Jobs with no predecessors; what a start dispatches.
    pub fn initial_jobs(&self) -> Vec<&JobNode> {
        self.jobs.iter().filter(|j| j.has_no_dependencies()).collect()
    }

    /// Readiness of `name` evaluated against this copy's job statuses.
    pub fn ready_to_start(&self, name: &str) -> Result<bool, EngineError> {
        let job = self.job(name)?;
        Ok(job.ready_to_start(|n| self.find_job(n).map(JobNode::status)))
    }

    pub fn is_finished(&self) -> bool {
        self.jobs.iter().all(JobNode::is_finished)
    }

    pub fn is_failed(&self) -> bool {
        self.jobs.iter().any(JobNode::is_failed)
    }

    pub fn is_running(&self) -> bool {
        !self.stopped && self.jobs.iter().any(|j| j.is_enqueued() || j.is_running())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// No job is in flight and no pending job could still become ready.
    pub fn is_settled(&self) -> bool {
        let in_flight = self.jobs.iter().any(|j| j.is_enqueued() || j.is_running());
        let startable = self
            .jobs
            .iter()
            .filter(|j| j.is_pending())
            .any(|j| j.ready_to_start(|n| self.find_job(n).map(JobNode::status)));
        !in_flight && !startable
    }

    /// First match wins: failed, running, finished, stopped, pending.
    pub fn status(&self) -> WorkflowStatus {
        if self.is_failed() {
            WorkflowStatus::Failed
        } else if self.is_running() {
            WorkflowStatus::Running
        } else if self.is_finished() {
            WorkflowStatus::Finished
        } else if self.is_stopped() {
            WorkflowStatus::Stopped
        } else {
            WorkflowStatus::Pending
        }
    }

    /// Earliest `started_at` among the jobs that have started.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.jobs.iter().filter_map(JobNode::started_at).min()
    }

    /// Latest `finished_at`, only once every job has finished.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        if !self.is_finished() {
            return None;
        }
        self.jobs.iter().filter_map(JobNode::finished_at).max()
    }

    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn finished_count(&self) -> usize {
        self.jobs.iter().filter(|j| j.is_finished()).count()
    }

    // ------------------------------------------------------------------
    // External representation
    // ------------------------------------------------------------------

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Wire shape of a workflow: `{name, id, total, finished, klass, jobs,
/// status, stopped, started_at, finished_at}`.
///
/// Counts, status and timestamps are recomputed from `jobs` when reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkflowRepr {
    name: String,
    id: Option<Uuid>,
    #[serde(default)]
    total: usize,
    #[serde(default)]
    finished: usize,
    klass: String,
    #[serde(default)]
    jobs: Vec<JobNode>,
    #[serde(default)]
    status: WorkflowStatus,
    #[serde(default)]
    stopped: bool,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
}

impl From<Workflow> for WorkflowRepr {
    fn from(workflow: Workflow) -> Self {
        Self {
            total: workflow.total(),
            finished: workflow.finished_count(),
            status: workflow.status(),
            started_at: workflow.started_at(),
            finished_at: workflow.finished_at(),
            name: workflow.name,
            id: workflow.id,
            klass: workflow.klass,
            jobs: workflow.jobs,
            stopped: workflow.stopped,
        }
    }
}

impl From<WorkflowRepr> for Workflow {
    fn from(repr: WorkflowRepr) -> Self {
        Self {
            persisted: repr.id.is_some(),
            id: repr.id,
            name: repr.name,
            klass: repr.klass,
            jobs: repr.jobs,
            dependencies: Vec::new(),
            stopped: repr.stopped,
        }
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobStatus;
    use serde_json::json;

    /// A → {B, C} → D
    fn diamond() -> Workflow {
        let mut wf = Workflow::new("Diamond");
        wf.run("a", RunOptions::new())
            .run("b", RunOptions::new().after(["a"]))
            .run("c", RunOptions::new().after(["a"]))
            .run("d", RunOptions::new().after(["b", "c"]));
        wf.create_dependencies().expect("valid graph");
        wf
    }

    fn advance(wf: &mut Workflow, name: &str, to: JobStatus) {
        let job = wf.find_job_mut(name).unwrap();
        if to == JobStatus::Enqueued {
            job.enqueue().unwrap();
            return;
        }
        job.start().unwrap();
        match to {
            JobStatus::Finished => job.finish().unwrap(),
            JobStatus::Failed => job.fail().unwrap(),
            _ => {}
        }
    }

    #[test]
    fn run_records_after_and_before_pairs() {
        let mut wf = Workflow::new("Pairs");
        wf.run("fetch", RunOptions::new().before(["persist"]))
            .run("persist", RunOptions::new())
            .run("notify", RunOptions::new().after(["persist"]));

        assert_eq!(
            wf.pending_dependencies(),
            &[
                Dependency { from: "fetch".into(), to: "persist".into() },
                Dependency { from: "persist".into(), to: "notify".into() },
            ]
        );

        let order = wf.create_dependencies().unwrap();
        assert_eq!(order, vec!["fetch", "persist", "notify"]);
        assert!(wf.pending_dependencies().is_empty());
        assert!(wf.job("persist").unwrap().incoming.contains("fetch"));
        assert!(wf.job("persist").unwrap().outgoing.contains("notify"));
    }

    #[test]
    fn named_runs_allow_one_type_twice() {
        let mut wf = Workflow::new("Twice");
        wf.run("sleep", RunOptions::new().named("first"))
            .run("sleep", RunOptions::new().named("second").after(["first"]).params(json!({"millis": 5})));
        wf.create_dependencies().unwrap();

        let second = wf.job("second").unwrap();
        assert_eq!(second.klass, "sleep");
        assert_eq!(second.params["millis"], 5);
        assert!(second.incoming.contains("first"));
    }

    #[test]
    fn unknown_dependency_fails_the_build() {
        let mut wf = Workflow::new("Broken");
        wf.run("a", RunOptions::new().after(["missing"]));

        assert!(matches!(
            wf.create_dependencies(),
            Err(EngineError::UnknownJobReference { name, .. }) if name == "missing"
        ));
        assert_eq!(wf.pending_dependencies().len(), 1);
        assert!(wf.job("a").unwrap().incoming.is_empty());
    }

    #[test]
    fn initial_jobs_are_those_without_predecessors() {
        let mut wf = Workflow::new("Roots");
        wf.run("a", RunOptions::new())
            .run("b", RunOptions::new())
            .run("c", RunOptions::new().after(["a", "b"]));
        wf.create_dependencies().unwrap();

        let names: Vec<_> = wf.initial_jobs().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn fresh_workflow_is_pending_without_start_time() {
        let wf = diamond();
        assert_eq!(wf.status(), WorkflowStatus::Pending);
        assert!(wf.started_at().is_none());
        assert!(wf.finished_at().is_none());
    }

    #[test]
    fn enqueued_job_makes_workflow_running() {
        let mut wf = diamond();
        advance(&mut wf, "a", JobStatus::Enqueued);
        assert_eq!(wf.status(), WorkflowStatus::Running);
        assert!(wf.is_running());
    }

    #[test]
    fn all_finished_reports_latest_finish_time() {
        let mut wf = diamond();
        for name in ["a", "b", "c", "d"] {
            advance(&mut wf, name, JobStatus::Finished);
        }

        assert_eq!(wf.status(), WorkflowStatus::Finished);
        let latest = wf.jobs().iter().filter_map(JobNode::finished_at).max();
        assert_eq!(wf.finished_at(), latest);
        let earliest = wf.jobs().iter().filter_map(JobNode::started_at).min();
        assert_eq!(wf.started_at(), earliest);
        assert_eq!(wf.finished_count(), 4);
    }

    #[test]
    fn finished_at_is_absent_until_every_job_finishes() {
        let mut wf = diamond();
        advance(&mut wf, "a", JobStatus::Finished);
        assert!(wf.finished_at().is_none());
        assert!(wf.started_at().is_some());
    }

    #[test]
    fn failure_outranks_everything() {
        let mut wf = diamond();
        advance(&mut wf, "a", JobStatus::Finished);
        advance(&mut wf, "b", JobStatus::Failed);
        advance(&mut wf, "c", JobStatus::Running);
        assert_eq!(wf.status(), WorkflowStatus::Failed);

        wf.find_job_mut("c").unwrap().finish().unwrap();
        wf.mark_as_stopped();
        assert_eq!(wf.status(), WorkflowStatus::Failed);
    }

    #[test]
    fn stopped_flag_suppresses_running() {
        let mut wf = diamond();
        advance(&mut wf, "a", JobStatus::Finished);
        wf.mark_as_stopped();
        assert_eq!(wf.status(), WorkflowStatus::Stopped);

        advance(&mut wf, "b", JobStatus::Enqueued);
        assert!(!wf.is_running());
        assert_eq!(wf.status(), WorkflowStatus::Stopped);

        wf.mark_as_started();
        assert_eq!(wf.status(), WorkflowStatus::Running);
    }

    #[test]
    fn stopped_but_fully_finished_is_finished() {
        let mut wf = diamond();
        for name in ["a", "b", "c", "d"] {
            advance(&mut wf, name, JobStatus::Finished);
        }
        wf.mark_as_stopped();
        assert_eq!(wf.status(), WorkflowStatus::Finished);
    }

    #[test]
    fn readiness_follows_predecessors() {
        let mut wf = diamond();
        assert!(wf.ready_to_start("a").unwrap());
        assert!(!wf.ready_to_start("b").unwrap());

        advance(&mut wf, "a", JobStatus::Finished);
        assert!(wf.ready_to_start("b").unwrap());
        assert!(wf.ready_to_start("c").unwrap());

        advance(&mut wf, "b", JobStatus::Finished);
        assert!(!wf.ready_to_start("d").unwrap());
        advance(&mut wf, "c", JobStatus::Finished);
        assert!(wf.ready_to_start("d").unwrap());
    }

    #[test]
    fn settled_once_nothing_can_progress() {
        let mut wf = diamond();
        assert!(!wf.is_settled());

        advance(&mut wf, "a", JobStatus::Finished);
        assert!(!wf.is_settled());

        advance(&mut wf, "b", JobStatus::Failed);
        advance(&mut wf, "c", JobStatus::Finished);
        assert!(wf.is_settled());
        assert_eq!(wf.status(), WorkflowStatus::Failed);
    }

    #[test]
    fn external_representation_has_derived_fields() {
        let mut wf = diamond();
        advance(&mut wf, "a", JobStatus::Finished);

        let value: Value = serde_json::from_str(&wf.to_json().unwrap()).unwrap();
        assert_eq!(value["name"], "Diamond");
        assert_eq!(value["klass"], "Diamond");
        assert_eq!(value["total"], 4);
        assert_eq!(value["finished"], 1);
        assert_eq!(value["status"], "pending");
        assert_eq!(value["stopped"], false);
        assert_eq!(value["jobs"][0]["status"], "finished");
        assert!(value["started_at"].is_string());
        assert!(value["finished_at"].is_null());
    }

    #[test]
    fn json_round_trip_keeps_id_statuses_and_stopped() {
        let mut wf = diamond();
        wf.id = Some(Uuid::new_v4());
        advance(&mut wf, "a", JobStatus::Finished);
        advance(&mut wf, "b", JobStatus::Running);
        wf.mark_as_stopped();

        let back = Workflow::from_json(&wf.to_json().unwrap()).unwrap();
        assert_eq!(back.id(), wf.id());
        assert!(back.is_stopped());
        for job in wf.jobs() {
            let restored = back.job(&job.name).unwrap();
            assert_eq!(restored.status(), job.status());
            assert_eq!(restored.incoming, job.incoming);
            assert_eq!(restored.outgoing, job.outgoing);
        }
        assert_eq!(back.status(), wf.status());
    }

    #[test]
    fn stale_derived_fields_are_ignored_on_read() {
        let raw = json!({
            "name": "Tampered",
            "id": null,
            "klass": "Tampered",
            "total": 99,
            "status": "finished",
            "jobs": [{ "name": "a", "klass": "a", "status": "pending" }]
        });
        let wf = Workflow::from_json(&raw.to_string()).unwrap();
        assert_eq!(wf.total(), 1);
        assert_eq!(wf.status(), WorkflowStatus::Pending);
        assert!(!wf.is_persisted());
    }
}
