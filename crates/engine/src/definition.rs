//! Workflow definitions.
//!
//! A [`WorkflowDefinition`] is the code-side description of a workflow type:
//! its name plus a `configure` step that declares jobs.  [`WorkflowSpec`] is
//! the same thing loaded from JSON, and [`WorkflowRegistry`] lets a process
//! build any known workflow type by name.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EngineError, JobRegistry, RunOptions, Workflow};

pub trait WorkflowDefinition: Send + Sync {
    /// Type tag of the workflow; becomes its `name` and `klass`.
    fn name(&self) -> &str;

    /// Declare the workflow's jobs with `Workflow::run`.
    fn configure(&self, workflow: &mut Workflow);
}

impl Workflow {
    /// Configure a fresh workflow from `definition` and materialize its graph.
    pub fn from_definition(definition: &dyn WorkflowDefinition) -> Result<Self, EngineError> {
        let mut workflow = Workflow::new(definition.name());
        definition.configure(&mut workflow);
        workflow.create_dependencies()?;
        Ok(workflow)
    }
}

// ---------------------------------------------------------------------------
// Declarative definitions
// ---------------------------------------------------------------------------

/// One job entry of a [`WorkflowSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Job type tag.
    pub job: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub params: Value,
}

/// A workflow definition loaded from JSON:
///
/// ```json
/// { "name": "Publish", "jobs": [ { "job": "fetch" }, { "job": "persist", "after": ["fetch"] } ] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    pub jobs: Vec<JobSpec>,
}

impl WorkflowSpec {
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Every job type used here must be known to `registry`.
    pub fn check_job_types(&self, registry: &JobRegistry) -> Result<(), EngineError> {
        match self.jobs.iter().find(|j| !registry.contains(&j.job)) {
            Some(unknown) => Err(EngineError::InvalidDefinition(format!(
                "job type '{}' is not registered",
                unknown.job
            ))),
            None => Ok(()),
        }
    }
}

impl WorkflowDefinition for WorkflowSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&self, workflow: &mut Workflow) {
        for job in &self.jobs {
            let mut options = RunOptions::new()
                .after(job.after.iter().cloned())
                .before(job.before.iter().cloned())
                .params(job.params.clone());
            if let Some(name) = &job.name {
                options = options.named(name.clone());
            }
            workflow.run(job.job.clone(), options);
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowRegistry
// ---------------------------------------------------------------------------

/// Known workflow types, keyed by name.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    definitions: HashMap<String, Arc<dyn WorkflowDefinition>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<D>(&mut self, definition: D) -> &mut Self
    where
        D: WorkflowDefinition + 'static,
    {
        self.definitions
            .insert(definition.name().to_owned(), Arc::new(definition));
        self
    }

    /// Build a new, unsaved instance of the workflow type `name`.
    pub fn build(&self, name: &str) -> Result<Workflow, EngineError> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| EngineError::UnknownWorkflowType(name.to_owned()))?;
        Workflow::from_definition(definition.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Publish;

    impl WorkflowDefinition for Publish {
        fn name(&self) -> &str {
            "Publish"
        }

        fn configure(&self, workflow: &mut Workflow) {
            workflow
                .run("fetch", RunOptions::new())
                .run("persist", RunOptions::new().after(["fetch"]))
                .run("notify", RunOptions::new().after(["persist"]));
        }
    }

    #[test]
    fn registry_builds_materialized_workflows() {
        let mut registry = WorkflowRegistry::new();
        registry.register(Publish);

        let wf = registry.build("Publish").unwrap();
        assert_eq!(wf.klass(), "Publish");
        assert_eq!(wf.topological_order().unwrap(), vec!["fetch", "persist", "notify"]);
        assert!(wf.pending_dependencies().is_empty());
        assert!(wf.id().is_none());
    }

    #[test]
    fn unknown_workflow_type_is_an_error() {
        let registry = WorkflowRegistry::new();
        assert!(matches!(
            registry.build("Nope"),
            Err(EngineError::UnknownWorkflowType(name)) if name == "Nope"
        ));
    }

    #[test]
    fn spec_from_json_builds_the_graph() {
        let spec = WorkflowSpec::from_json(
            r#"{
                "name": "Etl",
                "jobs": [
                    { "job": "noop", "name": "extract" },
                    { "job": "sleep", "name": "transform", "after": ["extract"], "params": { "millis": 1 } },
                    { "job": "noop", "name": "load", "after": ["transform"], "before": ["report"] },
                    { "job": "noop", "name": "report" }
                ]
            }"#,
        )
        .unwrap();

        spec.check_job_types(&JobRegistry::with_builtins()).unwrap();
        let wf = Workflow::from_definition(&spec).unwrap();
        assert_eq!(
            wf.topological_order().unwrap(),
            vec!["extract", "transform", "load", "report"]
        );
        assert!(wf.job("report").unwrap().incoming.contains("load"));
    }

    #[test]
    fn spec_with_unregistered_job_type_is_rejected() {
        let spec = WorkflowSpec::from_json(r#"{"name": "X", "jobs": [{"job": "shell"}]}"#).unwrap();
        assert!(matches!(
            spec.check_job_types(&JobRegistry::with_builtins()),
            Err(EngineError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn spec_with_dangling_dependency_fails_to_build() {
        let spec = WorkflowSpec::from_json(
            r#"{"name": "X", "jobs": [{"job": "noop", "after": ["ghost"]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            Workflow::from_definition(&spec),
            Err(EngineError::UnknownJobReference { .. })
        ));
    }
}
