//! `dagflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: build a workflow definition file and print its job order.
//! - `run`     : run a workflow definition in-process with the built-in jobs.
//! - `migrate` : run pending database migrations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{
    Configuration, ExecutionCascade, JobRegistry, MemoryClient, PersistenceClient, Worker,
    Workflow, WorkflowRegistry, WorkflowSpec,
};
use queue::ChannelQueue;

#[derive(Parser)]
#[command(
    name = "dagflow",
    about = "DAG job workflow orchestrator",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Run a workflow to completion in this process.
    Run {
        /// Workflow JSON files to register.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Name of the workflow to run; may be omitted when only one is given.
        #[arg(long)]
        workflow: Option<String>,
        #[arg(long, env = "DAGFLOW_NAMESPACE", default_value = "dagflow")]
        namespace: String,
        #[arg(long, env = "DAGFLOW_CONCURRENCY", default_value_t = 5)]
        concurrency: usize,
        /// How often to check whether the workflow has settled, in milliseconds.
        #[arg(long, default_value_t = 50)]
        poll_ms: u64,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let spec = load_spec(&path)?;
            spec.check_job_types(&JobRegistry::with_builtins())?;

            match Workflow::from_definition(&spec).and_then(|wf| wf.topological_order()) {
                Ok(order) => {
                    println!("✅ Workflow is valid. Execution order: {order:?}");
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run { paths, workflow, namespace, concurrency, poll_ms } => {
            let config = Configuration {
                namespace,
                concurrency,
                database_url: None,
            };
            let registry = JobRegistry::with_builtins();
            let definitions = register_all(&paths, &registry)?;
            let name = pick_workflow(&definitions, workflow)?;
            let workflow = run(
                definitions.build(&name)?,
                registry,
                &config,
                Duration::from_millis(poll_ms),
            )
            .await?;
            println!("{}", workflow.to_json_pretty()?);
            if workflow.is_failed() {
                std::process::exit(1);
            }
        }
        Command::Migrate { database_url } => {
            info!("Running migrations");
            let config = Configuration {
                database_url: Some(database_url),
                concurrency: 1,
                ..Configuration::default()
            };
            let client = db::pool::connect(&config)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(client.pool())
                .await
                .context("migration failed")?;
            info!("Migrations applied successfully");
        }
    }

    Ok(())
}

fn load_spec(path: &Path) -> Result<WorkflowSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    WorkflowSpec::from_json(&content).context("invalid workflow definition")
}

/// Load every definition file into a registry, rejecting unknown job types.
fn register_all(paths: &[PathBuf], jobs: &JobRegistry) -> Result<WorkflowRegistry> {
    let mut definitions = WorkflowRegistry::new();
    for path in paths {
        let spec = load_spec(path)?;
        spec.check_job_types(jobs)
            .with_context(|| format!("in {}", path.display()))?;
        definitions.register(spec);
    }
    Ok(definitions)
}

fn pick_workflow(definitions: &WorkflowRegistry, requested: Option<String>) -> Result<String> {
    if let Some(name) = requested {
        return Ok(name);
    }
    match definitions.names().as_slice() {
        [only] => Ok((*only).to_owned()),
        names => bail!("several workflows given ({}); choose one with --workflow", names.join(", ")),
    }
}

/// Start `workflow` and drive it until nothing more can run.
async fn run(
    mut workflow: Workflow,
    registry: JobRegistry,
    config: &Configuration,
    poll: Duration,
) -> Result<Workflow> {
    let client: Arc<dyn PersistenceClient> = Arc::new(MemoryClient::new());
    let (queue, rx) = ChannelQueue::new();
    let cascade = Arc::new(ExecutionCascade::new(client.clone(), Arc::new(queue), registry));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(Worker::new(cascade.clone(), config).run(rx, shutdown_rx));

    let initial = workflow.start(cascade.dispatcher(), config).await?;
    let id = workflow.require_id()?;
    info!(workflow_id = %id, ?initial, "workflow running");

    let settled = loop {
        let current = client.find_workflow(id).await?;
        if current.is_settled() {
            break current;
        }
        tokio::time::sleep(poll).await;
    };

    if shutdown_tx.send(true).is_err() {
        bail!("worker exited before the workflow settled");
    }
    worker.await.context("worker task panicked")?;

    info!(workflow_id = %id, status = %settled.status(), "workflow settled");
    Ok(settled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos").join(name)
    }

    #[test]
    fn demos_register_under_their_names() {
        let definitions =
            register_all(&[demo("etl.json"), demo("failing.json")], &JobRegistry::with_builtins())
                .unwrap();
        assert_eq!(definitions.names().len(), 2);

        for name in definitions.names() {
            let workflow = definitions.build(name).unwrap();
            assert_eq!(workflow.name(), name);
            assert!(!workflow.initial_jobs().is_empty());
        }
    }

    #[test]
    fn single_definition_is_picked_without_a_name() {
        let definitions = register_all(&[demo("etl.json")], &JobRegistry::with_builtins()).unwrap();
        let only = definitions.names()[0].to_owned();
        assert_eq!(pick_workflow(&definitions, None).unwrap(), only);
    }

    #[test]
    fn several_definitions_need_an_explicit_name() {
        let definitions =
            register_all(&[demo("etl.json"), demo("failing.json")], &JobRegistry::with_builtins())
                .unwrap();
        assert!(pick_workflow(&definitions, None).is_err());
        assert_eq!(
            pick_workflow(&definitions, Some("Anything".into())).unwrap(),
            "Anything"
        );
    }
}
