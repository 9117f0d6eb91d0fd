//! `engine` crate: job nodes, the dependency graph, the workflow aggregate
//! and the execution cascade that drives jobs to completion.

pub mod client;
pub mod config;
pub mod dag;
pub mod definition;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod job;
pub mod memory;
pub mod registry;
pub mod worker;
pub mod workflow;

pub use client::{PersistenceClient, ReportStatus, WorkerReport, WorkflowReport};
pub use config::Configuration;
pub use dag::Dependency;
pub use definition::{JobSpec, WorkflowDefinition, WorkflowRegistry, WorkflowSpec};
pub use dispatch::Dispatcher;
pub use error::{ClientError, EngineError};
pub use executor::{CascadeOutcome, ExecutionCascade};
pub use job::{JobNode, JobStatus};
pub use memory::MemoryClient;
pub use registry::JobRegistry;
pub use worker::Worker;
pub use workflow::{RunOptions, Workflow, WorkflowStatus};
