//! `jobs` crate: the `ExecutableJob` trait and built-in job implementations.
//!
//! Every job type a workflow can reference must implement [`ExecutableJob`].
//! The engine crate resolves a job's type tag to one of these trait objects
//! and calls [`ExecutableJob::work`] exactly once per dispatch.

pub mod builtin;
pub mod error;
pub mod mock;
pub mod traits;

pub use error::JobError;
pub use traits::{ExecutableJob, JobContext};
