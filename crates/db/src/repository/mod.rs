//! Repository functions, one per database operation.
//!
//! Every function takes a Postgres executor and returns a
//! `Result<T, DbError>`.  Plain SQL only.

pub mod jobs;
pub mod workflows;
