//! `db` crate: Postgres-backed persistence for workflows and jobs.
//!
//! Provides a connection pool, typed row structs, repository functions and
//! [`PgClient`], the `engine::PersistenceClient` implementation built on them.

pub mod client;
pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use client::PgClient;
pub use error::DbError;
pub use pool::DbPool;
