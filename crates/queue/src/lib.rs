//! `queue` crate: the dispatch transport between the engine and workers.
//!
//! A [`DispatchMessage`] names one job of one workflow plus the serialized
//! configuration the receiving executor should run it with.  The engine only
//! talks to the [`DispatchQueue`] trait; [`ChannelQueue`] is the in-process
//! implementation backed by a tokio channel.

pub mod channel;
pub mod error;
pub mod message;

pub use channel::{ChannelQueue, DispatchReceiver};
pub use error::QueueError;
pub use message::DispatchMessage;

use async_trait::async_trait;

/// Anything that can deliver a job to an executor.
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    async fn push(&self, message: DispatchMessage) -> Result<(), QueueError>;
}
