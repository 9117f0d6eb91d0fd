//! Queue error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Every receiver has been dropped.
    #[error("dispatch queue is closed")]
    Closed,
}
