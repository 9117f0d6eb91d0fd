//! In-process dispatch queue over an unbounded tokio channel.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{DispatchMessage, DispatchQueue, QueueError};

/// Receiving half handed to a worker.
pub type DispatchReceiver = mpsc::UnboundedReceiver<DispatchMessage>;

/// Sending half; cheap to clone and share between cascades.
#[derive(Debug, Clone)]
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<DispatchMessage>,
}

impl ChannelQueue {
    /// Create a queue and the receiver that drains it.
    pub fn new() -> (Self, DispatchReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DispatchQueue for ChannelQueue {
    async fn push(&self, message: DispatchMessage) -> Result<(), QueueError> {
        debug!(workflow_id = %message.workflow_id, job = %message.job, "dispatching job");
        self.tx.send(message).map_err(|_| QueueError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn messages_arrive_in_push_order() {
        let (queue, mut rx) = ChannelQueue::new();
        let id = Uuid::new_v4();

        queue.push(DispatchMessage::new(id, "a", "{}")).await.unwrap();
        queue.push(DispatchMessage::new(id, "b", "{}")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().job, "a");
        assert_eq!(rx.recv().await.unwrap().job, "b");
    }

    #[tokio::test]
    async fn push_after_receiver_dropped_is_closed() {
        let (queue, rx) = ChannelQueue::new();
        drop(rx);

        let err = queue
            .push(DispatchMessage::new(Uuid::new_v4(), "a", "{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Closed));
    }
}
