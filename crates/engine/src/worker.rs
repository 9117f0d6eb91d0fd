//! Background worker: drains the dispatch queue and runs one cascade per
//! message, at most `concurrency` at a time.

use std::sync::Arc;

use queue::{DispatchMessage, DispatchReceiver};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, instrument};

use crate::{CascadeOutcome, Configuration, ExecutionCascade};

pub struct Worker {
    cascade: Arc<ExecutionCascade>,
    concurrency: usize,
}

impl Worker {
    pub fn new(cascade: Arc<ExecutionCascade>, config: &Configuration) -> Self {
        Self {
            cascade,
            concurrency: config.concurrency.max(1),
        }
    }

    /// Process messages until the queue closes or `shutdown` flips to `true`
    /// (or its sender is dropped).  In-flight cascades are awaited before
    /// returning.
    #[instrument(skip_all, fields(concurrency = self.concurrency))]
    pub async fn run(self, mut rx: DispatchReceiver, mut shutdown: watch::Receiver<bool>) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        info!("worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let message = tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let cascade = self.cascade.clone();
            tasks.spawn(async move {
                let _permit = permit;
                handle(&cascade, message).await;
            });

            while tasks.try_join_next().is_some() {}
        }

        while tasks.join_next().await.is_some() {}
        info!("worker stopped");
    }
}

async fn handle(cascade: &ExecutionCascade, message: DispatchMessage) {
    let config = match Configuration::from_json(&message.configuration) {
        Ok(config) => config,
        Err(err) => {
            error!(job = %message.job, error = %err, "dropping message with unreadable configuration");
            return;
        }
    };

    match cascade.execute(message.workflow_id, &message.job, &config).await {
        Ok(CascadeOutcome::Failed { error }) => {
            info!(workflow_id = %message.workflow_id, job = %message.job, %error, "cascade ended in failure");
        }
        Ok(_) => {}
        Err(err) => {
            error!(workflow_id = %message.workflow_id, job = %message.job, error = %err, "cascade aborted");
        }
    }
}
