//! Retained republisher for overall-state snapshots.
//!
//! Producers push serialized snapshots through a cheap [`StateHandle`]; one
//! always-running consumer task drains the unbounded FIFO queue and
//! republishes each snapshot retained on the fixed state topic. Nothing is
//! coalesced, and a dequeued snapshot is retried until it goes out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::transport::Transport;

/// Delay between retries of a failed state publish.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Producer half; clone freely.
#[derive(Clone)]
pub struct StateHandle {
    queue: mpsc::UnboundedSender<Vec<u8>>,
}

impl StateHandle {
    /// Enqueue one snapshot. Silently dropped if the publisher is gone,
    /// which only happens during shutdown.
    pub fn publish(&self, snapshot: Vec<u8>) {
        let _ = self.queue.send(snapshot);
    }
}

/// Consumer half: a single task that owns the queue's receiving end.
pub struct StatePublisher {
    topic: String,
    transport: Arc<dyn Transport>,
    queue: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Create a connected handle/publisher pair for `topic`.
pub fn state_channel(transport: Arc<dyn Transport>, topic: &str) -> (StateHandle, StatePublisher) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        StateHandle { queue: tx },
        StatePublisher {
            topic: topic.to_owned(),
            transport,
            queue: rx,
        },
    )
}

impl StatePublisher {
    /// Drain the queue forever, publishing each snapshot retained, in order.
    /// Started once at setup; lives as long as the run loop.
    pub async fn run(mut self) {
        while let Some(snapshot) = self.queue.recv().await {
            loop {
                match self
                    .transport
                    .publish(&self.topic, snapshot.clone(), true)
                {
                    Ok(()) => break,
                    Err(e) => {
                        log::warn!(
                            target: "busbridge::state",
                            "state publish on {} failed: {e}; retrying",
                            self.topic
                        );
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        log::debug!(target: "busbridge::state", "state queue closed; publisher exiting");
    }
}
