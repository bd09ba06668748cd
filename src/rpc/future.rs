//! One-shot reply slot bridging the transport's I/O thread to the waiting
//! task.
//!
//! The slot side may be completed from any thread; the future side resumes
//! on its own scheduler through the oneshot channel's wakeup. An empty
//! completion (`None`) is a partial or keep-alive frame and never completes
//! the future — a later real value still succeeds. Exactly one completion
//! ever takes effect; everything after is a no-op.

use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{RpcError, RpcResult};

type Completion = RpcResult<Value>;

/// Producer half. Cheap to store in the pending-call map; completion methods
/// take `&self` so the slot can be fulfilled through a shared reference.
pub struct ReplySlot {
    sender: Mutex<Option<oneshot::Sender<Completion>>>,
}

/// Consumer half, awaited by the caller with a timeout.
pub struct ReplyFuture {
    receiver: oneshot::Receiver<Completion>,
}

/// Create a connected slot/future pair.
pub fn reply_channel() -> (ReplySlot, ReplyFuture) {
    let (sender, receiver) = oneshot::channel();
    (
        ReplySlot {
            sender: Mutex::new(Some(sender)),
        },
        ReplyFuture { receiver },
    )
}

impl ReplySlot {
    /// Complete with a result. `None` is ignored without consuming the slot.
    /// Returns whether the slot was consumed by this call.
    pub fn fulfill(&self, result: Option<Value>) -> bool {
        let Some(result) = result else {
            return false;
        };
        self.complete(Ok(result))
    }

    /// Complete with an error.
    pub fn fail(&self, error: RpcError) -> bool {
        self.complete(Err(error))
    }

    fn complete(&self, completion: Completion) -> bool {
        let sender = self.sender.lock().ok().and_then(|mut slot| slot.take());
        match sender {
            // The receiver may already be gone (caller timed out); that just
            // means the completion is dropped.
            Some(sender) => {
                let _ = sender.send(completion);
                true
            }
            None => false,
        }
    }
}

impl ReplyFuture {
    /// Wait for the completion, failing with `RpcError::Timeout` once
    /// `timeout` elapses. A dropped slot surfaces as a connection error.
    pub async fn wait(self, timeout: Duration) -> RpcResult<Value> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(_)) => Err(RpcError::connection("reply slot dropped before completion")),
            Err(_) => Err(RpcError::Timeout { timeout }),
        }
    }
}
