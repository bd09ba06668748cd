//! In-memory transport double for tests.
//!
//! Records every publish, tracks subscriptions, and lets a test inject
//! inbound messages as if they arrived from the broker's I/O thread.

use std::sync::{Arc, Mutex};

use crate::error::RpcResult;
use crate::topics::topic_matches;
use crate::transport::{InboundMessage, MessageHandler, Transport};

/// One recorded publish.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

#[derive(Default)]
pub struct MemoryTransport {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<String>>,
    handler: Mutex<Option<MessageHandler>>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver a message to the installed handler, as the broker would.
    /// Delivery only happens if some subscription pattern matches the topic.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        let subscribed = self
            .subscriptions
            .lock()
            .map(|subs| subs.iter().any(|pattern| topic_matches(pattern, topic)))
            .unwrap_or(false);
        if !subscribed {
            return;
        }
        let handler = self.handler.lock().map(|h| h.clone()).unwrap_or_default();
        if let Some(handler) = handler {
            handler(InboundMessage {
                topic: topic.to_owned(),
                payload: payload.to_vec(),
            });
        }
    }

    /// Snapshot of everything published so far.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Publishes to topics matching `pattern`.
    pub fn published_on(&self, pattern: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|m| topic_matches(pattern, &m.topic))
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl Transport for MemoryTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> RpcResult<()> {
        if let Ok(mut published) = self.published.lock() {
            published.push(PublishedMessage {
                topic: topic.to_owned(),
                payload,
                retain,
            });
        }
        Ok(())
    }

    fn subscribe(&self, pattern: &str) -> RpcResult<()> {
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.push(pattern.to_owned());
        }
        Ok(())
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        if let Ok(mut slot) = self.handler.lock() {
            *slot = Some(handler);
        }
    }

    fn close(&self) {}
}
