//! Pub/sub transport abstraction.
//!
//! The bridge talks to the broker through the [`Transport`] trait so that the
//! RPC core can be exercised against an in-memory double. The real backend is
//! MQTT via rumqttc; its inbound messages are delivered on a dedicated I/O
//! thread, and handlers must never block there.

pub mod memory;
pub mod mqtt;
pub mod registry;

use std::sync::Arc;

use crate::error::RpcResult;

pub use memory::MemoryTransport;
pub use mqtt::MqttTransport;

/// One message delivered by the transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Callback invoked for every inbound message, on the transport's I/O thread.
pub type MessageHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// A live pub/sub connection.
///
/// `publish` and `subscribe` enqueue work for the I/O thread and return
/// quickly; they are safe to call from any thread, including async tasks.
pub trait Transport: Send + Sync {
    /// Publish a payload, optionally retained.
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> RpcResult<()>;

    /// Subscribe to a topic pattern (`+`/`#` wildcards allowed).
    fn subscribe(&self, pattern: &str) -> RpcResult<()>;

    /// Install the inbound message handler, replacing any previous one.
    fn set_message_handler(&self, handler: MessageHandler);

    /// Stop the I/O thread and disconnect. Idempotent.
    fn close(&self);
}
