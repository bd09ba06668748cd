//! Outbound RPC calls over the pub/sub transport.
//!
//! Each call registers a one-shot reply slot keyed by correlation id, then
//! publishes the request envelope on the target's topic. Replies arrive on
//! the transport I/O thread (routed here by the dispatcher) and complete the
//! slot; the calling task resumes on its own scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::{RpcError, RpcResult};
use crate::protocol::{RpcRequest, RpcResponse};
use crate::rpc::future::{ReplySlot, reply_channel};
use crate::topics;
use crate::transport::{InboundMessage, Transport};

/// Default time a caller waits for a reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RpcClient {
    transport: Arc<dyn Transport>,
    client_id: String,
    reply_pattern: String,
    next_id: AtomicI64,
    pending: DashMap<i64, ReplySlot>,
}

impl RpcClient {
    /// Create a client and subscribe to its reply pattern. The `client_id`
    /// is embedded in every request topic so the peer knows where to reply.
    pub fn new(transport: Arc<dyn Transport>) -> RpcResult<Arc<Self>> {
        let client_id = ulid::Ulid::new().to_string().to_lowercase();
        let reply_pattern = topics::client_reply_pattern(&client_id);
        transport.subscribe(&reply_pattern)?;
        Ok(Arc::new(Self {
            transport,
            client_id,
            reply_pattern,
            next_id: AtomicI64::new(1),
            pending: DashMap::new(),
        }))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Pattern matching every reply addressed to this client.
    pub fn reply_pattern(&self) -> &str {
        &self.reply_pattern
    }

    /// Issue one call and await its reply.
    ///
    /// On timeout only the local waiter is discarded: no cancellation is
    /// sent to the peer, and a reply arriving later is dropped for want of a
    /// matching pending entry.
    pub async fn call(
        &self,
        driver: &str,
        service: &str,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> RpcResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (slot, future) = reply_channel();

        // Register before publishing so the reply cannot race the waiter.
        self.pending.insert(id, slot);

        let topic = topics::request_topic(driver, service, method, &self.client_id);
        let payload = serde_json::to_vec(&RpcRequest::new(id, params))?;
        log::debug!(
            target: "busbridge::rpc::client",
            "-> {topic} id={id} (timeout: {timeout:?})"
        );
        if let Err(e) = self.transport.publish(&topic, payload, false) {
            self.pending.remove(&id);
            return Err(e);
        }

        let outcome = future.wait(timeout).await;
        if matches!(outcome, Err(RpcError::Timeout { .. })) {
            // The outbound request stays un-cancelled; only the waiter goes.
            self.pending.remove(&id);
            log::warn!(target: "busbridge::rpc::client", "call id={id} timed out");
        } else {
            log::debug!(target: "busbridge::rpc::client", "<- id={id}");
        }
        outcome
    }

    /// Route one inbound reply to its pending call. Invoked on the transport
    /// I/O thread; never blocks.
    pub fn handle_reply(&self, message: &InboundMessage) {
        let response: RpcResponse = match serde_json::from_slice(&message.payload) {
            Ok(response) => response,
            Err(e) => {
                log::warn!(
                    target: "busbridge::rpc::client",
                    "undecodable reply on {}: {e}",
                    message.topic
                );
                return;
            }
        };
        let Some(id) = response.id else {
            log::warn!(
                target: "busbridge::rpc::client",
                "reply without id on {}",
                message.topic
            );
            return;
        };

        // Keep-alive frames must not consume the pending slot, so the entry
        // is only removed once the slot actually completes.
        let completed = match self.pending.get(&id) {
            Some(slot) => match response.error {
                Some(error) => slot.fail(RpcError::remote(error.code, error.message)),
                None => slot.fulfill(response.result),
            },
            None => {
                log::debug!(
                    target: "busbridge::rpc::client",
                    "no pending call for reply id={id}; dropping"
                );
                return;
            }
        };
        if completed {
            self.pending.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codes;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn reply_message(topic: &str, body: Value) -> InboundMessage {
        InboundMessage {
            topic: topic.to_owned(),
            payload: serde_json::to_vec(&body).unwrap(),
        }
    }

    /// Block until the client has published its request, so a responder
    /// thread cannot reply before the pending slot is registered.
    fn wait_for_request(transport: &MemoryTransport) {
        while transport.published().is_empty() {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[tokio::test]
    async fn call_resolves_when_the_reply_arrives_from_another_thread() {
        let transport = MemoryTransport::new();
        let client = RpcClient::new(transport.clone()).unwrap();

        let call = client.call(
            "gw",
            "port",
            "Load",
            json!({"msg": "0102"}),
            Duration::from_secs(1),
        );
        let responder = {
            let client = client.clone();
            let transport = transport.clone();
            std::thread::spawn(move || {
                wait_for_request(&transport);
                // The request carries id=1; answer it as the peer would.
                let topic = topics::reply_topic(&topics::request_topic(
                    "gw",
                    "port",
                    "Load",
                    client.client_id(),
                ));
                client.handle_reply(&reply_message(
                    &topic,
                    json!({"jsonrpc": "2.0", "id": 1, "result": {"response": "0102"}}),
                ));
            })
        };

        let result = call.await.unwrap();
        assert_eq!(result["response"], json!("0102"));
        responder.join().unwrap();

        // The request went out, un-retained, on the right topic.
        let sent = transport.published();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].topic.starts_with("/rpc/v1/gw/port/Load/"));
        assert!(!sent[0].retain);
    }

    #[tokio::test]
    async fn call_times_out_against_a_silent_peer() {
        let transport = MemoryTransport::new();
        let client = RpcClient::new(transport).unwrap();

        let err = client
            .call("gw", "port", "Load", json!({}), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Timeout { .. }));

        // The waiter is gone: a late reply is dropped, not delivered.
        client.handle_reply(&reply_message(
            "/rpc/v1/gw/port/Load/x/reply",
            json!({"jsonrpc": "2.0", "id": 1, "result": {}}),
        ));
    }

    #[tokio::test]
    async fn remote_error_objects_surface_as_remote_faults() {
        let transport = MemoryTransport::new();
        let client = RpcClient::new(transport.clone()).unwrap();

        let call = client.call("gw", "port", "Load", json!({}), Duration::from_secs(1));
        let client_for_reply = client.clone();
        let transport_for_reply = transport.clone();
        let responder = std::thread::spawn(move || {
            wait_for_request(&transport_for_reply);
            client_for_reply.handle_reply(&reply_message(
                "/rpc/v1/gw/port/Load/x/reply",
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": {"code": codes::REQUEST_HANDLING, "message": "no answer"}
                }),
            ));
        });

        let err = call.await.unwrap_err();
        assert!(matches!(err, RpcError::Remote { code, .. } if code == codes::REQUEST_HANDLING));
        responder.join().unwrap();
    }

    #[tokio::test]
    async fn keep_alive_reply_leaves_the_call_pending() {
        let transport = MemoryTransport::new();
        let client = RpcClient::new(transport.clone()).unwrap();

        let call = client.call("gw", "port", "Load", json!({}), Duration::from_secs(1));
        let client_for_reply = client.clone();
        let transport_for_reply = transport.clone();
        let responder = std::thread::spawn(move || {
            wait_for_request(&transport_for_reply);
            // A frame with neither result nor error, then the real reply.
            client_for_reply
                .handle_reply(&reply_message("t", json!({"jsonrpc": "2.0", "id": 1})));
            client_for_reply.handle_reply(&reply_message(
                "t",
                json!({"jsonrpc": "2.0", "id": 1, "result": 42}),
            ));
        });

        assert_eq!(call.await.unwrap(), json!(42));
        responder.join().unwrap();
    }

    #[tokio::test]
    async fn client_subscribes_to_its_reply_pattern() {
        let transport = MemoryTransport::new();
        let client = RpcClient::new(transport.clone()).unwrap();
        let subs = transport.subscriptions();
        assert_eq!(subs, vec![client.reply_pattern().to_owned()]);
        assert!(client.reply_pattern().starts_with("/rpc/v1/+/+/+/"));
        assert!(client.reply_pattern().ends_with("/reply"));
    }
}
