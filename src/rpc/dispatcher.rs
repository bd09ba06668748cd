//! Inbound message dispatch with admission control.
//!
//! The dispatcher owns the transport's message handler. Every inbound
//! message is classified on the I/O thread: replies to our own outbound
//! calls go straight to the [`RpcClient`]'s pending map; requests pass the
//! admission gate (duplicate guard, then capacity bound) and are spawned
//! onto the scheduler. Rejections are ordinary reply payloads, never faults,
//! and nothing here ever blocks the I/O thread.

use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Handle;

use crate::error::RpcError;
use crate::protocol::RpcResponse;
use crate::rpc::client::RpcClient;
use crate::rpc::in_flight::{Admission, InFlightKey, InFlightSet};
use crate::rpc::methods::MethodTable;
use crate::topics;
use crate::transport::{InboundMessage, Transport};

/// Default bound on concurrently-handled requests.
pub const DEFAULT_MAX_TASKS: usize = 10;

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    client: Arc<RpcClient>,
    methods: Arc<MethodTable>,
    in_flight: InFlightSet,
    /// Name segment of this process's own request tree (`/rpc/v1/<app>`).
    app: String,
    /// Scheduler the request-handling tasks run on. Injected, not discovered.
    runtime: Handle,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        client: Arc<RpcClient>,
        methods: Arc<MethodTable>,
        app: &str,
        max_tasks: usize,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            client,
            methods,
            in_flight: InFlightSet::new(max_tasks),
            app: app.to_owned(),
            runtime,
        })
    }

    /// Advertise every (service, method) pair with a retained sentinel,
    /// subscribe to its per-caller wildcard, and install the message
    /// handler.
    pub fn setup(self: &Arc<Self>) -> Result<(), RpcError> {
        for (service, method) in self.methods.keys() {
            let base = topics::service_base(&self.app, service, method);
            self.transport.publish(&base, b"1".to_vec(), true)?;
            let subscription = topics::service_subscription(&self.app, service, method);
            self.transport.subscribe(&subscription)?;
            log::debug!(target: "busbridge::dispatcher", "subscribed: {subscription}");
        }

        let dispatcher = self.clone();
        self.transport
            .set_message_handler(Arc::new(move |message| dispatcher.on_message(message)));
        Ok(())
    }

    /// Classify one inbound message. Runs on the transport I/O thread.
    fn on_message(self: &Arc<Self>, message: InboundMessage) {
        if topics::topic_matches(self.client.reply_pattern(), &message.topic) {
            self.client.handle_reply(&message);
            return;
        }

        let key = InFlightKey::new(&message.topic, &message.payload);
        match self.in_flight.try_admit(&key) {
            Admission::Admitted => {
                let dispatcher = self.clone();
                self.runtime.spawn(async move {
                    dispatcher.run_request(message, key).await;
                });
            }
            Admission::Duplicate => {
                log::warn!(
                    target: "busbridge::dispatcher",
                    "'{}' is already processing",
                    message.topic
                );
                self.reply(&message.topic, &RpcResponse::from_error(None, &RpcError::AlreadyProcessing));
            }
            Admission::Saturated => {
                log::warn!(
                    target: "busbridge::dispatcher",
                    "max number of tasks ({}) running already; doing nothing for '{}'",
                    self.in_flight.len(),
                    message.topic
                );
                self.reply(&message.topic, &RpcResponse::from_error(None, &RpcError::MaxTasks));
            }
        }
    }

    /// Handle one admitted request on the scheduler. The in-flight key is
    /// released on every path out of this function.
    async fn run_request(&self, message: InboundMessage, key: InFlightKey) {
        let started = Instant::now();
        match topics::parse_request(&self.app, &message.topic) {
            Some(route) => {
                let response = self
                    .methods
                    .handle(&message.payload, &route.service, &route.method)
                    .await;
                log::info!(
                    target: "busbridge::dispatcher",
                    "processing '{}' took {:.2?}",
                    message.topic,
                    started.elapsed()
                );
                self.reply(&message.topic, &response);
            }
            None => {
                log::warn!(
                    target: "busbridge::dispatcher",
                    "unroutable request topic '{}'",
                    message.topic
                );
                self.reply(
                    &message.topic,
                    &RpcResponse::from_error(
                        None,
                        &RpcError::invalid_request("unroutable request topic"),
                    ),
                );
            }
        }
        self.in_flight.finish(&key);
    }

    /// Publish a response on `<topic>/reply`, not retained. Both rejections
    /// and normal replies go through here.
    fn reply(&self, topic: &str, response: &RpcResponse) {
        let reply_topic = topics::reply_topic(topic);
        if let Err(e) = self.transport.publish(&reply_topic, response.to_json(), false) {
            log::warn!(
                target: "busbridge::dispatcher",
                "failed to publish reply on {reply_topic}: {e}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RpcRequest, codes};
    use crate::rpc::methods::boxed;
    use crate::transport::MemoryTransport;
    use serde_json::{Value, json};
    use std::time::Duration;

    fn request_bytes(id: i64) -> Vec<u8> {
        serde_json::to_vec(&RpcRequest::new(id, json!({}))).unwrap()
    }

    /// A dispatcher whose "block" method parks until released, so tests can
    /// hold requests in flight deterministically.
    fn blocking_dispatcher(
        transport: Arc<MemoryTransport>,
        max_tasks: usize,
    ) -> (Arc<Dispatcher>, tokio::sync::mpsc::UnboundedSender<()>) {
        let (release_tx, release_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let release_rx = Arc::new(tokio::sync::Mutex::new(release_rx));

        let mut methods = MethodTable::new();
        methods.register("bus_scan", "scan", move |_params| {
            let release_rx = release_rx.clone();
            boxed(async move {
                release_rx.lock().await.recv().await;
                Ok(json!(true))
            })
        });
        methods.register("bus_scan", "test", |_params| {
            boxed(async { Ok(json!("Result of short-running task")) })
        });

        let client = RpcClient::new(transport.clone()).unwrap();
        let dispatcher = Dispatcher::new(
            transport,
            client,
            Arc::new(methods),
            "busbridge",
            max_tasks,
            Handle::current(),
        );
        dispatcher.setup().unwrap();
        (dispatcher, release_tx)
    }

    fn error_code(payload: &[u8]) -> Option<i32> {
        let value: Value = serde_json::from_slice(payload).ok()?;
        value["error"]["code"].as_i64().map(|code| code as i32)
    }

    async fn wait_for_reply(
        transport: &MemoryTransport,
        pattern: &str,
        minimum: usize,
    ) -> Vec<crate::transport::memory::PublishedMessage> {
        for _ in 0..200 {
            let replies = transport.published_on(pattern);
            if replies.len() >= minimum {
                return replies;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        transport.published_on(pattern)
    }

    #[tokio::test]
    async fn setup_advertises_retained_sentinels_and_subscribes() {
        let transport = MemoryTransport::new();
        let (_dispatcher, _release) = blocking_dispatcher(transport.clone(), 10);

        let sentinels = transport.published_on("/rpc/v1/busbridge/bus_scan/+");
        assert_eq!(sentinels.len(), 2);
        for sentinel in sentinels {
            assert!(sentinel.retain);
            assert_eq!(sentinel.payload, b"1");
        }
        let subs = transport.subscriptions();
        assert!(subs.contains(&"/rpc/v1/busbridge/bus_scan/scan/+".to_owned()));
        assert!(subs.contains(&"/rpc/v1/busbridge/bus_scan/test/+".to_owned()));
    }

    #[tokio::test]
    async fn handles_a_request_and_replies_on_the_reply_topic() {
        let transport = MemoryTransport::new();
        let (_dispatcher, _release) = blocking_dispatcher(transport.clone(), 10);

        transport.inject("/rpc/v1/busbridge/bus_scan/test/42", &request_bytes(1));

        let replies =
            wait_for_reply(&transport, "/rpc/v1/busbridge/bus_scan/test/42/reply", 1).await;
        assert_eq!(replies.len(), 1);
        assert!(!replies[0].retain);
        let value: Value = serde_json::from_slice(&replies[0].payload).unwrap();
        assert_eq!(value["result"], json!("Result of short-running task"));
        assert_eq!(value["id"], json!(1));
    }

    #[tokio::test]
    async fn duplicate_request_is_rejected_with_already_processing() {
        let transport = MemoryTransport::new();
        let (dispatcher, release) = blocking_dispatcher(transport.clone(), 10);

        let topic = "/rpc/v1/busbridge/bus_scan/scan/42";
        let payload = request_bytes(1);
        transport.inject(topic, &payload);
        // Same (topic, payload) again while the first is still parked.
        transport.inject(topic, &payload);

        let replies = wait_for_reply(&transport, "/rpc/v1/busbridge/bus_scan/scan/42/reply", 1)
            .await;
        assert_eq!(replies.len(), 1);
        assert_eq!(error_code(&replies[0].payload), Some(codes::ALREADY_PROCESSING));
        // The rejection did not grow the in-flight set.
        assert_eq!(dispatcher.in_flight.len(), 1);

        release.send(()).unwrap();
        let replies = wait_for_reply(&transport, "/rpc/v1/busbridge/bus_scan/scan/42/reply", 2)
            .await;
        assert_eq!(replies.len(), 2);
        // After completion the key is released and the request is accepted.
        // The key release follows the reply, so poll for it.
        for _ in 0..200 {
            if dispatcher.in_flight.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(dispatcher.in_flight.is_empty());
        transport.inject(topic, &payload);
        release.send(()).unwrap();
        let replies = wait_for_reply(&transport, "/rpc/v1/busbridge/bus_scan/scan/42/reply", 3)
            .await;
        assert_eq!(replies.len(), 3);
    }

    #[tokio::test]
    async fn capacity_overflow_is_rejected_with_max_tasks() {
        let transport = MemoryTransport::new();
        let (dispatcher, release) = blocking_dispatcher(transport.clone(), 3);

        for n in 0..3 {
            transport.inject(
                &format!("/rpc/v1/busbridge/bus_scan/scan/{n}"),
                &request_bytes(1),
            );
        }
        assert_eq!(dispatcher.in_flight.len(), 3);

        transport.inject("/rpc/v1/busbridge/bus_scan/scan/overflow", &request_bytes(1));
        let replies = wait_for_reply(
            &transport,
            "/rpc/v1/busbridge/bus_scan/scan/overflow/reply",
            1,
        )
        .await;
        assert_eq!(error_code(&replies[0].payload), Some(codes::MAX_TASKS));
        assert_eq!(dispatcher.in_flight.len(), 3);

        for _ in 0..3 {
            release.send(()).unwrap();
        }
    }

    #[tokio::test]
    async fn replies_to_own_calls_bypass_admission_control() {
        let transport = MemoryTransport::new();
        let (dispatcher, _release) = blocking_dispatcher(transport.clone(), 10);

        // Issue an outbound call through the dispatcher's client, then feed
        // the reply through the transport handler as the broker would.
        let client = dispatcher.client.clone();
        let call = tokio::spawn({
            let client = client.clone();
            async move {
                client
                    .call("gw", "port", "Load", json!({}), Duration::from_secs(2))
                    .await
            }
        });

        let requests = wait_for_reply(&transport, "/rpc/v1/gw/port/Load/+", 1).await;
        assert_eq!(requests.len(), 1);

        let reply_topic = topics::reply_topic(&requests[0].topic);
        transport.inject(
            &reply_topic,
            &serde_json::to_vec(&json!({"jsonrpc": "2.0", "id": 1, "result": 7})).unwrap(),
        );

        assert_eq!(call.await.unwrap().unwrap(), json!(7));
        // The reply never entered the in-flight set.
        assert!(dispatcher.in_flight.is_empty());
    }
}
