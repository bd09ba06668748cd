//! MQTT transport backed by rumqttc.
//!
//! Each connection owns one background I/O thread driving the rumqttc event
//! loop. Inbound `Publish` packets are handed to the installed message
//! handler synchronously on that thread, so the handler must only classify
//! and schedule, never block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};

use crate::error::{RpcError, RpcResult};
use crate::transport::{InboundMessage, MessageHandler, Transport};

/// Delay before re-polling the event loop after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Capacity of the rumqttc request channel. Sized well above the admission
/// capacity plus any plausible state-queue burst, since a full channel fails
/// publishes instead of blocking.
const REQUEST_CHANNEL_CAPACITY: usize = 1024;

pub struct MqttTransport {
    client: Client,
    handler: Arc<Mutex<Option<MessageHandler>>>,
    io_thread: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl MqttTransport {
    /// Connect to the broker and start the I/O thread.
    pub fn connect(client_id: &str, host: &str, port: u16) -> RpcResult<Arc<Self>> {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, connection) = Client::new(options, REQUEST_CHANNEL_CAPACITY);
        let handler: Arc<Mutex<Option<MessageHandler>>> = Arc::new(Mutex::new(None));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handler_for_thread = handler.clone();
        let shutdown_for_thread = shutdown.clone();
        let io_thread = std::thread::Builder::new()
            .name(format!("mqtt-io-{host}:{port}"))
            .spawn(move || {
                Self::io_loop(connection, handler_for_thread, shutdown_for_thread);
            })
            .map_err(|e| RpcError::connection(format!("failed to spawn I/O thread: {e}")))?;

        log::info!(
            target: "busbridge::transport",
            "new mqtt connection; host: {host}; port: {port}"
        );

        Ok(Arc::new(Self {
            client,
            handler,
            io_thread: Mutex::new(Some(io_thread)),
            shutdown,
        }))
    }

    fn io_loop(
        mut connection: Connection,
        handler: Arc<Mutex<Option<MessageHandler>>>,
        shutdown: Arc<AtomicBool>,
    ) {
        for event in connection.iter() {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let current = handler.lock().map(|h| h.clone()).unwrap_or_default();
                    if let Some(current) = current {
                        current(InboundMessage {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                        });
                    } else {
                        log::debug!(
                            target: "busbridge::transport",
                            "dropping message on {}: no handler installed",
                            publish.topic
                        );
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    log::warn!(target: "busbridge::transport", "mqtt event loop error: {e}");
                    std::thread::sleep(RECONNECT_DELAY);
                }
            }
        }
        log::debug!(target: "busbridge::transport", "mqtt I/O thread exiting");
    }
}

impl Transport for MqttTransport {
    /// The message handler runs on the I/O thread, and the I/O thread is the
    /// only consumer of the request channel, so a publish must never wait for
    /// channel space. A full channel is an error the caller handles (the
    /// state publisher retries, the dispatcher logs the dropped reply).
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> RpcResult<()> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, retain, payload)
            .map_err(|e| RpcError::connection(format!("publish to {topic} failed: {e}")))
    }

    fn subscribe(&self, pattern: &str) -> RpcResult<()> {
        self.client
            .try_subscribe(pattern, QoS::AtMostOnce)
            .map_err(|e| RpcError::connection(format!("subscribe to {pattern} failed: {e}")))
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        if let Ok(mut slot) = self.handler.lock() {
            *slot = Some(handler);
        }
    }

    fn close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.client.disconnect();
        if let Ok(mut slot) = self.io_thread.lock()
            && let Some(thread) = slot.take()
        {
            let _ = thread.join();
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.close();
    }
}
