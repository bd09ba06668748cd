//! Endpoint-keyed registry of live transport connections.
//!
//! Every component that needs a broker connection goes through the registry
//! so that at most one connection exists per endpoint. The registry owns its
//! connections; callers only borrow `Arc<dyn Transport>` handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::{RpcError, RpcResult};
use crate::transport::Transport;
use crate::transport::mqtt::MqttTransport;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 1883;

/// One broker address, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `"host:port"`, defaulting host and port when absent or empty.
    pub fn parse(hostport: &str) -> RpcResult<Self> {
        let (host, port) = match hostport.split_once(':') {
            Some((host, port)) => (host, port),
            None => (hostport, ""),
        };
        let host = if host.is_empty() { DEFAULT_HOST } else { host };
        let port = if port.is_empty() {
            DEFAULT_PORT
        } else {
            port.parse().map_err(|_| {
                RpcError::invalid_request(format!("bad broker port in {hostport:?}"))
            })?
        };
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Factory opening a new connection for an endpoint. Injected so tests never
/// touch the network.
pub type Connector = Box<dyn Fn(&Endpoint) -> RpcResult<Arc<dyn Transport>> + Send + Sync>;

pub struct ConnectionRegistry {
    connector: Connector,
    connections: Mutex<HashMap<Endpoint, Arc<dyn Transport>>>,
}

impl ConnectionRegistry {
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Registry backed by real MQTT connections identified by `client_name`.
    pub fn with_mqtt(client_name: &str) -> Self {
        let client_name = client_name.to_owned();
        Self::new(Box::new(move |endpoint| {
            let transport: Arc<dyn Transport> =
                MqttTransport::connect(&client_name, &endpoint.host, endpoint.port)?;
            Ok(transport)
        }))
    }

    /// Return the live connection for `hostport`, opening one on first use.
    /// Idempotent: a second lookup for the same endpoint returns the same
    /// connection without connecting again.
    pub fn get_or_create(&self, hostport: &str) -> RpcResult<Arc<dyn Transport>> {
        let endpoint = Endpoint::parse(hostport)?;
        let mut connections = self
            .connections
            .lock()
            .map_err(|_| RpcError::connection("connection registry lock poisoned"))?;
        if let Some(existing) = connections.get(&endpoint) {
            log::debug!(target: "busbridge::registry", "reusing connection for {endpoint}");
            return Ok(existing.clone());
        }
        let transport = (self.connector)(&endpoint)?;
        connections.insert(endpoint, transport.clone());
        Ok(transport)
    }

    /// Close and remove the connection for `hostport`. Closing an unknown
    /// endpoint is a no-op that only logs a warning.
    pub fn close(&self, hostport: &str) {
        let Ok(endpoint) = Endpoint::parse(hostport) else {
            log::warn!(target: "busbridge::registry", "close: unparseable endpoint {hostport:?}");
            return;
        };
        let removed = self
            .connections
            .lock()
            .ok()
            .and_then(|mut connections| connections.remove(&endpoint));
        match removed {
            Some(transport) => {
                transport.close();
                log::info!(target: "busbridge::registry", "closed connection for {endpoint}");
            }
            None => {
                log::warn!(
                    target: "busbridge::registry",
                    "connection {endpoint} not found among active ones"
                );
            }
        }
    }

    /// Close every live connection. Called once at process shutdown.
    pub fn close_all(&self) {
        let drained: Vec<_> = self
            .connections
            .lock()
            .map(|mut connections| connections.drain().collect())
            .unwrap_or_default();
        for (endpoint, transport) in drained {
            transport.close();
            log::info!(target: "busbridge::registry", "closed connection for {endpoint}");
        }
    }
}
