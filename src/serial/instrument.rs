//! Serial transfers tunneled through the RPC gateway.
//!
//! One [`SerialRpcPort`] stands in for a local serial port: a raw request
//! plus an expected reply length go out as an RPC call to the gateway's
//! `port/Load` method, and the hex-encoded answer comes back as bytes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::error::{RemoteFaultKind, RpcError, RpcResult};
use crate::rpc::client::RpcClient;
use crate::serial::port::{DATA_BITS, PortSettings};

/// Route of the serial gateway process.
pub const GATEWAY_DRIVER: &str = "wb-mqtt-serial";
pub const GATEWAY_SERVICE: &str = "port";
pub const GATEWAY_METHOD: &str = "Load";

/// Outer RPC timeout; deliberately longer than any line-level
/// response timeout carried inside the payload.
pub const GATEWAY_CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SerialRpcPort {
    client: Arc<RpcClient>,
    settings: PortSettings,
}

impl SerialRpcPort {
    pub fn new(client: Arc<RpcClient>, settings: PortSettings) -> Self {
        Self { client, settings }
    }

    /// Send `request` on the line and read back up to `response_size` bytes.
    ///
    /// A gateway fault with the request-handling code means the device never
    /// answered and surfaces as [`RpcError::NoResponse`]; any other remote
    /// fault propagates unchanged.
    pub async fn transfer(&self, request: &[u8], response_size: usize) -> RpcResult<Vec<u8>> {
        if request.is_empty() {
            return Err(RpcError::invalid_request("empty serial request"));
        }

        let params = self.load_params(request, response_size)?;
        let result = self
            .client
            .call(
                GATEWAY_DRIVER,
                GATEWAY_SERVICE,
                GATEWAY_METHOD,
                params,
                GATEWAY_CALL_TIMEOUT,
            )
            .await;

        let result = match result {
            Ok(result) => result,
            Err(RpcError::Remote { code, message }) => {
                return Err(match RemoteFaultKind::classify(code) {
                    RemoteFaultKind::RequestHandling => RpcError::NoResponse,
                    RemoteFaultKind::Other => RpcError::Remote { code, message },
                });
            }
            Err(e) => return Err(e),
        };

        let response_hex = result
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default();
        hex::decode(response_hex)
            .map_err(|e| RpcError::invalid_response(format!("bad hex in response: {e}")))
    }

    fn load_params(&self, request: &[u8], response_size: usize) -> RpcResult<Value> {
        let response_timeout_ms =
            u64::try_from(self.settings.response_timeout.as_millis()).unwrap_or(u64::MAX);
        Ok(json!({
            "response_size": response_size,
            "format": "HEX",
            "msg": hex::encode_upper(request),
            "response_timeout": response_timeout_ms,
            "path": self.settings.path,
            "baud_rate": self.settings.baud_rate,
            "parity": self.settings.parity,
            "stop_bits": self.settings.stop_bits,
            "data_bits": DATA_BITS,
        }))
    }
}
