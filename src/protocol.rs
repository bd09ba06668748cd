//! JSON-RPC style request/response envelopes carried over the pub/sub
//! transport.
//!
//! The routing identifiers (driver, service, method, caller) live in the
//! topic, not the payload; the payload carries the correlation id, the
//! params, and on the way back either a result or an error object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

/// Wire-level error codes.
pub mod codes {
    /// Standard JSON-RPC: malformed payload.
    pub const PARSE_ERROR: i32 = -32700;
    /// Standard JSON-RPC: envelope is not a valid request.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Standard JSON-RPC: no such (service, method) pair.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Standard JSON-RPC: handler fault without a more specific code.
    pub const SERVER_ERROR: i32 = -32000;
    /// A request with the same (topic, payload) is already in flight.
    pub const ALREADY_PROCESSING: i32 = -33100;
    /// The admission-control capacity is exhausted.
    pub const MAX_TASKS: i32 = -33200;
    /// The serial gateway failed to handle a line request (device silent).
    pub const REQUEST_HANDLING: i32 = -33300;
}

/// An outbound RPC request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: i64,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: i64, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            id,
            params,
        }
    }
}

/// A peer-reported error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An RPC response envelope: result xor error.
///
/// A decoded response carrying *neither* is a keep-alive frame and must not
/// complete any pending call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn result(id: i64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// An error response. Admission rejections happen before the payload is
    /// decoded, so `id` may be absent.
    pub fn error(id: Option<i64>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            id,
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Build an error response straight from an `RpcError`.
    pub fn from_error(id: Option<i64>, err: &RpcError) -> Self {
        Self::error(id, err.protocol_code(), err.to_string())
    }

    /// Neither result nor error: a partial or keep-alive frame.
    pub fn is_keep_alive(&self) -> bool {
        self.result.is_none() && self.error.is_none()
    }

    pub fn to_json(&self) -> Vec<u8> {
        // Envelopes are plain data; serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keep_alive_has_neither_result_nor_error() {
        let resp: RpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert!(resp.is_keep_alive());

        let resp: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(!resp.is_keep_alive());
    }

    #[test]
    fn rejection_response_shape() {
        let resp = RpcResponse::error(None, codes::ALREADY_PROCESSING, "Task is already executing.");
        let value: Value = serde_json::from_slice(&resp.to_json()).unwrap();
        assert_eq!(value["error"]["code"], json!(-33100));
        assert_eq!(value["error"]["message"], json!("Task is already executing."));
        assert!(value.get("result").is_none());
    }

    #[test]
    fn request_round_trips_params() {
        let req = RpcRequest::new(7, json!({"path": "/dev/ttyRS485-1"}));
        let decoded: RpcRequest = serde_json::from_slice(&serde_json::to_vec(&req).unwrap()).unwrap();
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.params["path"], json!("/dev/ttyRS485-1"));
    }
}
