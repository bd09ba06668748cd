//! Error handling types for the RPC bridge.
//!
//! One error enum covers the whole crate: transport failures, call timeouts,
//! remote faults reported by a peer, and the admission-control rejections the
//! dispatcher turns into reply payloads.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::codes;

/// Comprehensive error type for RPC bridge operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The call's reply did not arrive within the timeout.
    #[error("RPC call timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The peer answered with an explicit error object.
    #[error("remote error {code}: {message}")]
    Remote { code: i32, message: String },

    /// A request with the same (topic, payload) is already being handled.
    #[error("Task is already executing.")]
    AlreadyProcessing,

    /// The concurrency capacity is exhausted.
    #[error("Max number of tasks are processing! Try again later.")]
    MaxTasks,

    /// The serial device behind the gateway did not answer.
    #[error("no response from device")]
    NoResponse,

    /// Transport-level failure (connect, publish, subscribe).
    #[error("connection error: {message}")]
    Connection { message: String },

    /// The caller handed us something unusable.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// A device answered with a frame that does not parse.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result type for RPC bridge operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Helper functions for common error patterns.
impl RpcError {
    /// Create a remote fault error from a peer-reported error object.
    pub fn remote(code: i32, message: impl Into<String>) -> Self {
        RpcError::Remote {
            code,
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        RpcError::Connection {
            message: message.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        RpcError::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        RpcError::InvalidResponse {
            message: message.into(),
        }
    }

    /// The JSON-RPC error code this error is reported with on the wire.
    pub fn protocol_code(&self) -> i32 {
        match self {
            RpcError::Remote { code, .. } => *code,
            RpcError::AlreadyProcessing => codes::ALREADY_PROCESSING,
            RpcError::MaxTasks => codes::MAX_TASKS,
            RpcError::InvalidRequest { .. } => codes::INVALID_REQUEST,
            _ => codes::SERVER_ERROR,
        }
    }
}

/// Classification of a remote fault code, used by the serial adapter to
/// decide whether a gateway error means "device silent" or something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFaultKind {
    /// The gateway accepted the call but failed to get an answer on the line.
    RequestHandling,
    /// Any other peer-reported fault; propagated unchanged.
    Other,
}

impl RemoteFaultKind {
    /// Pure mapping from a remote fault code to a local error kind.
    pub fn classify(code: i32) -> Self {
        if code == codes::REQUEST_HANDLING {
            RemoteFaultKind::RequestHandling
        } else {
            RemoteFaultKind::Other
        }
    }
}
