//! Method dispatch for inbound requests.
//!
//! The table maps advertised (service, method) pairs to async handlers.
//! `handle` always produces a response payload: malformed envelopes, unknown
//! methods and handler faults all come back as protocol-level error objects,
//! so the dispatcher never sees a handler error.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::{RpcError, RpcResult};
use crate::protocol::{RpcRequest, RpcResponse, codes};

pub type HandlerFuture = Pin<Box<dyn Future<Output = RpcResult<Value>> + Send>>;
type Handler = Box<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

#[derive(Default)]
pub struct MethodTable {
    handlers: HashMap<(String, String), Handler>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a (service, method) pair.
    pub fn register<F>(&mut self, service: &str, method: &str, handler: F)
    where
        F: Fn(Value) -> HandlerFuture + Send + Sync + 'static,
    {
        self.handlers
            .insert((service.to_owned(), method.to_owned()), Box::new(handler));
    }

    /// Advertised (service, method) pairs.
    pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.handlers
            .keys()
            .map(|(service, method)| (service.as_str(), method.as_str()))
    }

    /// Run the handler for one inbound request and wrap the outcome into a
    /// response payload. Never fails.
    pub async fn handle(&self, payload: &[u8], service: &str, method: &str) -> RpcResponse {
        let request: RpcRequest = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => {
                return RpcResponse::error(None, codes::PARSE_ERROR, format!("parse error: {e}"));
            }
        };
        let Some(handler) = self
            .handlers
            .get(&(service.to_owned(), method.to_owned()))
        else {
            return RpcResponse::error(
                Some(request.id),
                codes::METHOD_NOT_FOUND,
                format!("method not found: {service}/{method}"),
            );
        };
        match handler(request.params).await {
            Ok(result) => RpcResponse::result(request.id, result),
            Err(e) => {
                log::warn!(
                    target: "busbridge::rpc::methods",
                    "{service}/{method} failed: {e}"
                );
                RpcResponse::from_error(Some(request.id), &e)
            }
        }
    }
}

/// Wrap a plain async closure result into the boxed handler future type.
pub fn boxed<F>(future: F) -> HandlerFuture
where
    F: Future<Output = RpcResult<Value>> + Send + 'static,
{
    Box::pin(future)
}
