//! The RPC bridge core: outbound calls, inbound dispatch, admission control.

pub mod client;
pub mod dispatcher;
pub mod future;
pub mod in_flight;
pub mod methods;
pub mod state;

pub use client::RpcClient;
pub use dispatcher::Dispatcher;
pub use future::{ReplyFuture, ReplySlot, reply_channel};
pub use in_flight::{Admission, InFlightKey, InFlightSet};
pub use methods::{HandlerFuture, MethodTable};
pub use state::{StateHandle, StatePublisher, state_channel};
