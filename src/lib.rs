pub mod config;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod rpc;
pub mod serial;
pub mod topics;
pub mod transport;

pub use error::{RpcError, RpcResult};
pub use rpc::client::RpcClient;
pub use rpc::dispatcher::Dispatcher;
pub use rpc::methods::MethodTable;
pub use rpc::state::{StateHandle, StatePublisher, state_channel};
pub use transport::registry::ConnectionRegistry;
pub use transport::{InboundMessage, Transport};
