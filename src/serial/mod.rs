//! Serial-line access tunneled through the RPC bridge.
//!
//! The gateway process owns the physical ports; we reach them by calling its
//! `port/Load` method with a hex-encoded request and the line parameters,
//! and hex-decoding the reply. On top of that sit the Modbus-RTU framing
//! helpers, plain register reads, and the extended bus scanner.

pub mod frame;
pub mod instrument;
pub mod modbus;
pub mod port;
pub mod scanner;

pub use instrument::SerialRpcPort;
pub use modbus::ModbusDevice;
pub use port::{Parity, PortSettings};
pub use scanner::{BusScanner, DeviceSeen};
