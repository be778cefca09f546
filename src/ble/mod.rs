//! BLE communication module.
//!
//! Low-level Bluetooth Low Energy functionality for discovering and
//! communicating with Anova cookers.

pub mod connection;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use scanner::{DeviceAddress, Scanner};
pub use transport::{CommandTransport, GattTransport};
pub use uuids::*;
