// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # anova-rust-ble
//!
//! A cross-platform Rust library for controlling Anova Precision Cooker
//! sous-vide appliances via Bluetooth Low Energy.
//!
//! The cooker speaks a line-oriented ASCII protocol over a single GATT
//! characteristic. Responses carry no request identifiers and arrive as an
//! unframed notification byte stream, so this crate is built around three
//! guarantees:
//!
//! - **Framing**: notification bytes are reassembled into carriage-return
//!   delimited lines regardless of how the transport chunks them
//! - **Correlation**: at most one command is in flight per session, so every
//!   response line belongs to the most recently sent command
//! - **Scoped resources**: radio scans and connections are owned objects,
//!   released on every exit path
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use anova_rust_ble::{AnovaDevice, Result};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let device = AnovaDevice::new();
//!
//!     // Find a cooker, or fall back to a configured address.
//!     let Some(address) = device.discover(Duration::from_secs(5)).await? else {
//!         eprintln!("no cooker found");
//!         return Ok(());
//!     };
//!
//!     device.connect(&address).await?;
//!
//!     let status = device.get_status().await?;
//!     println!(
//!         "water {:.1}{} (target {:.1}{})",
//!         status.current_temperature, status.unit, status.target_temperature, status.unit
//!     );
//!
//!     device.set_temperature(62.0).await?;
//!     device.start_cooking().await?;
//!     device.set_timer(90, true).await?;
//!
//!     device.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod correlator;
pub mod data;
pub mod device;
pub mod error;
pub mod policy;
pub mod protocol;

// Re-exports for convenience
pub use device::{AnovaDevice, TEMPERATURE_RANGE, TIMER_RANGE};
pub use error::{Error, Result};
pub use policy::RetryPolicy;

// Re-export commonly used types from submodules
pub use ble::connection::ConnectionState;
pub use ble::scanner::DeviceAddress;
pub use data::{
    celsius_to_fahrenheit, fahrenheit_to_celsius, DeviceState, DeviceStatus, TemperatureUnit,
    TimerReading,
};
pub use protocol::{Command, Response};
