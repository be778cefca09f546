//! Typed data reported by or sent to the cooker.

pub mod status;
pub mod units;

pub use status::{DeviceState, DeviceStatus, TimerReading};
pub use units::{celsius_to_fahrenheit, fahrenheit_to_celsius, TemperatureUnit};
