//! Error types for the anova-rust-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The cooker with the given address could not be located.
    #[error("Device not found: {address}")]
    DeviceNotFound {
        /// The address that was searched for.
        address: String,
    },

    /// Operation requires a connection but the cooker is not connected.
    #[error("Not connected to device")]
    NotConnected,

    /// Failed to establish a connection to the cooker.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// The connection to the cooker was lost mid-operation.
    #[error("Connection lost")]
    ConnectionLost,

    /// A connect or disconnect is already in progress on this session.
    #[error("Connection operation already in progress")]
    AlreadyInProgress,

    /// A command is already in flight; the wire protocol allows only one at a time.
    #[error("Another command is in flight")]
    Busy,

    /// No response arrived within the configured attempt budget.
    #[error("Timed out waiting for response to `{command}`")]
    Timeout {
        /// The command verb that went unanswered.
        command: String,
    },

    /// The response line did not match the shape expected for the command.
    #[error("Malformed response to `{command}`: {line:?}")]
    MalformedResponse {
        /// The command verb the line was matched against.
        command: String,
        /// The raw response line as received.
        line: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
