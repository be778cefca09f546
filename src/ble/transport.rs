//! Byte-level write seam over the command characteristic.

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

use crate::ble::connection::ConnectionState;
use crate::error::{Error, Result};

/// Write side of the transport session.
///
/// The correlator talks to this trait rather than to btleplug directly so the
/// protocol engine can be exercised against a mock transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Write one encoded command line to the device.
    async fn write_line(&self, data: &[u8]) -> Result<()>;
}

/// Transport over the cooker's writable GATT characteristic.
///
/// Only valid while the owning session is Connected; writes outside that
/// state fail with [`Error::NotConnected`].
pub struct GattTransport {
    peripheral: Peripheral,
    command: Characteristic,
    state: Arc<RwLock<ConnectionState>>,
}

impl GattTransport {
    pub(crate) fn new(
        peripheral: Peripheral,
        command: Characteristic,
        state: Arc<RwLock<ConnectionState>>,
    ) -> Self {
        Self {
            peripheral,
            command,
            state,
        }
    }
}

#[async_trait]
impl CommandTransport for GattTransport {
    async fn write_line(&self, data: &[u8]) -> Result<()> {
        if !self.state.read().is_connected() {
            return Err(Error::NotConnected);
        }

        self.peripheral
            .write(&self.command, data, WriteType::WithoutResponse)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Wrote {} bytes to command characteristic", data.len());

        Ok(())
    }
}
