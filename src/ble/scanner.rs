//! BLE advertisement scanning.
//!
//! Provides discovery of Anova cookers and resolution of caller-supplied
//! addresses to peripheral handles. Radio scanning is a scoped resource: it
//! is stopped on every exit path, including early match, timeout, and
//! cancellation.

use btleplug::api::{
    Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, trace};

use crate::ble::uuids::{is_cooker_service, DEVICE_NAME_PREFIX};
use crate::error::{Error, Result};

/// Opaque hardware identifier of a discovered or configured cooker.
///
/// Immutable once created. The string form is the peripheral's BLE address
/// (a 48-bit MAC on most platforms; an OS-assigned identifier on macOS).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Create an address from its string form.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this address identifies the given peripheral.
    fn matches(&self, peripheral: &Peripheral) -> bool {
        self.0.eq_ignore_ascii_case(&peripheral.address().to_string())
            || self.0.eq_ignore_ascii_case(&peripheral.id().to_string())
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// Stops the radio scan when dropped, whatever path exits the scan loop.
struct ScanGuard {
    adapter: Adapter,
}

impl ScanGuard {
    async fn start(adapter: &Adapter, filter: ScanFilter) -> Result<Self> {
        adapter.start_scan(filter).await.map_err(Error::Bluetooth)?;
        Ok(Self {
            adapter: adapter.clone(),
        })
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                debug!("Failed to stop scan: {}", e);
            }
        });
    }
}

/// Scanner for discovering Anova cookers.
pub struct Scanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
}

impl Scanner {
    /// Create a new scanner on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self { adapter })
    }

    /// Create a scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Listen for advertisements and return the first matching cooker.
    ///
    /// Accepts the first advertisement carrying the cooker service UUID or
    /// the appliance name prefix. Returns `Ok(None)` when nothing matched
    /// within `timeout`, an expected outcome rather than an error.
    pub async fn discover(&self, timeout: Duration) -> Result<Option<DeviceAddress>> {
        info!("Scanning for cooker advertisements");

        // Unfiltered scan: some firmware advertises only the local name, and
        // a service-UUID filter would suppress those advertisements entirely
        // on platforms that enforce it.
        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;
        let _scan = ScanGuard::start(&self.adapter, ScanFilter::default()).await?;

        let deadline = time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!("Discovery timed out after {:?}", timeout);
                    return Ok(None);
                }
                event = events.next() => {
                    let Some(event) = event else { return Ok(None) };
                    if let CentralEvent::DeviceDiscovered(id)
                        | CentralEvent::DeviceUpdated(id) = event
                    {
                        trace!("Advertisement from {:?}", id);
                        if let Some(address) = self.match_cooker(&id).await {
                            info!("Found cooker at {}", address);
                            return Ok(Some(address));
                        }
                    }
                }
            }
        }
    }

    /// Resolve a known address to a peripheral handle, scanning if needed.
    ///
    /// Used by connect: btleplug can only connect to a peripheral it has
    /// observed, so a configured address must be seen advertising first.
    pub(crate) async fn locate(
        &self,
        address: &DeviceAddress,
        timeout: Duration,
    ) -> Result<Peripheral> {
        // The adapter may already know the peripheral from an earlier scan.
        for peripheral in self.adapter.peripherals().await.map_err(Error::Bluetooth)? {
            if address.matches(&peripheral) {
                return Ok(peripheral);
            }
        }

        debug!("Scanning for {}", address);

        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;
        let _scan = ScanGuard::start(&self.adapter, ScanFilter::default()).await?;

        let deadline = time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    return Err(Error::DeviceNotFound {
                        address: address.to_string(),
                    });
                }
                event = events.next() => {
                    let Some(event) = event else {
                        return Err(Error::DeviceNotFound {
                            address: address.to_string(),
                        });
                    };
                    if let CentralEvent::DeviceDiscovered(id)
                        | CentralEvent::DeviceUpdated(id) = event
                    {
                        if let Ok(peripheral) = self.adapter.peripheral(&id).await {
                            if address.matches(&peripheral) {
                                return Ok(peripheral);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Check whether an advertising peripheral is a cooker.
    async fn match_cooker(&self, id: &PeripheralId) -> Option<DeviceAddress> {
        let peripheral = self.adapter.peripheral(id).await.ok()?;
        let properties = peripheral.properties().await.ok()??;

        if !is_cooker_advertisement(&properties) {
            trace!("Ignoring non-cooker peripheral {:?}", id);
            return None;
        }

        Some(DeviceAddress::new(peripheral.address().to_string()))
    }
}

/// Whether an advertisement identifies a cooker, by service UUID or by name
/// prefix. Either alone is sufficient.
fn is_cooker_advertisement(properties: &PeripheralProperties) -> bool {
    let by_service = properties.services.iter().any(is_cooker_service);
    let by_name = properties
        .local_name
        .as_ref()
        .map(|name| name.starts_with(DEVICE_NAME_PREFIX))
        .unwrap_or(false);

    by_service || by_name
}
