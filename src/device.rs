//! The public device facade.
//!
//! Composes the scanner, transport session, and correlator into the
//! operation surface consumed by callers: discovery, connection lifecycle,
//! composite status reads, and cooking/timer control.

use parking_lot::RwLock;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::ble::connection::{ConnectionManager, ConnectionState};
use crate::ble::scanner::{DeviceAddress, Scanner};
use crate::correlator::RequestCorrelator;
use crate::data::{DeviceState, DeviceStatus, TemperatureUnit, TimerReading};
use crate::error::{Error, Result};
use crate::policy::RetryPolicy;
use crate::protocol::{Command, Response};

/// Accepted target temperature range, degrees Celsius.
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 5.0..=99.9;

/// Accepted timer range, whole minutes.
pub const TIMER_RANGE: RangeInclusive<u32> = 0..=6000;

/// How long `connect` will scan to resolve an address to a peripheral.
const LOCATE_TIMEOUT: Duration = Duration::from_secs(10);

/// One cooker, one connection.
///
/// All operations that touch the transport suspend the caller until the
/// device confirms or the retry budget runs out. Commands are strictly
/// serialized: a second command while one is in flight fails with
/// [`Error::Busy`].
pub struct AnovaDevice {
    /// Retry policy shared by connection attempts and commands.
    policy: RetryPolicy,
    /// The active session, when connected.
    session: RwLock<Option<ActiveSession>>,
    /// Guard so only one connect/disconnect is outstanding at a time.
    transition: Mutex<()>,
}

struct ActiveSession {
    connection: Arc<ConnectionManager>,
    correlator: Arc<RequestCorrelator>,
}

impl AnovaDevice {
    /// Create a device handle with the default retry policy.
    ///
    /// No Bluetooth resources are touched until `discover` or `connect`.
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    /// Create a device handle with a custom retry policy.
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            policy,
            session: RwLock::new(None),
            transition: Mutex::new(()),
        }
    }

    // === Discovery & connection ===

    /// Scan for a cooker and return its address.
    ///
    /// Returns `Ok(None)` when no matching advertisement arrived within
    /// `timeout`; the caller decides whether to fall back to a configured
    /// address.
    pub async fn discover(&self, timeout: Duration) -> Result<Option<DeviceAddress>> {
        let scanner = Scanner::new().await?;
        scanner.discover(timeout).await
    }

    /// Connect to the cooker at `address` and subscribe to its responses.
    ///
    /// Retried per the device's [`RetryPolicy`]. Fails fast with
    /// [`Error::AlreadyInProgress`] if a connect or disconnect is already
    /// running.
    pub async fn connect(&self, address: &DeviceAddress) -> Result<()> {
        let _transition = self
            .transition
            .try_lock()
            .map_err(|_| Error::AlreadyInProgress)?;

        if self.connection_state().is_connected() {
            debug!("Already connected");
            return Ok(());
        }

        info!("Connecting to {}", address);

        let scanner = Scanner::new().await?;
        let peripheral = scanner.locate(address, LOCATE_TIMEOUT).await?;

        let connection = Arc::new(ConnectionManager::new(peripheral, self.policy.clone()));
        let (transport, lines) = connection.connect().await?;
        let correlator = Arc::new(RequestCorrelator::new(
            Arc::new(transport),
            lines,
            self.policy.clone(),
        ));

        *self.session.write() = Some(ActiveSession {
            connection,
            correlator,
        });

        info!("Connected to {}", address);

        Ok(())
    }

    /// Disconnect from the cooker.
    ///
    /// Safe to call in any state; a no-op when already disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        let _transition = self
            .transition
            .try_lock()
            .map_err(|_| Error::AlreadyInProgress)?;

        let Some(session) = self.session.write().take() else {
            return Ok(());
        };

        session.connection.disconnect().await
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.session
            .read()
            .as_ref()
            .map(|session| session.connection.state())
            .unwrap_or_default()
    }

    // === Composite status ===

    /// Read a complete point-in-time snapshot of the cooker.
    ///
    /// Issues the read commands in sequence and only returns once all
    /// succeed; if any sub-query fails the whole call fails with that error,
    /// never with a partial status.
    pub async fn get_status(&self) -> Result<DeviceStatus> {
        let correlator = self.correlator()?;
        read_composite_status(&correlator).await
    }

    // === Individual reads ===

    /// Read the current water temperature.
    pub async fn current_temperature(&self) -> Result<f64> {
        let correlator = self.correlator()?;
        execute_temperature(&correlator, Command::ReadTemperature).await
    }

    /// Read the target temperature.
    pub async fn target_temperature(&self) -> Result<f64> {
        let correlator = self.correlator()?;
        execute_temperature(&correlator, Command::ReadTargetTemperature).await
    }

    /// Read the timer.
    pub async fn timer(&self) -> Result<TimerReading> {
        let correlator = self.correlator()?;
        execute_timer_read(&correlator).await
    }

    /// Read the temperature unit.
    pub async fn unit(&self) -> Result<TemperatureUnit> {
        let correlator = self.correlator()?;
        execute_unit(&correlator, Command::ReadUnit).await
    }

    /// Read the run state.
    pub async fn device_state(&self) -> Result<DeviceState> {
        let correlator = self.correlator()?;
        execute_state(&correlator).await
    }

    // === Control ===

    /// Set the target temperature, in the device's current unit.
    pub async fn set_temperature(&self, value: f64) -> Result<()> {
        if !TEMPERATURE_RANGE.contains(&value) {
            return Err(Error::InvalidParameter {
                name: "temperature".to_string(),
                value: value.to_string(),
            });
        }

        let correlator = self.correlator()?;
        execute_temperature(&correlator, Command::SetTemperature(value)).await?;
        Ok(())
    }

    /// Switch the device between Celsius and Fahrenheit.
    pub async fn set_unit(&self, unit: TemperatureUnit) -> Result<()> {
        let correlator = self.correlator()?;
        execute_unit(&correlator, Command::SetUnit(unit)).await?;
        Ok(())
    }

    /// Start cooking.
    pub async fn start_cooking(&self) -> Result<()> {
        let correlator = self.correlator()?;
        execute_ack(&correlator, Command::Start).await
    }

    /// Stop cooking.
    pub async fn stop_cooking(&self) -> Result<()> {
        let correlator = self.correlator()?;
        execute_ack(&correlator, Command::Stop).await
    }

    /// Set the timer, optionally starting it in the same call.
    ///
    /// Two sequential commands on the wire: `set timer`, then `start time`
    /// when `auto_start` is set. If the first fails the second is never sent
    /// and the call fails with the first error.
    pub async fn set_timer(&self, minutes: u32, auto_start: bool) -> Result<()> {
        if !TIMER_RANGE.contains(&minutes) {
            return Err(Error::InvalidParameter {
                name: "minutes".to_string(),
                value: minutes.to_string(),
            });
        }

        let correlator = self.correlator()?;
        apply_timer(&correlator, minutes, auto_start).await
    }

    /// Start the timer.
    pub async fn start_timer(&self) -> Result<()> {
        let correlator = self.correlator()?;
        execute_ack(&correlator, Command::StartTimer).await
    }

    /// Stop the timer.
    pub async fn stop_timer(&self) -> Result<()> {
        let correlator = self.correlator()?;
        execute_ack(&correlator, Command::StopTimer).await
    }

    // === Internal ===

    fn correlator(&self) -> Result<Arc<RequestCorrelator>> {
        self.session
            .read()
            .as_ref()
            .map(|session| session.correlator.clone())
            .ok_or(Error::NotConnected)
    }
}

impl Default for AnovaDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AnovaDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnovaDevice")
            .field("connection_state", &self.connection_state())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Aggregate the read commands into one snapshot, all-or-nothing.
async fn read_composite_status(correlator: &RequestCorrelator) -> Result<DeviceStatus> {
    let current_temperature = execute_temperature(correlator, Command::ReadTemperature).await?;
    let target_temperature =
        execute_temperature(correlator, Command::ReadTargetTemperature).await?;
    let timer = execute_timer_read(correlator).await?;
    let unit = execute_unit(correlator, Command::ReadUnit).await?;
    let state = execute_state(correlator).await?;

    let timer_remaining = if timer.remaining.is_zero() && !timer.running {
        None
    } else {
        Some(timer.remaining)
    };

    Ok(DeviceStatus {
        current_temperature,
        target_temperature,
        unit,
        timer_remaining,
        is_running: state.is_running(),
        timer_running: timer.running,
    })
}

/// Set the timer, then conditionally start it.
async fn apply_timer(
    correlator: &RequestCorrelator,
    minutes: u32,
    auto_start: bool,
) -> Result<()> {
    execute_ack(correlator, Command::SetTimer(minutes)).await?;
    if auto_start {
        execute_ack(correlator, Command::StartTimer).await?;
    }
    Ok(())
}

async fn execute_temperature(correlator: &RequestCorrelator, command: Command) -> Result<f64> {
    match correlator.execute(&command).await? {
        Response::Temperature(value) => Ok(value),
        response => Err(mismatched(&command, &response)),
    }
}

async fn execute_unit(
    correlator: &RequestCorrelator,
    command: Command,
) -> Result<TemperatureUnit> {
    match correlator.execute(&command).await? {
        Response::Unit(unit) => Ok(unit),
        response => Err(mismatched(&command, &response)),
    }
}

async fn execute_timer_read(correlator: &RequestCorrelator) -> Result<TimerReading> {
    let command = Command::ReadTimer;
    match correlator.execute(&command).await? {
        Response::Timer(reading) => Ok(reading),
        response => Err(mismatched(&command, &response)),
    }
}

async fn execute_state(correlator: &RequestCorrelator) -> Result<DeviceState> {
    let command = Command::ReadStatus;
    match correlator.execute(&command).await? {
        Response::State(state) => Ok(state),
        response => Err(mismatched(&command, &response)),
    }
}

async fn execute_ack(correlator: &RequestCorrelator, command: Command) -> Result<()> {
    match correlator.execute(&command).await? {
        Response::Ack(ack) => {
            debug!("`{}` acknowledged: {:?}", command, ack);
            Ok(())
        }
        response => Err(mismatched(&command, &response)),
    }
}

/// The decoder ties response variants to verbs, so these arms are unreachable
/// in practice; surfacing them as malformed keeps the engine from guessing.
fn mismatched(command: &Command, response: &Response) -> Error {
    Error::MalformedResponse {
        command: command.verb().to_string(),
        line: format!("{response:?}"),
    }
}
