//! Typed views of the cooker's reported state.

use std::time::Duration;

use crate::data::units::TemperatureUnit;

/// Run state reported by the `status` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceState {
    /// The circulator is heating and circulating.
    Running,
    /// The circulator is idle.
    Stopped,
    /// Water level is below the minimum mark.
    LowWater,
    /// The heating element reported a fault.
    HeaterError,
    /// Power was interrupted while running.
    PowerLoss,
}

impl DeviceState {
    /// Parse a run-state token from the wire.
    ///
    /// Returns `None` for unrecognized tokens; the codec surfaces those as
    /// malformed rather than guessing.
    pub fn parse_wire(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "running" | "started" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            "low water" => Some(Self::LowWater),
            "heater error" => Some(Self::HeaterError),
            "power loss" | "power interrupt error" => Some(Self::PowerLoss),
            _ => None,
        }
    }

    /// Whether this state means the circulator is actively cooking.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::LowWater => write!(f, "low water"),
            Self::HeaterError => write!(f, "heater error"),
            Self::PowerLoss => write!(f, "power loss"),
        }
    }
}

/// Timer state decoded from a `read timer` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimerReading {
    /// Time remaining on the timer.
    pub remaining: Duration,
    /// Whether the timer is counting down.
    pub running: bool,
}

impl TimerReading {
    /// Parse a timer response line.
    ///
    /// The cooker reports `<minutes> running|stopped` or
    /// `<minutes>:<seconds> running|stopped`; remaining time is normalized to
    /// seconds either way.
    pub fn parse_wire(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let time = parts.next()?;
        let state = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let remaining = if let Some((minutes, seconds)) = time.split_once(':') {
            let minutes: u64 = minutes.parse().ok()?;
            let seconds: u64 = seconds.parse().ok()?;
            if seconds >= 60 {
                return None;
            }
            Duration::from_secs(minutes * 60 + seconds)
        } else {
            Duration::from_secs(time.parse::<u64>().ok()? * 60)
        };

        let running = match state.to_ascii_lowercase().as_str() {
            "running" => true,
            "stopped" => false,
            _ => return None,
        };

        Some(Self { remaining, running })
    }
}

/// Composite point-in-time snapshot of the cooker.
///
/// Built fresh on each `get_status` call; never a cache, never partially
/// populated.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStatus {
    /// Current water temperature in the device's current unit.
    pub current_temperature: f64,
    /// Target temperature in the device's current unit.
    pub target_temperature: f64,
    /// The unit the temperatures are expressed in.
    pub unit: TemperatureUnit,
    /// Time remaining on the timer; `None` when no timer is programmed.
    pub timer_remaining: Option<Duration>,
    /// Whether the circulator is cooking.
    pub is_running: bool,
    /// Whether the timer is counting down.
    pub timer_running: bool,
}
