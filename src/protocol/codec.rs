//! Command encoding and response decoding.
//!
//! The cooker speaks a line-oriented ASCII protocol: a command is a verb,
//! an optional single numeric argument, and a carriage-return terminator.
//! Responses carry no command identifier, so each verb defines the shape its
//! reply must have and decoding is always performed against the verb that was
//! sent.

use crate::data::{DeviceState, TemperatureUnit, TimerReading};
use crate::error::{Error, Result};

/// Maximum encoded command length in bytes, terminator included.
///
/// The cooker silently drops longer writes. The facade's argument validation
/// keeps every encodable command under this ceiling.
pub const MAX_COMMAND_LENGTH: usize = 20;

/// A single command for the cooker.
///
/// Immutable value created per invocation; consumed by the correlator and
/// discarded once its response resolves or its attempt budget is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Query the run state (`status`).
    ReadStatus,
    /// Query the current water temperature (`read temp`).
    ReadTemperature,
    /// Query the target temperature (`read set temp`).
    ReadTargetTemperature,
    /// Query the timer (`read timer`).
    ReadTimer,
    /// Query the temperature unit (`read unit`).
    ReadUnit,
    /// Start cooking (`start`).
    Start,
    /// Stop cooking (`stop`).
    Stop,
    /// Set the target temperature (`set temp <value>`).
    SetTemperature(f64),
    /// Set the temperature unit (`set unit c|f`).
    SetUnit(TemperatureUnit),
    /// Set the timer in whole minutes (`set timer <minutes>`).
    SetTimer(u32),
    /// Start the timer (`start time`).
    StartTimer,
    /// Stop the timer (`stop time`).
    StopTimer,
}

impl Command {
    /// The command verb as written on the wire, without argument or terminator.
    ///
    /// Used for log and error context.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::ReadStatus => "status",
            Self::ReadTemperature => "read temp",
            Self::ReadTargetTemperature => "read set temp",
            Self::ReadTimer => "read timer",
            Self::ReadUnit => "read unit",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::SetTemperature(_) => "set temp",
            Self::SetUnit(_) => "set unit",
            Self::SetTimer(_) => "set timer",
            Self::StartTimer => "start time",
            Self::StopTimer => "stop time",
        }
    }

    /// Encode the full wire line, terminator included.
    ///
    /// Temperature arguments are formatted with one decimal place; timer
    /// arguments are whole minutes.
    pub fn encode(&self) -> String {
        let line = match self {
            Self::SetTemperature(value) => format!("set temp {value:.1}"),
            Self::SetUnit(unit) => format!("set unit {}", unit.wire_token()),
            Self::SetTimer(minutes) => format!("set timer {minutes}"),
            other => other.verb().to_string(),
        };
        debug_assert!(line.len() + 1 <= MAX_COMMAND_LENGTH);
        format!("{line}\r")
    }

    /// Decode a framed response line according to this command's verb.
    ///
    /// A line whose shape does not parse is a [`Error::MalformedResponse`];
    /// a garbled reply indicates a protocol mismatch, not transient loss, so
    /// the caller never retries it.
    pub fn decode_response(&self, line: &str) -> Result<Response> {
        let trimmed = line.trim();
        match self {
            Self::ReadTemperature | Self::ReadTargetTemperature | Self::SetTemperature(_) => {
                trimmed
                    .parse::<f64>()
                    .map(Response::Temperature)
                    .map_err(|_| self.malformed(line))
            }
            Self::ReadUnit | Self::SetUnit(_) => TemperatureUnit::parse_wire(trimmed)
                .map(Response::Unit)
                .ok_or_else(|| self.malformed(line)),
            Self::ReadTimer => TimerReading::parse_wire(trimmed)
                .map(Response::Timer)
                .ok_or_else(|| self.malformed(line)),
            Self::ReadStatus => DeviceState::parse_wire(trimmed)
                .map(Response::State)
                .ok_or_else(|| self.malformed(line)),
            Self::Start | Self::Stop | Self::SetTimer(_) | Self::StartTimer | Self::StopTimer => {
                if trimmed.is_empty() {
                    Err(self.malformed(line))
                } else {
                    Ok(Response::Ack(trimmed.to_string()))
                }
            }
        }
    }

    fn malformed(&self, line: &str) -> Error {
        Error::MalformedResponse {
            command: self.verb().to_string(),
            line: line.to_string(),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode().trim_end_matches('\r'))
    }
}

/// A decoded response, typed per the verb that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// A temperature value (current, target, or set-temp echo).
    Temperature(f64),
    /// The temperature unit.
    Unit(TemperatureUnit),
    /// Timer remaining time and running flag.
    Timer(TimerReading),
    /// Run state from the `status` verb.
    State(DeviceState),
    /// Short acknowledgement token for control commands.
    Ack(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_encode_read_commands() {
        assert_eq!(Command::ReadStatus.encode(), "status\r");
        assert_eq!(Command::ReadTemperature.encode(), "read temp\r");
        assert_eq!(Command::ReadTargetTemperature.encode(), "read set temp\r");
        assert_eq!(Command::ReadTimer.encode(), "read timer\r");
        assert_eq!(Command::ReadUnit.encode(), "read unit\r");
    }

    #[test]
    fn test_encode_control_commands() {
        assert_eq!(Command::Start.encode(), "start\r");
        assert_eq!(Command::Stop.encode(), "stop\r");
        assert_eq!(Command::StartTimer.encode(), "start time\r");
        assert_eq!(Command::StopTimer.encode(), "stop time\r");
    }

    #[test]
    fn test_encode_set_commands() {
        assert_eq!(Command::SetTemperature(60.0).encode(), "set temp 60.0\r");
        assert_eq!(Command::SetTemperature(60.26).encode(), "set temp 60.3\r");
        assert_eq!(Command::SetTimer(120).encode(), "set timer 120\r");
        assert_eq!(
            Command::SetUnit(TemperatureUnit::Celsius).encode(),
            "set unit c\r"
        );
        assert_eq!(
            Command::SetUnit(TemperatureUnit::Fahrenheit).encode(),
            "set unit f\r"
        );
    }

    #[test]
    fn test_all_commands_fit_the_wire() {
        // Worst cases under the facade's validation ranges.
        let commands = [
            Command::ReadStatus,
            Command::ReadTemperature,
            Command::ReadTargetTemperature,
            Command::ReadTimer,
            Command::ReadUnit,
            Command::Start,
            Command::Stop,
            Command::SetTemperature(99.9),
            Command::SetUnit(TemperatureUnit::Fahrenheit),
            Command::SetTimer(6000),
            Command::StartTimer,
            Command::StopTimer,
        ];
        for command in commands {
            assert!(
                command.encode().len() <= MAX_COMMAND_LENGTH,
                "{command} exceeds wire limit"
            );
        }
    }

    #[test]
    fn test_decode_temperature() {
        let response = Command::ReadTemperature.decode_response("60.5").unwrap();
        assert_eq!(response, Response::Temperature(60.5));

        // Set-temp echoes the value back; wire format is lossless here.
        let echoed = Command::SetTemperature(60.0).decode_response("60.0").unwrap();
        assert_eq!(echoed, Response::Temperature(60.0));
    }

    #[test]
    fn test_decode_temperature_malformed() {
        let err = Command::ReadTemperature
            .decode_response("warm-ish")
            .unwrap_err();
        match err {
            Error::MalformedResponse { command, line } => {
                assert_eq!(command, "read temp");
                assert_eq!(line, "warm-ish");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_unit() {
        assert_eq!(
            Command::ReadUnit.decode_response("c").unwrap(),
            Response::Unit(TemperatureUnit::Celsius)
        );
        assert_eq!(
            Command::ReadUnit.decode_response("F").unwrap(),
            Response::Unit(TemperatureUnit::Fahrenheit)
        );
        assert!(Command::ReadUnit.decode_response("kelvin").is_err());
    }

    #[test]
    fn test_decode_timer() {
        let response = Command::ReadTimer.decode_response("90 running").unwrap();
        assert_eq!(
            response,
            Response::Timer(TimerReading {
                remaining: Duration::from_secs(90 * 60),
                running: true,
            })
        );
        assert!(Command::ReadTimer.decode_response("soon").is_err());
    }

    #[test]
    fn test_decode_status() {
        assert_eq!(
            Command::ReadStatus.decode_response("running").unwrap(),
            Response::State(DeviceState::Running)
        );
        assert!(Command::ReadStatus.decode_response("confused").is_err());
    }

    #[test]
    fn test_decode_ack() {
        assert_eq!(
            Command::Start.decode_response("start").unwrap(),
            Response::Ack("start".to_string())
        );
        assert!(Command::Start.decode_response("").is_err());
        assert!(Command::SetTimer(120).decode_response("  ").is_err());
    }
}
