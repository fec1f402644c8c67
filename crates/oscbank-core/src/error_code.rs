//! Driver error event codes and their severity classes

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Error event codes reported asynchronously by the Phidget22 driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorEventCode {
    BadVersion,
    Busy,
    Network,
    Dispatch,
    Failure,
    Ok,
    Overrun,
    PacketLost,
    Wrap,
    OverTemp,
    OverCurrent,
    OutOfRange,
    BadPower,
    Saturation,
    OverVoltage,
    FailSafe,
    VoltageError,
    EnergyDump,
    MotorStall,
    InvalidState,
    BadConnection,
    OutOfRangeHigh,
    OutOfRangeLow,
    Fault,
    EStop,
    /// Code not known to this build
    Unknown(u32),
}

impl ErrorEventCode {
    /// Map a raw driver code
    pub fn from_raw(code: u32) -> Self {
        match code {
            1 => Self::BadVersion,
            2 => Self::Busy,
            3 => Self::Network,
            4 => Self::Dispatch,
            5 => Self::Failure,
            0x1000 => Self::Ok,
            0x1002 => Self::Overrun,
            0x1003 => Self::PacketLost,
            0x1004 => Self::Wrap,
            0x1005 => Self::OverTemp,
            0x1006 => Self::OverCurrent,
            0x1007 => Self::OutOfRange,
            0x1008 => Self::BadPower,
            0x1009 => Self::Saturation,
            0x100B => Self::OverVoltage,
            0x100C => Self::FailSafe,
            0x100D => Self::VoltageError,
            0x100E => Self::EnergyDump,
            0x100F => Self::MotorStall,
            0x1010 => Self::InvalidState,
            0x1011 => Self::BadConnection,
            0x1012 => Self::OutOfRangeHigh,
            0x1013 => Self::OutOfRangeLow,
            0x1014 => Self::Fault,
            0x1015 => Self::EStop,
            other => Self::Unknown(other),
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            Self::BadVersion => 1,
            Self::Busy => 2,
            Self::Network => 3,
            Self::Dispatch => 4,
            Self::Failure => 5,
            Self::Ok => 0x1000,
            Self::Overrun => 0x1002,
            Self::PacketLost => 0x1003,
            Self::Wrap => 0x1004,
            Self::OverTemp => 0x1005,
            Self::OverCurrent => 0x1006,
            Self::OutOfRange => 0x1007,
            Self::BadPower => 0x1008,
            Self::Saturation => 0x1009,
            Self::OverVoltage => 0x100B,
            Self::FailSafe => 0x100C,
            Self::VoltageError => 0x100D,
            Self::EnergyDump => 0x100E,
            Self::MotorStall => 0x100F,
            Self::InvalidState => 0x1010,
            Self::BadConnection => 0x1011,
            Self::OutOfRangeHigh => 0x1012,
            Self::OutOfRangeLow => 0x1013,
            Self::Fault => 0x1014,
            Self::EStop => 0x1015,
            Self::Unknown(code) => *code,
        }
    }

    /// Driver-style name, e.g. `EEPHIDGET_BUSY`
    pub fn name(&self) -> String {
        let suffix = match self {
            Self::BadVersion => "BADVERSION",
            Self::Busy => "BUSY",
            Self::Network => "NETWORK",
            Self::Dispatch => "DISPATCH",
            Self::Failure => "FAILURE",
            Self::Ok => "OK",
            Self::Overrun => "OVERRUN",
            Self::PacketLost => "PACKETLOST",
            Self::Wrap => "WRAP",
            Self::OverTemp => "OVERTEMP",
            Self::OverCurrent => "OVERCURRENT",
            Self::OutOfRange => "OUTOFRANGE",
            Self::BadPower => "BADPOWER",
            Self::Saturation => "SATURATION",
            Self::OverVoltage => "OVERVOLTAGE",
            Self::FailSafe => "FAILSAFE",
            Self::VoltageError => "VOLTAGEERROR",
            Self::EnergyDump => "ENERGYDUMP",
            Self::MotorStall => "MOTORSTALL",
            Self::InvalidState => "INVALIDSTATE",
            Self::BadConnection => "BADCONNECTION",
            Self::OutOfRangeHigh => "OUTOFRANGEHIGH",
            Self::OutOfRangeLow => "OUTOFRANGELOW",
            Self::Fault => "FAULT",
            Self::EStop => "ESTOP",
            Self::Unknown(code) => return format!("EEPHIDGET_UNKNOWN(0x{:04X})", code),
        };
        format!("EEPHIDGET_{}", suffix)
    }
}

impl std::fmt::Display for ErrorEventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How the bridge reacts to an error event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The run cannot continue
    Fatal,
    /// Transient condition, logged as a warning
    Recoverable,
    /// Logged only
    Informational,
}

/// Code to severity lookup, built once at startup
#[derive(Debug, Clone)]
pub struct ClassificationTable {
    entries: HashMap<ErrorEventCode, Severity>,
}

impl Default for ClassificationTable {
    fn default() -> Self {
        let entries = HashMap::from([
            (ErrorEventCode::Busy, Severity::Fatal),
            (ErrorEventCode::Network, Severity::Recoverable),
            (ErrorEventCode::PacketLost, Severity::Recoverable),
            (ErrorEventCode::Overrun, Severity::Recoverable),
            (ErrorEventCode::BadConnection, Severity::Recoverable),
        ]);
        Self { entries }
    }
}

impl ClassificationTable {
    /// Severity of a code, informational when not listed
    pub fn classify(&self, code: ErrorEventCode) -> Severity {
        self.entries
            .get(&code)
            .copied()
            .unwrap_or(Severity::Informational)
    }
}
