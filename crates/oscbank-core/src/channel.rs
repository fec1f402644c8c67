//! Channel types for tracking the digital I/O banks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of channels per bank on a Phidget 1012 interface kit
pub const DEFAULT_CHANNEL_COUNT: usize = 16;

/// Direction of a channel bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Digital input, reports state changes
    Input,
    /// Digital output, driven from inbound messages
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Device serial number a bank can be pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceSerial(pub i32);

impl std::fmt::Display for DeviceSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a channel in driver notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
    pub direction: Direction,
    pub index: usize,
}

impl ChannelKey {
    pub fn input(index: usize) -> Self {
        Self {
            direction: Direction::Input,
            index,
        }
    }

    pub fn output(index: usize) -> Self {
        Self {
            direction: Direction::Output,
            index,
        }
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.direction, self.index)
    }
}

/// Cached view of one hardware channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Position in the bank, also the last OSC address segment
    pub index: usize,
    pub direction: Direction,
    /// Serial the channel is pinned to, if any
    pub device_serial: Option<DeviceSerial>,
    /// Last known digital state
    pub state: bool,
    /// Whether the driver reported the channel as attached
    pub attached: bool,
    /// When the state last changed
    pub last_change: Option<DateTime<Utc>>,
}

impl Channel {
    /// Create a detached channel with its state cleared
    pub fn new(index: usize, direction: Direction, device_serial: Option<DeviceSerial>) -> Self {
        Self {
            index,
            direction,
            device_serial,
            state: false,
            attached: false,
            last_change: None,
        }
    }

    pub fn key(&self) -> ChannelKey {
        ChannelKey {
            direction: self.direction,
            index: self.index,
        }
    }

    /// Record a state reported by or written to the hardware
    pub fn record_state(&mut self, state: bool) {
        if self.state != state || self.last_change.is_none() {
            self.last_change = Some(Utc::now());
        }
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_creation() {
        let channel = Channel::new(3, Direction::Output, Some(DeviceSerial(498255)));
        assert_eq!(channel.key(), ChannelKey::output(3));
        assert!(!channel.state);
        assert!(!channel.attached);
        assert!(channel.last_change.is_none());
    }

    #[test]
    fn test_record_state_tracks_changes() {
        let mut channel = Channel::new(0, Direction::Input, None);
        channel.record_state(true);
        let first = channel.last_change.unwrap();
        assert!(channel.state);

        channel.record_state(true);
        assert_eq!(channel.last_change.unwrap(), first);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ChannelKey::input(5).to_string(), "input[5]");
        assert_eq!(ChannelKey::output(12).to_string(), "output[12]");
    }
}
