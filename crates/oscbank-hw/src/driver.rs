//! Driver seam for digital I/O channels
//!
//! Mirrors the Phidget22 channel object: a channel is created unbound, given an
//! index and optionally a device serial, handed its event handlers, then opened
//! with a bounded wait for attachment. Handlers are invoked on the driver's own
//! thread and must not block.

use oscbank_core::{ChannelKey, DeviceSerial, ErrorEventCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("timed out waiting for attachment after {0:?}")]
    Timeout(Duration),
    #[error("channel is not attached")]
    NotAttached,
    #[error("channel is closed")]
    Closed,
    #[error("value out of range: {0}")]
    OutOfRange(String),
    #[error("driver error {code}: {description}")]
    Driver { code: ErrorEventCode, description: String },
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Notifications a channel delivers to its registered handlers
pub trait ChannelListener: Send + Sync {
    fn on_attach(&self, _channel: ChannelKey) {}

    fn on_detach(&self, _channel: ChannelKey) {}

    fn on_error(&self, _channel: ChannelKey, _code: ErrorEventCode, _description: &str) {}

    /// Input state change. `None` when the driver omitted the state.
    fn on_state_change(&self, _channel: ChannelKey, _state: Option<bool>) {}
}

/// One driver channel object
pub trait DriverChannel: Send + Sync {
    fn set_channel(&self, index: usize) -> Result<(), DriverError>;

    fn set_device_serial(&self, serial: DeviceSerial) -> Result<(), DriverError>;

    /// Register the attach, detach and error handlers
    fn set_event_handler(&self, handler: Arc<dyn ChannelListener>);

    /// Register the state change handler. Only meaningful for inputs.
    fn set_state_change_handler(&self, handler: Arc<dyn ChannelListener>);

    /// Open the channel and block until it attaches or `timeout` elapses
    fn open_wait_for_attachment(&self, timeout: Duration) -> Result<(), DriverError>;

    fn state(&self) -> Result<bool, DriverError>;

    fn set_state(&self, state: bool) -> Result<(), DriverError>;

    /// Output duty cycle in `[0.0, 1.0]`
    fn set_duty_cycle(&self, duty: f64) -> Result<(), DriverError>;

    /// Release the channel. Closing a closed or never-opened channel succeeds.
    fn close(&self) -> Result<(), DriverError>;
}

/// Factory for channel objects of the bank's device model
pub trait Driver: Send + Sync {
    fn digital_input(&self) -> Arc<dyn DriverChannel>;

    fn digital_output(&self) -> Arc<dyn DriverChannel>;
}
