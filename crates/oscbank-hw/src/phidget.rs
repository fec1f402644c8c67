//! Phidget22 backend for the driver seam
//!
//! Each `DriverChannel` wraps one `DigitalInput` or `DigitalOutput` object
//! from the Phidget22 library. Attach and detach are reported around
//! `open_wait` and `close`; input state changes come from the library's own
//! callback thread.

use ::phidget::{DigitalInput, DigitalOutput, Phidget};
use oscbank_core::{ChannelKey, DeviceSerial, Direction, ErrorEventCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::driver::{ChannelListener, Driver, DriverChannel, DriverError};

/// A Phidget interface kit reached through the Phidget22 library
#[derive(Debug, Clone, Copy, Default)]
pub struct PhidgetKit;

impl PhidgetKit {
    pub fn new() -> Self {
        Self
    }
}

impl Driver for PhidgetKit {
    fn digital_input(&self) -> Arc<dyn DriverChannel> {
        Arc::new(PhidgetChannel::new(Device::Input(DigitalInput::new())))
    }

    fn digital_output(&self) -> Arc<dyn DriverChannel> {
        Arc::new(PhidgetChannel::new(Device::Output(DigitalOutput::new())))
    }
}

enum Device {
    Input(DigitalInput),
    Output(DigitalOutput),
}

impl Device {
    fn direction(&self) -> Direction {
        match self {
            Self::Input(_) => Direction::Input,
            Self::Output(_) => Direction::Output,
        }
    }
}

struct PhidgetChannel {
    direction: Direction,
    device: Mutex<Device>,
    index: Mutex<Option<usize>>,
    events: Mutex<Option<Arc<dyn ChannelListener>>>,
    attached: AtomicBool,
}

impl PhidgetChannel {
    fn new(device: Device) -> Self {
        Self {
            direction: device.direction(),
            device: Mutex::new(device),
            index: Mutex::new(None),
            events: Mutex::new(None),
            attached: AtomicBool::new(false),
        }
    }

    fn device(&self) -> MutexGuard<'_, Device> {
        self.device.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn events(&self) -> Option<Arc<dyn ChannelListener>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn key(&self) -> ChannelKey {
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner()).unwrap_or(0);
        ChannelKey {
            direction: self.direction,
            index,
        }
    }
}

fn library_error(e: impl std::fmt::Display) -> DriverError {
    DriverError::Driver {
        code: ErrorEventCode::Failure,
        description: e.to_string(),
    }
}

fn inputs_are_read_only() -> DriverError {
    DriverError::Driver {
        code: ErrorEventCode::InvalidState,
        description: "inputs cannot be written".to_string(),
    }
}

/// Sort an `open_wait` failure by its library description.
///
/// Returns the error event to raise, if any, and the error to return.
fn classify_open_error(
    description: &str,
    timeout: Duration,
) -> (Option<ErrorEventCode>, DriverError) {
    let lower = description.to_lowercase();
    if lower.contains("busy") {
        (Some(ErrorEventCode::Busy), DriverError::Timeout(timeout))
    } else if lower.contains("timeout") || lower.contains("timed out") {
        (None, DriverError::Timeout(timeout))
    } else {
        (None, library_error(description))
    }
}

impl DriverChannel for PhidgetChannel {
    fn set_channel(&self, index: usize) -> Result<(), DriverError> {
        let raw = i32::try_from(index)
            .map_err(|_| DriverError::OutOfRange(format!("channel {}", index)))?;
        match &mut *self.device() {
            Device::Input(d) => d.set_channel(raw),
            Device::Output(d) => d.set_channel(raw),
        }
        .map_err(library_error)?;
        *self.index.lock().unwrap_or_else(|e| e.into_inner()) = Some(index);
        Ok(())
    }

    fn set_device_serial(&self, serial: DeviceSerial) -> Result<(), DriverError> {
        match &mut *self.device() {
            Device::Input(d) => d.set_serial_number(serial.0),
            Device::Output(d) => d.set_serial_number(serial.0),
        }
        .map_err(library_error)
    }

    fn set_event_handler(&self, handler: Arc<dyn ChannelListener>) {
        *self.events.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    fn set_state_change_handler(&self, handler: Arc<dyn ChannelListener>) {
        let key = self.key();
        let mut device = self.device();
        let Device::Input(input) = &mut *device else {
            debug!(channel = %key, "Outputs have no state change events");
            return;
        };
        let result = input.set_on_state_change_handler(move |_: &DigitalInput, state: u8| {
            handler.on_state_change(key, Some(state != 0));
        });
        if let Err(e) = result {
            warn!(channel = %key, error = %e, "Failed to register state change handler");
        }
    }

    fn open_wait_for_attachment(&self, timeout: Duration) -> Result<(), DriverError> {
        let key = self.key();
        if self.attached.load(Ordering::Acquire) {
            return Ok(());
        }
        let result = match &mut *self.device() {
            Device::Input(d) => d.open_wait(timeout),
            Device::Output(d) => d.open_wait(timeout),
        };

        match result {
            Ok(()) => {
                self.attached.store(true, Ordering::Release);
                if let Some(events) = self.events() {
                    events.on_attach(key);
                }
                Ok(())
            }
            Err(e) => {
                let description = e.to_string();
                let (event, error) = classify_open_error(&description, timeout);
                if let (Some(code), Some(events)) = (event, self.events()) {
                    events.on_error(key, code, &description);
                }
                Err(error)
            }
        }
    }

    fn state(&self) -> Result<bool, DriverError> {
        let state = match &mut *self.device() {
            Device::Input(d) => d.state(),
            Device::Output(d) => d.state(),
        }
        .map_err(library_error)?;
        Ok(state != 0)
    }

    fn set_state(&self, state: bool) -> Result<(), DriverError> {
        match &mut *self.device() {
            Device::Input(_) => Err(inputs_are_read_only()),
            Device::Output(d) => d.set_state(u8::from(state)).map_err(library_error),
        }
    }

    fn set_duty_cycle(&self, duty: f64) -> Result<(), DriverError> {
        if !(0.0..=1.0).contains(&duty) {
            return Err(DriverError::OutOfRange(format!("duty cycle {}", duty)));
        }
        match &mut *self.device() {
            Device::Input(_) => Err(inputs_are_read_only()),
            Device::Output(d) => d.set_duty_cycle(duty).map_err(library_error),
        }
    }

    fn close(&self) -> Result<(), DriverError> {
        let key = self.key();
        let result = match &mut *self.device() {
            Device::Input(d) => d.close(),
            Device::Output(d) => d.close(),
        };
        if self.attached.swap(false, Ordering::AcqRel) {
            if let Some(events) = self.events() {
                events.on_detach(key);
            }
        }
        result.map_err(library_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_errors_are_sorted() {
        let timeout = Duration::from_millis(5000);

        let (event, error) = classify_open_error("Timed Out", timeout);
        assert_eq!(event, None);
        assert!(error.is_timeout());

        let (event, error) = classify_open_error("Device is Busy (0x2)", timeout);
        assert_eq!(event, Some(ErrorEventCode::Busy));
        assert!(error.is_timeout());

        let (event, error) = classify_open_error("Unexpected Error", timeout);
        assert_eq!(event, None);
        assert!(matches!(error, DriverError::Driver { code: ErrorEventCode::Failure, .. }));
    }
}
