//! Fixed registry of input and output channels

use oscbank_core::{Channel, ChannelKey, DeviceSerial, Direction, ErrorEventCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::driver::{ChannelListener, Driver, DriverChannel, DriverError};

/// A driver channel plus its cached state
pub struct ChannelEntry {
    key: ChannelKey,
    handle: Arc<dyn DriverChannel>,
    info: Arc<Mutex<Channel>>,
    closed: AtomicBool,
}

impl ChannelEntry {
    pub fn key(&self) -> ChannelKey {
        self.key
    }

    pub fn index(&self) -> usize {
        self.key.index
    }

    pub fn direction(&self) -> Direction {
        self.key.direction
    }

    /// Copy of the cached channel record
    pub fn info(&self) -> Channel {
        lock(&self.info).clone()
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.info).attached
    }

    pub fn state(&self) -> bool {
        lock(&self.info).state
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Open the channel, blocking the current thread up to `timeout`
    pub fn open(&self, timeout: Duration) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        self.handle.open_wait_for_attachment(timeout)
    }

    /// Write an output state and cache it on success
    pub fn set_state(&self, state: bool) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        self.handle.set_state(state)?;
        lock(&self.info).record_state(state);
        Ok(())
    }

    /// Write an output duty cycle and cache the resulting state on success
    pub fn set_duty_cycle(&self, duty: f64) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        self.handle.set_duty_cycle(duty)?;
        lock(&self.info).record_state(duty > 0.0);
        Ok(())
    }

    /// Release the channel. Only the first call reaches the driver.
    pub fn close(&self) -> Result<bool, DriverError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let result = self.handle.close();
        lock(&self.info).attached = false;
        result.map(|_| true)
    }
}

fn lock(info: &Mutex<Channel>) -> MutexGuard<'_, Channel> {
    // A poisoned cache is still a valid record
    info.lock().unwrap_or_else(|e| e.into_inner())
}

/// Keeps the cached record in step with driver notifications before
/// forwarding them downstream
struct Tracker {
    info: Arc<Mutex<Channel>>,
    downstream: Arc<dyn ChannelListener>,
}

impl ChannelListener for Tracker {
    fn on_attach(&self, channel: ChannelKey) {
        lock(&self.info).attached = true;
        self.downstream.on_attach(channel);
    }

    fn on_detach(&self, channel: ChannelKey) {
        lock(&self.info).attached = false;
        self.downstream.on_detach(channel);
    }

    fn on_error(&self, channel: ChannelKey, code: ErrorEventCode, description: &str) {
        self.downstream.on_error(channel, code, description);
    }

    fn on_state_change(&self, channel: ChannelKey, state: Option<bool>) {
        if let Some(state) = state {
            lock(&self.info).record_state(state);
        }
        self.downstream.on_state_change(channel, state);
    }
}

/// Owns both banks. Indices match OSC addresses.
pub struct ChannelRegistry {
    inputs: Vec<Arc<ChannelEntry>>,
    outputs: Vec<Arc<ChannelEntry>>,
    device_serial: Option<DeviceSerial>,
}

impl ChannelRegistry {
    /// Create `count` inputs and `count` outputs and register their handlers
    pub fn configure(
        driver: &dyn Driver,
        device_serial: Option<DeviceSerial>,
        count: usize,
        listener: Arc<dyn ChannelListener>,
    ) -> Result<Self, DriverError> {
        let inputs = (0..count)
            .map(|index| {
                configure_entry(
                    driver.digital_input(),
                    ChannelKey::input(index),
                    device_serial,
                    &listener,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = (0..count)
            .map(|index| {
                configure_entry(
                    driver.digital_output(),
                    ChannelKey::output(index),
                    device_serial,
                    &listener,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            channels = count,
            serial = ?device_serial.map(|s| s.0),
            "Channel registry configured"
        );

        Ok(Self {
            inputs,
            outputs,
            device_serial,
        })
    }

    pub fn device_serial(&self) -> Option<DeviceSerial> {
        self.device_serial
    }

    /// Channels per bank
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn inputs(&self) -> &[Arc<ChannelEntry>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Arc<ChannelEntry>] {
        &self.outputs
    }

    pub fn bank(&self, direction: Direction) -> &[Arc<ChannelEntry>] {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    pub fn input(&self, index: usize) -> Option<&Arc<ChannelEntry>> {
        self.inputs.get(index)
    }

    pub fn output(&self, index: usize) -> Option<&Arc<ChannelEntry>> {
        self.outputs.get(index)
    }

    /// Cached records, inputs then outputs
    pub fn snapshot(&self) -> Vec<Channel> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .map(|entry| entry.info())
            .collect()
    }

    /// Release every channel whatever its attach state.
    ///
    /// Never fails; returns how many channels this call released.
    pub fn close(&self) -> usize {
        let mut released = 0;
        for entry in self.inputs.iter().chain(self.outputs.iter()) {
            match entry.close() {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => {
                    // The handle is gone either way
                    released += 1;
                    warn!(
                        direction = %entry.direction(),
                        channel = entry.index(),
                        error = %e,
                        "Error while closing channel"
                    );
                }
            }
        }
        if released > 0 {
            info!(released, "Closed channels");
        }
        released
    }
}

impl Drop for ChannelRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

fn configure_entry(
    handle: Arc<dyn DriverChannel>,
    key: ChannelKey,
    device_serial: Option<DeviceSerial>,
    listener: &Arc<dyn ChannelListener>,
) -> Result<Arc<ChannelEntry>, DriverError> {
    if let Some(serial) = device_serial {
        handle.set_device_serial(serial)?;
    }
    handle.set_channel(key.index)?;

    let info = Arc::new(Mutex::new(Channel::new(key.index, key.direction, device_serial)));
    let tracker: Arc<dyn ChannelListener> = Arc::new(Tracker {
        info: info.clone(),
        downstream: listener.clone(),
    });
    handle.set_event_handler(tracker.clone());
    if key.direction == Direction::Input {
        handle.set_state_change_handler(tracker);
    }

    debug!(channel = %key, "Configured channel");
    Ok(Arc::new(ChannelEntry {
        key,
        handle,
        info,
        closed: AtomicBool::new(false),
    }))
}
