//! In-process simulated interface kit
//!
//! Behaves like one attached 16/16 digital I/O board: channels attach on open,
//! outputs hold whatever was last written, inputs change when a test (or the
//! operator) injects a transition. Individual channels can be made to time
//! out, report a busy device or fail outright when opened.

use oscbank_core::{ChannelKey, DeviceSerial, Direction, ErrorEventCode};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::debug;

use crate::driver::{ChannelListener, Driver, DriverChannel, DriverError};

#[derive(Default)]
struct BankState {
    serial: i32,
    inputs: Vec<bool>,
    outputs: Vec<bool>,
    open_log: Vec<ChannelKey>,
    close_calls: HashMap<ChannelKey, usize>,
    unavailable: HashSet<ChannelKey>,
    busy: HashSet<ChannelKey>,
    failures: HashMap<ChannelKey, DriverError>,
    members: Vec<Weak<SimulatedChannel>>,
}

/// Simulated board. Cloning yields another handle on the same board.
#[derive(Clone)]
pub struct SimulatedBank {
    state: Arc<Mutex<BankState>>,
}

impl SimulatedBank {
    pub fn new(serial: i32, channels: usize) -> Self {
        let state = BankState {
            serial,
            inputs: vec![false; channels],
            outputs: vec![false; channels],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BankState> {
        lock_state(&self.state)
    }

    pub fn serial(&self) -> DeviceSerial {
        DeviceSerial(self.lock().serial)
    }

    /// Opening this channel times out
    pub fn set_unavailable(&self, key: ChannelKey) {
        self.lock().unavailable.insert(key);
    }

    /// Opening this channel raises a busy error event, then times out
    pub fn set_busy(&self, key: ChannelKey) {
        self.lock().busy.insert(key);
    }

    /// Opening this channel fails with `error`
    pub fn set_open_failure(&self, key: ChannelKey, error: DriverError) {
        self.lock().failures.insert(key, error);
    }

    /// Force an output level, e.g. left over from a previous run
    pub fn set_hardware_output(&self, index: usize, state: bool) {
        if let Some(slot) = self.lock().outputs.get_mut(index) {
            *slot = state;
        }
    }

    pub fn hardware_output(&self, index: usize) -> Option<bool> {
        self.lock().outputs.get(index).copied()
    }

    /// Every open attempt in call order
    pub fn open_log(&self) -> Vec<ChannelKey> {
        self.lock().open_log.clone()
    }

    pub fn close_calls(&self, key: ChannelKey) -> usize {
        self.lock().close_calls.get(&key).copied().unwrap_or(0)
    }

    pub fn has_state_handler(&self, key: ChannelKey) -> bool {
        self.channel(key)
            .map(|c| lock_handler(&c.state_handler).is_some())
            .unwrap_or(false)
    }

    /// Drive an input transition. Returns false if the input is not attached.
    pub fn inject_input(&self, index: usize, state: Option<bool>) -> bool {
        let Some(channel) = self.channel(ChannelKey::input(index)) else {
            return false;
        };
        if !channel.attached.load(Ordering::Acquire) {
            return false;
        }
        if let Some(state) = state {
            if let Some(slot) = self.lock().inputs.get_mut(index) {
                *slot = state;
            }
        }
        let handler = lock_handler(&channel.state_handler).clone();
        if let Some(handler) = handler {
            handler.on_state_change(channel.key_or_default(), state);
        }
        true
    }

    /// Raise an asynchronous error event on a channel
    pub fn raise_error(&self, key: ChannelKey, code: ErrorEventCode, description: &str) -> bool {
        let Some(channel) = self.channel(key) else {
            return false;
        };
        channel.emit_error(key, code, description);
        true
    }

    fn channel(&self, key: ChannelKey) -> Option<Arc<SimulatedChannel>> {
        let state = self.lock();
        state
            .members
            .iter()
            .filter_map(Weak::upgrade)
            .find(|c| c.key() == Some(key))
    }

    fn create(&self, direction: Direction) -> Arc<dyn DriverChannel> {
        let channel = Arc::new(SimulatedChannel {
            bank: self.state.clone(),
            direction,
            index: Mutex::new(None),
            serial: Mutex::new(None),
            event_handler: Mutex::new(None),
            state_handler: Mutex::new(None),
            attached: AtomicBool::new(false),
        });
        self.lock().members.push(Arc::downgrade(&channel));
        channel
    }
}

impl Driver for SimulatedBank {
    fn digital_input(&self) -> Arc<dyn DriverChannel> {
        self.create(Direction::Input)
    }

    fn digital_output(&self) -> Arc<dyn DriverChannel> {
        self.create(Direction::Output)
    }
}

type HandlerSlot = Mutex<Option<Arc<dyn ChannelListener>>>;

struct SimulatedChannel {
    bank: Arc<Mutex<BankState>>,
    direction: Direction,
    index: Mutex<Option<usize>>,
    serial: Mutex<Option<DeviceSerial>>,
    event_handler: HandlerSlot,
    state_handler: HandlerSlot,
    attached: AtomicBool,
}

impl SimulatedChannel {
    fn key(&self) -> Option<ChannelKey> {
        let index = (*self.index.lock().unwrap_or_else(|e| e.into_inner()))?;
        Some(ChannelKey {
            direction: self.direction,
            index,
        })
    }

    fn key_or_default(&self) -> ChannelKey {
        self.key().unwrap_or(ChannelKey {
            direction: self.direction,
            index: 0,
        })
    }

    fn bound_key(&self) -> Result<ChannelKey, DriverError> {
        self.key().ok_or_else(|| DriverError::Driver {
            code: ErrorEventCode::InvalidState,
            description: "channel index not set".to_string(),
        })
    }

    fn require_attached(&self) -> Result<ChannelKey, DriverError> {
        let key = self.bound_key()?;
        if !self.attached.load(Ordering::Acquire) {
            return Err(DriverError::NotAttached);
        }
        Ok(key)
    }

    fn require_output(&self) -> Result<ChannelKey, DriverError> {
        let key = self.require_attached()?;
        if key.direction != Direction::Output {
            return Err(DriverError::Driver {
                code: ErrorEventCode::InvalidState,
                description: "inputs cannot be written".to_string(),
            });
        }
        Ok(key)
    }

    fn emit_error(&self, key: ChannelKey, code: ErrorEventCode, description: &str) {
        let handler = lock_handler(&self.event_handler).clone();
        if let Some(handler) = handler {
            handler.on_error(key, code, description);
        }
    }
}

enum OpenOutcome {
    Attach,
    Busy,
    Timeout,
}

impl DriverChannel for SimulatedChannel {
    fn set_channel(&self, index: usize) -> Result<(), DriverError> {
        *self.index.lock().unwrap_or_else(|e| e.into_inner()) = Some(index);
        Ok(())
    }

    fn set_device_serial(&self, serial: DeviceSerial) -> Result<(), DriverError> {
        *self.serial.lock().unwrap_or_else(|e| e.into_inner()) = Some(serial);
        Ok(())
    }

    fn set_event_handler(&self, handler: Arc<dyn ChannelListener>) {
        *lock_handler(&self.event_handler) = Some(handler);
    }

    fn set_state_change_handler(&self, handler: Arc<dyn ChannelListener>) {
        *lock_handler(&self.state_handler) = Some(handler);
    }

    fn open_wait_for_attachment(&self, timeout: Duration) -> Result<(), DriverError> {
        let key = self.bound_key()?;
        if self.attached.load(Ordering::Acquire) {
            return Ok(());
        }
        let wanted = *self.serial.lock().unwrap_or_else(|e| e.into_inner());

        let outcome = {
            let mut bank = lock_state(&self.bank);
            bank.open_log.push(key);
            if let Some(error) = bank.failures.get(&key) {
                return Err(error.clone());
            }
            let exists = key.index < bank.inputs.len();
            let serial_matches = wanted.map_or(true, |s| s.0 == bank.serial);
            if bank.busy.contains(&key) {
                OpenOutcome::Busy
            } else if !exists || !serial_matches || bank.unavailable.contains(&key) {
                OpenOutcome::Timeout
            } else {
                OpenOutcome::Attach
            }
        };

        match outcome {
            OpenOutcome::Attach => {
                self.attached.store(true, Ordering::Release);
                debug!(channel = %key, "Simulated channel attached");
                let handler = lock_handler(&self.event_handler).clone();
                if let Some(handler) = handler {
                    handler.on_attach(key);
                }
                Ok(())
            }
            OpenOutcome::Busy => {
                self.emit_error(
                    key,
                    ErrorEventCode::Busy,
                    "device is already open in another process",
                );
                Err(DriverError::Timeout(timeout))
            }
            OpenOutcome::Timeout => Err(DriverError::Timeout(timeout)),
        }
    }

    fn state(&self) -> Result<bool, DriverError> {
        let key = self.require_attached()?;
        let bank = lock_state(&self.bank);
        let bank_states = match key.direction {
            Direction::Input => &bank.inputs,
            Direction::Output => &bank.outputs,
        };
        Ok(bank_states[key.index])
    }

    fn set_state(&self, state: bool) -> Result<(), DriverError> {
        let key = self.require_output()?;
        lock_state(&self.bank).outputs[key.index] = state;
        Ok(())
    }

    fn set_duty_cycle(&self, duty: f64) -> Result<(), DriverError> {
        let key = self.require_output()?;
        if !(0.0..=1.0).contains(&duty) {
            return Err(DriverError::OutOfRange(format!("duty cycle {}", duty)));
        }
        lock_state(&self.bank).outputs[key.index] = duty > 0.0;
        Ok(())
    }

    fn close(&self) -> Result<(), DriverError> {
        let key = self.key_or_default();
        *lock_state(&self.bank).close_calls.entry(key).or_insert(0) += 1;
        if self.attached.swap(false, Ordering::AcqRel) {
            let handler = lock_handler(&self.event_handler).clone();
            if let Some(handler) = handler {
                handler.on_detach(key);
            }
        }
        Ok(())
    }
}

fn lock_state(state: &Mutex<BankState>) -> MutexGuard<'_, BankState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn lock_handler(slot: &HandlerSlot) -> MutexGuard<'_, Option<Arc<dyn ChannelListener>>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}
