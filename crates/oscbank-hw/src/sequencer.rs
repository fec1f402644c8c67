//! Ordered, timed attachment of both channel banks
//!
//! Inputs are opened before outputs, one channel at a time. A channel that
//! does not attach within the timeout is left unattached and the sequence
//! moves on; any other driver failure aborts the whole sequence.

use oscbank_core::{ChannelKey, Direction, RunState};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::driver::DriverError;
use crate::registry::{ChannelEntry, ChannelRegistry};

#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("driver failure on {key}: {source}")]
    Driver {
        key: ChannelKey,
        #[source]
        source: DriverError,
    },
    #[error("attachment aborted: run state is stopping")]
    Aborted,
    #[error("attach task for {0} panicked or was cancelled")]
    Join(ChannelKey),
}

/// Timing of the attachment sequence
#[derive(Debug, Clone)]
pub struct AttachConfig {
    /// Bounded wait for each channel to attach
    pub timeout: Duration,
    /// Pause after each channel so attach notifications can be delivered
    pub settle: Duration,
    /// Pause after each bank and after the output reset
    pub bank_pause: Duration,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            settle: Duration::from_millis(10),
            bank_pause: Duration::from_millis(500),
        }
    }
}

/// Outcome of attaching one bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankReport {
    pub direction: Direction,
    pub attached: Vec<usize>,
    pub timed_out: Vec<usize>,
}

impl BankReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            attached: Vec::new(),
            timed_out: Vec::new(),
        }
    }
}

/// Brings the registry's channels to the attached state
pub struct AttachmentSequencer {
    config: AttachConfig,
    run_state: RunState,
}

impl AttachmentSequencer {
    pub fn new(config: AttachConfig, run_state: RunState) -> Self {
        Self { config, run_state }
    }

    pub fn config(&self) -> &AttachConfig {
        &self.config
    }

    /// Open every channel of one bank in index order
    pub async fn attach_bank(
        &self,
        registry: &ChannelRegistry,
        direction: Direction,
    ) -> Result<BankReport, SequenceError> {
        let mut report = BankReport::new(direction);
        info!(direction = %direction, channels = registry.len(), "Attaching bank");

        for entry in registry.bank(direction) {
            if !self.run_state.is_running() {
                return Err(SequenceError::Aborted);
            }

            match self.open(entry).await? {
                Ok(()) => {
                    debug!(channel = %entry.key(), "Channel attached");
                    report.attached.push(entry.index());
                }
                Err(e) if e.is_timeout() => {
                    warn!(
                        direction = %direction,
                        channel = entry.index(),
                        timeout_ms = self.config.timeout.as_millis() as u64,
                        "Channel did not attach, leaving it unattached"
                    );
                    report.timed_out.push(entry.index());
                }
                Err(source) => {
                    return Err(SequenceError::Driver {
                        key: entry.key(),
                        source,
                    })
                }
            }

            sleep(self.config.settle).await;
        }

        sleep(self.config.bank_pause).await;
        if !self.run_state.is_running() {
            return Err(SequenceError::Aborted);
        }

        info!(
            direction = %direction,
            attached = report.attached.len(),
            timed_out = report.timed_out.len(),
            "Bank attached"
        );
        Ok(report)
    }

    /// Run the blocking open off the async runtime and wait for it
    async fn open(
        &self,
        entry: &Arc<ChannelEntry>,
    ) -> Result<Result<(), DriverError>, SequenceError> {
        let key = entry.key();
        let entry = entry.clone();
        let timeout = self.config.timeout;
        tokio::task::spawn_blocking(move || entry.open(timeout))
            .await
            .map_err(|_| SequenceError::Join(key))
    }

    /// Drive every attached output to 0 so each run starts from a known state.
    ///
    /// Returns the indices that were reset.
    pub async fn reset_outputs(
        &self,
        registry: &ChannelRegistry,
    ) -> Result<Vec<usize>, SequenceError> {
        info!("Resetting outputs to 0");
        let mut reset = Vec::new();
        for entry in registry.outputs() {
            if !entry.is_attached() {
                warn!(channel = entry.index(), "Output not attached, skipping reset");
                continue;
            }
            entry
                .set_duty_cycle(0.0)
                .map_err(|source| SequenceError::Driver {
                    key: entry.key(),
                    source,
                })?;
            reset.push(entry.index());
        }
        sleep(self.config.bank_pause).await;
        Ok(reset)
    }

    /// Inputs, then outputs, then the output reset
    pub async fn run(&self, registry: &ChannelRegistry) -> Result<[BankReport; 2], SequenceError> {
        let inputs = self.attach_bank(registry, Direction::Input).await?;
        let outputs = self.attach_bank(registry, Direction::Output).await?;
        self.reset_outputs(registry).await?;
        Ok([inputs, outputs])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ChannelListener;
    use crate::simulated::SimulatedBank;
    use oscbank_core::ErrorEventCode;

    struct StopOnBusy(RunState);
    impl ChannelListener for StopOnBusy {
        fn on_error(&self, _channel: ChannelKey, code: ErrorEventCode, _description: &str) {
            if code == ErrorEventCode::Busy {
                self.0.request_stop();
            }
        }
    }

    fn fast() -> AttachConfig {
        AttachConfig {
            timeout: Duration::from_millis(20),
            settle: Duration::from_millis(1),
            bank_pause: Duration::from_millis(1),
        }
    }

    fn setup(bank: &SimulatedBank, run_state: &RunState) -> ChannelRegistry {
        ChannelRegistry::configure(bank, None, 16, Arc::new(StopOnBusy(run_state.clone()))).unwrap()
    }

    #[tokio::test]
    async fn test_inputs_attach_before_outputs() {
        let bank = SimulatedBank::new(498255, 16);
        let run_state = RunState::new();
        let registry = setup(&bank, &run_state);
        let sequencer = AttachmentSequencer::new(fast(), run_state);

        let [inputs, outputs] = sequencer.run(&registry).await.unwrap();
        assert_eq!(inputs.attached.len(), 16);
        assert_eq!(outputs.attached.len(), 16);

        let log = bank.open_log();
        assert_eq!(log.len(), 32);
        let last_input = log.iter().rposition(|k| k.direction == Direction::Input).unwrap();
        let first_output = log.iter().position(|k| k.direction == Direction::Output).unwrap();
        assert!(last_input < first_output);
        assert_eq!(log[..16], (0..16).map(ChannelKey::input).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn test_default_timing() {
        let sequencer = AttachmentSequencer::new(AttachConfig::default(), RunState::new());
        assert_eq!(sequencer.config().timeout, Duration::from_millis(5000));
        assert_eq!(sequencer.config().settle, Duration::from_millis(10));
        assert_eq!(sequencer.config().bank_pause, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_reset_forces_outputs_low() {
        let bank = SimulatedBank::new(498255, 16);
        for index in 0..16 {
            bank.set_hardware_output(index, index % 2 == 0);
        }
        let run_state = RunState::new();
        let registry = setup(&bank, &run_state);
        let sequencer = AttachmentSequencer::new(fast(), run_state);

        sequencer.run(&registry).await.unwrap();
        for index in 0..16 {
            assert_eq!(bank.hardware_output(index), Some(false));
            assert!(!registry.output(index).unwrap().state());
        }
    }

    #[tokio::test]
    async fn test_timeout_does_not_abort() {
        let bank = SimulatedBank::new(498255, 16);
        bank.set_unavailable(ChannelKey::input(2));
        bank.set_unavailable(ChannelKey::output(7));
        let run_state = RunState::new();
        let registry = setup(&bank, &run_state);
        let sequencer = AttachmentSequencer::new(fast(), run_state);

        let [inputs, outputs] = sequencer.run(&registry).await.unwrap();
        assert_eq!(inputs.timed_out, vec![2]);
        assert_eq!(outputs.timed_out, vec![7]);
        assert_eq!(outputs.attached.len(), 15);
        assert!(!registry.input(2).unwrap().is_attached());
        assert!(registry.input(3).unwrap().is_attached());
    }

    #[tokio::test]
    async fn test_driver_failure_aborts() {
        let bank = SimulatedBank::new(498255, 16);
        bank.set_open_failure(
            ChannelKey::input(4),
            DriverError::Driver {
                code: ErrorEventCode::Failure,
                description: "usb stack gone".to_string(),
            },
        );
        let run_state = RunState::new();
        let registry = setup(&bank, &run_state);
        let sequencer = AttachmentSequencer::new(fast(), run_state);

        let err = sequencer.run(&registry).await.unwrap_err();
        assert!(matches!(err, SequenceError::Driver { key, .. } if key == ChannelKey::input(4)));
        assert!(bank.open_log().iter().all(|k| k.direction == Direction::Input));
    }

    #[tokio::test]
    async fn test_busy_device_stops_sequence() {
        let bank = SimulatedBank::new(498255, 16);
        bank.set_busy(ChannelKey::input(3));
        let run_state = RunState::new();
        let registry = setup(&bank, &run_state);
        let sequencer = AttachmentSequencer::new(fast(), run_state.clone());

        let err = sequencer.run(&registry).await.unwrap_err();
        assert!(matches!(err, SequenceError::Aborted));
        assert!(!run_state.is_running());
        assert_eq!(bank.open_log().len(), 4);
    }
}
