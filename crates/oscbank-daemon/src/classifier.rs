//! Driver error classification

use oscbank_core::{ChannelKey, ClassificationTable, ErrorEventCode, RunState, Severity};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, info, warn};

/// First fatal driver error of a run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fatal driver error {code} on {channel}: {description}")]
pub struct FatalDriverError {
    pub channel: ChannelKey,
    pub code: ErrorEventCode,
    pub description: String,
}

/// Logs driver error events and stops the run on fatal ones
pub struct ErrorClassifier {
    table: ClassificationTable,
    run_state: RunState,
    fatal: Mutex<Option<FatalDriverError>>,
}

impl ErrorClassifier {
    pub fn new(run_state: RunState) -> Self {
        Self {
            table: ClassificationTable::default(),
            run_state,
            fatal: Mutex::new(None),
        }
    }

    /// The fatal error that stopped the run, if any
    pub fn fatal(&self) -> Option<FatalDriverError> {
        self.fatal.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Handle one error event and return its severity
    pub fn observe(
        &self,
        channel: ChannelKey,
        code: ErrorEventCode,
        description: &str,
    ) -> Severity {
        let severity = self.table.classify(code);
        match severity {
            Severity::Fatal => {
                error!(
                    direction = %channel.direction,
                    channel = channel.index,
                    code = %code,
                    description = %description,
                    "Unable to connect to the device: another process may hold the device"
                );
                self.fatal
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get_or_insert_with(|| FatalDriverError {
                        channel,
                        code,
                        description: description.to_string(),
                    });
                if self.run_state.request_stop() {
                    warn!("Fatal driver error, stopping");
                }
            }
            Severity::Recoverable => {
                warn!(
                    direction = %channel.direction,
                    channel = channel.index,
                    code = %code,
                    description = %description,
                    "Driver reported a transient error"
                );
            }
            Severity::Informational => {
                info!(
                    direction = %channel.direction,
                    channel = channel.index,
                    code = %code,
                    description = %description,
                    "Driver error event"
                );
            }
        }
        severity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_stops_run() {
        let run_state = RunState::new();
        let classifier = ErrorClassifier::new(run_state.clone());

        let severity = classifier.observe(ChannelKey::input(3), ErrorEventCode::Busy, "busy");
        assert_eq!(severity, Severity::Fatal);
        assert!(!run_state.is_running());

        classifier.observe(ChannelKey::output(1), ErrorEventCode::Busy, "again");
        let fatal = classifier.fatal().unwrap();
        assert_eq!(fatal.channel, ChannelKey::input(3));
        assert_eq!(fatal.code, ErrorEventCode::Busy);
    }

    #[test]
    fn test_other_codes_leave_run_state() {
        let run_state = RunState::new();
        let classifier = ErrorClassifier::new(run_state.clone());

        for code in [
            ErrorEventCode::PacketLost,
            ErrorEventCode::OverTemp,
            ErrorEventCode::Failure,
            ErrorEventCode::Unknown(0x4242),
        ] {
            assert_ne!(classifier.observe(ChannelKey::output(0), code, "x"), Severity::Fatal);
        }
        assert!(run_state.is_running());
        assert!(classifier.fatal().is_none());
    }
}
