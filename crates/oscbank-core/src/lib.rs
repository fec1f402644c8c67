//! oscbank Core - Channel model, OSC address scheme and driver error classes
//!
//! This crate provides the foundational types for the oscbank system:
//! - Channel records for the digital input and output banks
//! - The address scheme mapping channel indices to OSC addresses
//! - Driver error event codes and their severity table
//! - The shared run state observed by the serving loop

pub mod address;
pub mod channel;
pub mod error_code;
pub mod run_state;

pub use address::{AddressError, AddressScheme, DEFAULT_MODEL_TAG};
pub use channel::{Channel, ChannelKey, DeviceSerial, Direction, DEFAULT_CHANNEL_COUNT};
pub use error_code::{ClassificationTable, ErrorEventCode, Severity};
pub use run_state::{RunState, RunStatus};
