//! oscbank Hardware - Digital I/O channel banks
//!
//! This crate owns the hardware side of the bridge:
//! - The driver seam (`Driver`, `DriverChannel`, `ChannelListener`)
//! - The fixed channel registry with cached channel state
//! - The attachment sequencer that opens both banks at startup
//! - A simulated interface kit implementing the driver seam
//! - With the `phidget` feature, a Phidget22 backend for real boards

pub mod driver;
#[cfg(feature = "phidget")]
pub mod phidget;
pub mod registry;
pub mod sequencer;
pub mod simulated;

#[cfg(feature = "phidget")]
pub use self::phidget::PhidgetKit;
pub use driver::{ChannelListener, Driver, DriverChannel, DriverError};
pub use registry::{ChannelEntry, ChannelRegistry};
pub use sequencer::{AttachConfig, AttachmentSequencer, BankReport, SequenceError};
pub use simulated::SimulatedBank;
