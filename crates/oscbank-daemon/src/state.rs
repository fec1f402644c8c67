//! Shared state for the status API

use oscbank_core::{AddressScheme, RunState};
use oscbank_hw::ChannelRegistry;
use std::sync::Arc;
use tokio::sync::watch;

use crate::lifecycle::Phase;

/// Read-only view of a running bridge
pub struct StatusState {
    pub registry: Arc<ChannelRegistry>,
    pub scheme: AddressScheme,
    pub run_state: RunState,
    pub phase: watch::Receiver<Phase>,
}

impl StatusState {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        scheme: AddressScheme,
        run_state: RunState,
        phase: watch::Receiver<Phase>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            scheme,
            run_state,
            phase,
        })
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }
}
