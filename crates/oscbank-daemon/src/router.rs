//! Bidirectional routing between the channel banks and OSC
//!
//! Outbound: input state changes become one datagram each, queued from the
//! driver callback and sent in order by a single task.
//! Inbound: one dispatcher route per channel address; valid values drive the
//! matching output.

use oscbank_core::{AddressScheme, RunState};
use oscbank_hw::ChannelRegistry;
use oscbank_osc::{Dispatcher, Handler, OscSender, OscType};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Value reported when a state change carries no state
pub const DEFAULT_STATE_VALUE: i32 = 0;

/// One queued report for the remote endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel: usize,
    pub address: String,
    pub value: i32,
}

/// What happened to an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Output written
    Applied { channel: usize, state: bool },
    /// Value was not 0 or 1, message discarded
    Rejected,
    /// Value was valid but the driver refused the write
    Failed,
}

pub struct EventRouter {
    scheme: AddressScheme,
    run_state: RunState,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
}

impl EventRouter {
    /// Create the router and the receiving end of its outbound queue
    pub fn new(
        scheme: AddressScheme,
        run_state: RunState,
    ) -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (
            Self {
                scheme,
                run_state,
                outbound,
            },
            rx,
        )
    }

    /// Queue a report for an input state change. Never blocks.
    pub fn state_changed(&self, channel: usize, state: Option<bool>) {
        if !self.run_state.is_running() {
            debug!(channel, "Stopping, state change not reported");
            return;
        }
        let value = state.map(i32::from).unwrap_or(DEFAULT_STATE_VALUE);
        let address = self.scheme.address_for(channel);
        info!(channel, state = ?state, "Input state change");

        let msg = OutboundMessage {
            channel,
            address,
            value,
        };
        if let Err(e) = self.outbound.send(msg) {
            warn!(channel, error = %e, "Outbound queue closed, state change dropped");
        }
    }

    /// Build the inbound dispatch table, one route per output channel
    pub fn build_dispatcher(&self, registry: &Arc<ChannelRegistry>) -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        for (channel, address) in self.scheme.addresses(registry.len()) {
            let registry = registry.clone();
            let handler: Handler = Arc::new(move |address: &str, channel: usize, args: &[OscType]| {
                apply_inbound(&registry, address, channel, args);
            });
            info!(address = %address, "Listening on OSC address");
            dispatcher.map(address, channel, handler);
        }
        dispatcher
    }
}

/// Validate an inbound value and drive the output
pub fn apply_inbound(
    registry: &ChannelRegistry,
    address: &str,
    channel: usize,
    args: &[OscType],
) -> InboundOutcome {
    debug!(address = %address, channel, args = ?args, "OSC message received");

    let Some(state) = args.first().and_then(binary_value) else {
        error!(
            address = %address,
            channel,
            value = ?args.first(),
            "Value out of range, must be 0 or 1"
        );
        return InboundOutcome::Rejected;
    };

    let Some(output) = registry.output(channel) else {
        // Routes are built from the registry, so this is a wiring bug
        error!(address = %address, channel, "No output for routed channel");
        return InboundOutcome::Failed;
    };

    match output.set_state(state) {
        Ok(()) => {
            info!(channel, state, "Output set");
            InboundOutcome::Applied { channel, state }
        }
        Err(e) => {
            warn!(direction = "output", channel, error = %e, "Failed to set output");
            InboundOutcome::Failed
        }
    }
}

/// 0 and 1 in any numeric OSC type, or an OSC boolean
fn binary_value(arg: &OscType) -> Option<bool> {
    match arg {
        OscType::Int(0) | OscType::Long(0) => Some(false),
        OscType::Int(1) | OscType::Long(1) => Some(true),
        OscType::Float(v) if *v == 0.0 => Some(false),
        OscType::Float(v) if *v == 1.0 => Some(true),
        OscType::Double(v) if *v == 0.0 => Some(false),
        OscType::Double(v) if *v == 1.0 => Some(true),
        OscType::Bool(b) => Some(*b),
        _ => None,
    }
}

/// Drain the outbound queue in order until every sender is gone
pub async fn run_outbound(
    mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
    sender: OscSender,
    run_state: RunState,
) {
    while let Some(msg) = rx.recv().await {
        if !run_state.is_running() {
            debug!(address = %msg.address, "Stopping, dropping queued report");
            continue;
        }
        match sender.send(&msg.address, vec![OscType::Int(msg.value)]).await {
            Ok(_) => info!(
                target_addr = %sender.target(),
                address = %msg.address,
                value = msg.value,
                "Message sent"
            ),
            Err(e) => warn!(
                target_addr = %sender.target(),
                address = %msg.address,
                channel = msg.channel,
                error = %e,
                "Failed to send OSC message"
            ),
        }
    }
}
