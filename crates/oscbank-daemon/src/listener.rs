//! Driver notifications fanned out to the router and the classifier

use oscbank_core::{ChannelKey, Direction, ErrorEventCode};
use oscbank_hw::ChannelListener;
use std::sync::Arc;
use tracing::{debug, info};

use crate::classifier::ErrorClassifier;
use crate::router::EventRouter;

pub struct DriverEvents {
    router: Arc<EventRouter>,
    classifier: Arc<ErrorClassifier>,
}

impl DriverEvents {
    pub fn new(router: Arc<EventRouter>, classifier: Arc<ErrorClassifier>) -> Self {
        Self { router, classifier }
    }
}

impl ChannelListener for DriverEvents {
    fn on_attach(&self, channel: ChannelKey) {
        info!(direction = %channel.direction, channel = channel.index, "Channel attached");
    }

    fn on_detach(&self, channel: ChannelKey) {
        info!(direction = %channel.direction, channel = channel.index, "Channel detached");
    }

    fn on_error(&self, channel: ChannelKey, code: ErrorEventCode, description: &str) {
        self.classifier.observe(channel, code, description);
    }

    fn on_state_change(&self, channel: ChannelKey, state: Option<bool>) {
        if channel.direction != Direction::Input {
            debug!(channel = %channel, "Ignoring state change from an output");
            return;
        }
        self.router.state_changed(channel.index, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oscbank_core::{AddressScheme, RunState, DEFAULT_MODEL_TAG};

    type Outbound = tokio::sync::mpsc::UnboundedReceiver<crate::router::OutboundMessage>;

    fn events() -> (DriverEvents, Outbound, RunState) {
        let run_state = RunState::new();
        let (router, rx) = EventRouter::new(
            AddressScheme::new(None, DEFAULT_MODEL_TAG),
            run_state.clone(),
        );
        let events = DriverEvents::new(
            Arc::new(router),
            Arc::new(ErrorClassifier::new(run_state.clone())),
        );
        (events, rx, run_state)
    }

    #[test]
    fn test_input_changes_are_routed() {
        let (events, mut rx, _) = events();
        events.on_state_change(ChannelKey::input(7), Some(true));
        events.on_state_change(ChannelKey::output(7), Some(true));

        let msg = rx.try_recv().unwrap();
        assert_eq!((msg.address.as_str(), msg.value), ("/phidget1012/7", 1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_busy_error_stops_and_silences() {
        let (events, mut rx, run_state) = events();
        events.on_error(ChannelKey::input(3), ErrorEventCode::Busy, "busy");
        assert!(!run_state.is_running());

        events.on_state_change(ChannelKey::input(0), Some(true));
        assert!(rx.try_recv().is_err());
    }
}
