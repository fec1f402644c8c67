//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use oscbank_core::{Channel, DeviceSerial, Direction};
use serde::Serialize;
use std::sync::Arc;

use crate::lifecycle::Phase;
use crate::state::StatusState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub phase: Phase,
    pub running: bool,
    pub scope: String,
    pub device_serial: Option<DeviceSerial>,
    /// Channels per bank
    pub channels: usize,
    pub addresses: Vec<String>,
}

fn status(state: &StatusState) -> StatusResponse {
    StatusResponse {
        phase: state.phase(),
        running: state.run_state.is_running(),
        scope: state.scheme.scope(),
        device_serial: state.scheme.device_serial(),
        channels: state.registry.len(),
        addresses: state
            .scheme
            .addresses(state.registry.len())
            .map(|(_, address)| address)
            .collect(),
    }
}

/// Bridge phase and address layout
pub async fn get_status(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    Json(status(&state))
}

/// Cached records of every channel, inputs first
pub async fn list_channels(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    Json(state.registry.snapshot())
}

fn find_channel(state: &StatusState, direction: &str, index: usize) -> Option<Channel> {
    let direction = match direction {
        "input" | "inputs" => Direction::Input,
        "output" | "outputs" => Direction::Output,
        _ => return None,
    };
    state
        .registry
        .bank(direction)
        .get(index)
        .map(|entry| entry.info())
}

/// One channel by direction and index
pub async fn get_channel(
    State(state): State<Arc<StatusState>>,
    Path((direction, index)): Path<(String, usize)>,
) -> impl IntoResponse {
    match find_channel(&state, &direction, index) {
        Some(channel) => Json(channel).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiError::new("Channel not found")),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oscbank_core::{AddressScheme, RunState, DEFAULT_MODEL_TAG};
    use oscbank_hw::{ChannelListener, ChannelRegistry, SimulatedBank};
    use std::time::Duration;
    use tokio::sync::watch;

    struct Silent;
    impl ChannelListener for Silent {}

    fn status_state(
        bank: &SimulatedBank,
        serial: Option<DeviceSerial>,
    ) -> (Arc<StatusState>, watch::Sender<Phase>) {
        let registry = ChannelRegistry::configure(bank, serial, 4, Arc::new(Silent)).unwrap();
        let (tx, rx) = watch::channel(Phase::Serving);
        let state = StatusState::new(
            Arc::new(registry),
            AddressScheme::new(serial, DEFAULT_MODEL_TAG),
            RunState::new(),
            rx,
        );
        (state, tx)
    }

    #[tokio::test]
    async fn test_status_reports_layout() {
        let bank = SimulatedBank::new(498255, 4);
        let (state, phase) = status_state(&bank, Some(DeviceSerial(498255)));

        let body = serde_json::to_value(status(&state)).unwrap();
        assert_eq!(body["phase"], "serving");
        assert_eq!(body["running"], true);
        assert_eq!(body["scope"], "498255");
        assert_eq!(body["device_serial"], 498255);
        assert_eq!(body["channels"], 4);
        assert_eq!(body["addresses"][3], "/498255/3");

        phase.send_replace(Phase::Stopping);
        state.run_state.request_stop();
        let body = serde_json::to_value(status(&state)).unwrap();
        assert_eq!(body["phase"], "stopping");
        assert_eq!(body["running"], false);

        let response = get_status(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_channel_lookup() {
        let bank = SimulatedBank::new(498255, 4);
        let (state, _phase) = status_state(&bank, None);
        let output = state.registry.output(2).unwrap().clone();
        output.open(Duration::from_millis(10)).unwrap();
        output.set_state(true).unwrap();

        let channel = find_channel(&state, "output", 2).unwrap();
        assert!(channel.attached);
        assert!(channel.state);
        assert!(channel.last_change.is_some());
        assert!(find_channel(&state, "input", 4).is_none());
        assert!(find_channel(&state, "sideways", 0).is_none());

        let missing = get_channel(State(state.clone()), Path(("input".to_string(), 9)))
            .await
            .into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let snapshot = state.registry.snapshot();
        assert_eq!(snapshot.len(), 8);
        assert_eq!(snapshot[0].direction, Direction::Input);
        assert_eq!(snapshot[6].index, 2);
    }
}
