//! Status server setup and routing

use anyhow::Result;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::state::StatusState;

/// Build the read-only status router
pub fn router(state: Arc<StatusState>) -> Router {
    Router::new()
        .route("/api/status", get(api::get_status))
        .route("/api/channels", get(api::list_channels))
        .route("/api/channels/{direction}/{index}", get(api::get_channel))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the status server until the task is dropped
pub async fn run(state: Arc<StatusState>, bind: SocketAddr) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting status server");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Phase;
    use oscbank_core::{AddressScheme, RunState, DEFAULT_MODEL_TAG};
    use oscbank_hw::{ChannelListener, ChannelRegistry, SimulatedBank};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::watch;

    struct Silent;
    impl ChannelListener for Silent {}

    #[tokio::test]
    async fn test_serves_status_over_http() {
        let bank = SimulatedBank::new(498255, 2);
        let registry = ChannelRegistry::configure(&bank, None, 2, Arc::new(Silent)).unwrap();
        let (_phase, rx) = watch::channel(Phase::Serving);
        let state = StatusState::new(
            Arc::new(registry),
            AddressScheme::new(None, DEFAULT_MODEL_TAG),
            RunState::new(),
            rx,
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move { axum::serve(listener, router(state)).await });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /api/status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        tokio::time::timeout(Duration::from_secs(2), stream.read_to_string(&mut response))
            .await
            .unwrap()
            .unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"scope\":\"phidget1012\""));
        assert!(response.contains("/phidget1012/1"));

        task.abort();
    }
}
