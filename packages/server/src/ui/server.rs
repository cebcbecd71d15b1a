//! Server execution logic.

use std::{future::Future, sync::Arc};

use agora_shared::time::Clock;
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{config::ConnectionConfig, domain::MessageStore, hub::HubHandle};

use super::{
    handler::{get_history, get_room_detail, get_rooms, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// WebSocket relay server
///
/// Owns the HTTP surface only; rooms and delivery belong to the hub behind
/// `hub`. Stopping the server stops the hub, which closes every connection.
///
/// # Example
///
/// ```ignore
/// let (hub, hub_task) = Hub::spawn(HubConfig::default(), clock.clone());
/// let server = Server::new(hub, store, clock, ConnectionConfig::default());
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(
        hub: HubHandle,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
        connection_config: ConnectionConfig,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                hub,
                store,
                clock,
                connection_config,
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/rooms", get(get_rooms))
            .route("/api/rooms/{room_id}", get(get_room_detail))
            .route("/api/messages", get(get_history))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind to `host:port` and serve until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Connect to: ws://{}/ws?username=<name>&room=<room>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `signal` resolves, then stop
    /// the hub so open connections are closed.
    pub async fn serve<F>(
        self,
        listener: TcpListener,
        signal: F,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let hub = self.state.hub.clone();

        tracing::info!("Relay server listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.await;
                hub.stop();
            })
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
