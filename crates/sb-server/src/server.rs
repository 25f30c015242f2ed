//! WebSocket front end
//!
//! One `/ws/console` connection per operator console. Each connection gets
//! a uuid id, a writer task pumping its hub queue into the socket, and a
//! read loop feeding parsed messages to the orchestrator. Malformed JSON
//! earns an error message; only transport failure tears the connection down.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use sb_core::ConnectionId;
use sb_protocol::{ClientMessage, ErrorCode, ServerMessage};

use crate::hub::DeliveryPolicy;
use crate::orchestrator::RemoteTaskOrchestrator;
use crate::state::ServerState;

/// Per-connection outbound queue depth
const MESSAGE_QUEUE_CAPACITY: usize = 256;

const HEALTH_EVENT_CAPACITY: usize = 32;

/// Shared application state passed to axum handlers
#[derive(Clone)]
pub struct AppState {
    pub state: Arc<ServerState>,
    pub orchestrator: Arc<RemoteTaskOrchestrator>,
}

/// Build the axum router with all routes
pub fn build_router(app: AppState) -> Router {
    Router::new()
        .route("/ws/console", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(app)
}

/// Start the daemon: health monitor, its broadcast bridge, and the
/// listener. Returns a handle that keeps the background tasks alive.
pub async fn start(state: Arc<ServerState>) -> Result<ServerHandle> {
    let orchestrator = Arc::new(RemoteTaskOrchestrator::new(Arc::clone(&state)));

    // Health transitions flow through this channel into the hub, keeping
    // the monitor loop unaware of the transport.
    let (health_tx, mut health_rx) = mpsc::channel(HEALTH_EVENT_CAPACITY);
    state
        .monitor
        .start(health_tx)
        .await
        .context("failed to start health monitor")?;

    let bridge_state = Arc::clone(&state);
    let health_bridge = tokio::spawn(async move {
        while let Some(event) = health_rx.recv().await {
            let message = ServerMessage::ServerHealth {
                server_name: event.target_name,
                is_healthy: event.is_healthy,
                status: event.snapshot,
            };
            let _ = bridge_state
                .hub
                .broadcast(&message, None, DeliveryPolicy::BestEffort)
                .await;
        }
    });

    let app = AppState {
        state: Arc::clone(&state),
        orchestrator,
    };
    let router = build_router(app);

    let listener = tokio::net::TcpListener::bind(&state.config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", state.config.bind_address))?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, targets = state.registry.len(), "shellbridge server started");

    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        addr,
        _server: server,
        _health_bridge: health_bridge,
    })
}

/// Handle returned by [`start`], keeping background tasks alive
pub struct ServerHandle {
    pub addr: std::net::SocketAddr,
    _server: tokio::task::JoinHandle<()>,
    _health_bridge: tokio::task::JoinHandle<()>,
}

async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

async fn handle_socket(socket: WebSocket, app: AppState) {
    let conn = ConnectionId::generate();
    let (tx, mut rx) = mpsc::channel::<String>(MESSAGE_QUEUE_CAPACITY);
    app.orchestrator.on_connect(&conn, tx).await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_conn = conn.clone();
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::Text(text)).await.is_err() {
                tracing::debug!(connection = %writer_conn, "socket write failed");
                break;
            }
        }
    });

    while let Some(received) = ws_rx.next().await {
        match received {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => app.orchestrator.handle(&conn, message).await,
                Err(e) => {
                    tracing::debug!(connection = %conn, error = %e, "malformed request");
                    app.state
                        .hub
                        .send_one(
                            &conn,
                            &ServerMessage::error(
                                ErrorCode::InvalidRequest,
                                "Malformed request",
                                Some(e.to_string()),
                            ),
                        )
                        .await;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection = %conn, error = %e, "socket read failed");
                break;
            }
        }
    }

    app.orchestrator.on_disconnect(&conn).await;
    // Unregistering dropped the hub sender, so the writer drains and exits
    let _ = writer.await;
}

/// Health snapshot over plain HTTP, for probes that do not speak WebSocket
async fn health_handler(State(app): State<AppState>) -> impl IntoResponse {
    axum::Json(app.state.monitor.snapshot())
}
