//! HTTP and websocket surface over the session registry.
//!
//! - `GET /status`: current snapshot as JSON
//! - `POST /hook`: hook payload from an agent plugin
//! - `GET /ws`: realtime channel; pushes `{"type":"state",...}` on join and
//!   after every registry mutation, answers `ping` with `pong`

use crate::config::ServerConfig;
use crate::hub::BroadcastHub;
use crate::registry::SessionRegistry;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webblock_core::{
    decode, encode, BlockerError, BlockerResult, ClientMessage, HookPayload, ServerMessage,
    Snapshot,
};

/// The webblock server instance.
pub struct WebBlockServer {
    config: ServerConfig,
    registry: SessionRegistry,
}

impl WebBlockServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = SessionRegistry::new(config.registry_config(), BroadcastHub::new());
        Self { config, registry }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Routes, with permissive CORS headers so browser extensions can call them.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/status", get(status).options(preflight))
            .route("/hook", axum::routing::post(hook).options(preflight))
            .route("/ws", get(ws_upgrade))
            .fallback(not_found)
            .layer(middleware::map_response(add_cors_headers))
            .with_state(self.registry.clone())
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> BlockerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BlockerError::Transport(format!("bind {addr} failed: {e}")))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> BlockerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.registry.start_reaper();
        let local = listener.local_addr()?;
        info!(
            addr = %local,
            watched_tools = ?self.config.watched_tools,
            "webblock-server ready"
        );

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        self.registry.shutdown();
        result.map_err(BlockerError::from)
    }
}

async fn add_cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

async fn status(State(registry): State<SessionRegistry>) -> Json<Snapshot> {
    Json(registry.snapshot().await)
}

/// Malformed bodies are rejected by the `Json` extractor before this runs.
async fn hook(
    State(registry): State<SessionRegistry>,
    Json(payload): Json<HookPayload>,
) -> &'static str {
    registry.handle_payload(&payload).await;
    "OK"
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(registry): State<SessionRegistry>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(registry, socket))
}

/// Serve one realtime subscriber.
///
/// Socket writes happen on a dedicated task fed by the hub subscription and
/// a reply queue, so neither the registry nor the reader waits on the socket.
async fn handle_socket(registry: SessionRegistry, socket: WebSocket) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut subscription = registry.subscribe().await;
    let subscriber = subscription.id();
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMessage>(16);
    info!(subscriber, "extension connected");

    let write_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                Some(snapshot) = subscription.recv() => ServerMessage::State(snapshot),
                Some(reply) = reply_rx.recv() => reply,
                else => break,
            };
            let text = match encode(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!(subscriber, error = %e, "failed to encode message");
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(Message::Text(text)).await {
                debug!(subscriber, error = %e, "websocket send failed");
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                debug!(subscriber, error = %e, "websocket read error");
                break;
            }
        };
        match msg {
            Message::Text(text) => match decode::<ClientMessage>(&text) {
                Ok(ClientMessage::Ping) => {
                    let _ = reply_tx.try_send(ServerMessage::Pong);
                }
                Err(e) => {
                    debug!(subscriber, error = %e, "ignoring malformed message");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    registry.unsubscribe(subscriber);
    write_task.abort();
    info!(subscriber, "extension disconnected");
}
