//! Web channel: browser chat over WebSocket.
//!
//! Serves `GET /health` and `GET /ws` with axum. Every socket is a new
//! session with its own user id, so a page refresh starts a fresh
//! conversation. Replies are routed back by the `connection_id` metadata
//! stamped on inbound messages.

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use switchboard_config::WebConfig;
use switchboard_core::{Channel, ChannelError, Message, MessageStream, meta};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const WELCOME: &str = "Connected to Support Agent. How can I help you?";

/// State shared between the channel and the HTTP handlers.
struct Shared {
    inbound: Mutex<mpsc::Sender<Result<Message, ChannelError>>>,
    pending: Mutex<Option<MessageStream>>,
    /// connection id -> outbound frame queue
    connections: Mutex<HashMap<String, mpsc::Sender<String>>>,
}

/// Web channel adapter: bridges browser WebSocket clients to the agent.
pub struct WebChannel {
    config: WebConfig,
    shared: Arc<Shared>,
    server: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

#[derive(Deserialize)]
struct ClientFrame {
    #[serde(default)]
    message: String,
    #[serde(default)]
    username: Option<String>,
}

impl WebChannel {
    pub fn new(config: WebConfig) -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            config,
            shared: Arc::new(Shared {
                inbound: Mutex::new(tx),
                pending: Mutex::new(Some(rx)),
                connections: Mutex::new(HashMap::new()),
            }),
            server: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// The axum router serving this channel.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .with_state(self.shared.clone())
    }

    /// Address the server is bound to, once connected.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Number of open browser sockets.
    pub async fn active_connections(&self) -> usize {
        self.shared.connections.lock().await.len()
    }
}

async fn health_handler(State(shared): State<Arc<Shared>>) -> impl IntoResponse {
    let connections = shared.connections.lock().await.len();
    Json(json!({ "status": "ok", "connections": connections }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(shared): State<Arc<Shared>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, shared))
}

async fn handle_socket(socket: WebSocket, shared: Arc<Shared>) {
    let connection_id = Uuid::new_v4().to_string();
    let session_id = Uuid::new_v4().to_string();
    let user_id = format!("web_{}", &session_id[..8]);
    info!(user = %user_id, session = %session_id, "Web client connected");

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    shared
        .connections
        .lock()
        .await
        .insert(connection_id.clone(), out_tx.clone());

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let welcome = json!({
        "type": "system",
        "message": WELCOME,
        "user_id": user_id,
        "session_id": session_id,
    });
    let _ = out_tx.send(welcome.to_string()).await;

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue, // binary, ping, pong
            Err(e) => {
                debug!(user = %user_id, error = %e, "WebSocket receive error");
                break;
            }
        };

        let client: ClientFrame = match serde_json::from_str(&text) {
            Ok(c) => c,
            Err(e) => {
                let err = json!({ "type": "error", "message": format!("Invalid message: {e}") });
                let _ = out_tx.send(err.to_string()).await;
                continue;
            }
        };

        let message = Message::text(&user_id, client.message)
            .with_channel("web")
            .with_sender_name(client.username.unwrap_or_else(|| "User".into()))
            .with_metadata(meta::CONNECTION_ID, connection_id.as_str())
            .with_metadata(meta::SESSION_ID, session_id.as_str());

        let inbound = shared.inbound.lock().await.clone();
        if inbound.send(Ok(message)).await.is_err() {
            warn!(user = %user_id, "No listener for web messages, dropping");
        }
    }

    shared.connections.lock().await.remove(&connection_id);
    writer.abort();
    info!(user = %user_id, "Web client disconnected");
}

#[async_trait]
impl Channel for WebChannel {
    fn name(&self) -> &str {
        "web"
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ChannelError::NotConfigured(format!("cannot bind {addr}: {e}")))?;
        let bound = listener
            .local_addr()
            .map_err(|e| ChannelError::NotConfigured(e.to_string()))?;
        *self.local_addr.lock().await = Some(bound);

        let router = self.router();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "Web server stopped");
            }
        });
        if let Some(previous) = self.server.lock().await.replace(handle) {
            previous.abort();
        }
        info!(addr = %bound, "Web channel listening");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChannelError> {
        if let Some(handle) = self.server.lock().await.take() {
            handle.abort();
        }
        // Dropping the queues ends each socket's writer task.
        self.shared.connections.lock().await.clear();
        info!("Web channel stopped");
        Ok(())
    }

    async fn listen(&self) -> Result<MessageStream, ChannelError> {
        if let Some(rx) = self.shared.pending.lock().await.take() {
            return Ok(rx);
        }
        let (tx, rx) = mpsc::channel(64);
        *self.shared.inbound.lock().await = tx;
        Ok(rx)
    }

    async fn send(&self, message: &Message) -> Result<(), ChannelError> {
        let frame = json!({
            "type": "message",
            "message": message.content.to_string(),
            "sender": "agent",
            "timestamp": message.timestamp.to_rfc3339(),
        })
        .to_string();

        // Senders are cloned out so a full queue never blocks the map.
        let closed = |id: &str| ChannelError::DeliveryFailed {
            channel: "web".into(),
            reason: format!("connection {id} closed"),
        };
        match message.meta_str(meta::CONNECTION_ID) {
            Some(id) => {
                let tx = self
                    .shared
                    .connections
                    .lock()
                    .await
                    .get(id)
                    .cloned()
                    .ok_or_else(|| closed(id))?;
                tx.send(frame).await.map_err(|_| closed(id))
            }
            None => {
                let targets: Vec<_> = self.shared.connections.lock().await.values().cloned().collect();
                debug!(count = targets.len(), "Broadcasting to all web clients");
                for tx in targets {
                    let _ = tx.send(frame.clone()).await;
                }
                Ok(())
            }
        }
    }

    async fn is_authorized(&self, _sender_id: &str) -> bool {
        true
    }

    fn tracks_sessions(&self) -> bool {
        true
    }
}
