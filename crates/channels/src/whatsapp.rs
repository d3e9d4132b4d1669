//! WhatsApp channel via an HTTP/WebSocket bridge service.
//!
//! The bridge pushes inbound events on `{bridge}/ws/messages` and accepts
//! outbound text on `POST {bridge}/api/send`. Only whitelisted contacts get
//! through to the agent.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{Channel, ChannelError, Message, MessageContent, MessageKind, MessageStream, meta};
use switchboard_security::ContactWhitelist;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

type BridgeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event envelope pushed by the bridge.
#[derive(Debug, Deserialize)]
struct BridgeEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Inbound message payload from the bridge.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeMessage {
    #[serde(default)]
    id: Option<String>,
    from: String,
    #[serde(default)]
    from_name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    is_group: bool,
    #[serde(default = "default_message_type")]
    message_type: String,
    #[serde(default)]
    voice_data: Option<String>,
}

fn default_message_type() -> String {
    "text".into()
}

/// Turn one bridge frame into a message. Non-message events yield `Ok(None)`.
pub fn parse_bridge_frame(raw: &str) -> Result<Option<Message>, ChannelError> {
    let event: BridgeEvent =
        serde_json::from_str(raw).map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;

    match event.kind.as_str() {
        "message" => {}
        "status" => {
            info!(status = %event.data, "WhatsApp bridge status");
            return Ok(None);
        }
        other => {
            debug!(kind = other, "Ignoring bridge event");
            return Ok(None);
        }
    }

    let data: BridgeMessage =
        serde_json::from_value(event.data).map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;
    let kind = MessageKind::from_wire(&data.message_type);

    let content = match (&kind, data.voice_data.as_deref()) {
        (MessageKind::Voice, Some(b64)) if !b64.is_empty() => MessageContent::Binary(
            BASE64
                .decode(b64)
                .map_err(|e| ChannelError::InvalidPayload(format!("voiceData: {e}")))?,
        ),
        _ => MessageContent::Text(data.body.unwrap_or_default()),
    };

    let mut message = Message::new(&data.from, content, kind)
        .with_channel("whatsapp")
        .with_metadata(meta::MESSAGE_TYPE, data.message_type.as_str());
    if let Some(id) = data.id.filter(|id| !id.is_empty()) {
        message = message.with_id(id);
    }
    if let Some(name) = data.from_name {
        message = message.with_sender_name(name);
    }
    if data.is_group {
        message = message.with_group(Some(data.from.clone()));
    }
    Ok(Some(message))
}

/// WhatsApp channel adapter.
pub struct WhatsAppChannel {
    bridge_url: String,
    whitelist: Arc<ContactWhitelist>,
    client: reqwest::Client,
    socket: Mutex<Option<BridgeSocket>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WhatsAppChannel {
    pub fn new(bridge_url: impl Into<String>, whitelist: Arc<ContactWhitelist>) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ChannelError::NotConfigured(format!("HTTP client: {e}")))?;
        Ok(Self {
            bridge_url: bridge_url.into().trim_end_matches('/').to_string(),
            whitelist,
            client,
            socket: Mutex::new(None),
            reader: Mutex::new(None),
        })
    }

    fn ws_url(&self) -> String {
        let base = if let Some(rest) = self.bridge_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.bridge_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.bridge_url.clone()
        };
        format!("{base}/ws/messages")
    }

    async fn get_json(&self, path: &str) -> Result<Value, ChannelError> {
        let url = format!("{}{path}", self.bridge_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))
    }

    /// Bridge connection status as reported by `GET /api/status`.
    pub async fn status(&self) -> Result<Value, ChannelError> {
        self.get_json("/api/status").await
    }

    /// Pairing QR code from `GET /api/qr`, if the bridge is waiting for one.
    pub async fn qr_code(&self) -> Result<Option<String>, ChannelError> {
        let body = self.get_json("/api/qr").await?;
        Ok(body.get("qr").and_then(Value::as_str).map(str::to_string))
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        let url = self.ws_url();
        info!(url = %url, "Connecting to WhatsApp bridge");
        let (socket, _) = connect_async(&url)
            .await
            .map_err(|e| ChannelError::ConnectionLost(format!("{url}: {e}")))?;
        *self.socket.lock().await = Some(socket);
        info!("Connected to WhatsApp bridge");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChannelError> {
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        if let Some(mut socket) = self.socket.lock().await.take() {
            let _ = socket.close(None).await;
        }
        info!("Disconnected from WhatsApp bridge");
        Ok(())
    }

    async fn listen(&self) -> Result<MessageStream, ChannelError> {
        let mut socket = self
            .socket
            .lock()
            .await
            .take()
            .ok_or_else(|| ChannelError::NotConnected("call connect() first".into()))?;

        let (tx, rx) = mpsc::channel(64);
        let whitelist = self.whitelist.clone();

        let handle = tokio::spawn(async move {
            while let Some(frame) = socket.next().await {
                let text = match frame {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                };

                let message = match parse_bridge_frame(&text) {
                    Ok(Some(m)) => m,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed bridge frame");
                        continue;
                    }
                };

                if !whitelist.is_whitelisted(&message.sender_id) {
                    warn!(
                        sender = %message.sender_id,
                        "Message from non-whitelisted contact; add it with `switchboard contacts add`"
                    );
                    continue;
                }

                if tx.send(Ok(message)).await.is_err() {
                    break;
                }
            }
            debug!("WhatsApp bridge stream ended");
        });

        if let Some(previous) = self.reader.lock().await.replace(handle) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn send(&self, message: &Message) -> Result<(), ChannelError> {
        let recipient = message
            .meta_str(meta::RECIPIENT)
            .unwrap_or(&message.sender_id);
        let payload = json!({ "to": recipient, "text": message.content.to_string() });
        let url = format!("{}/api/send", self.bridge_url);

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: "whatsapp".into(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::DeliveryFailed {
                channel: "whatsapp".into(),
                reason: format!("HTTP {status}: {body}"),
            });
        }
        info!(to = %recipient, "Message sent");
        Ok(())
    }

    async fn is_authorized(&self, sender_id: &str) -> bool {
        self.whitelist.is_whitelisted(sender_id)
    }
}
