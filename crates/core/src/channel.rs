//! Channel trait: the abstraction over chat transports.
//!
//! A Channel connects Switchboard to a messaging surface (WhatsApp bridge,
//! browser WebSocket, terminal). It yields authorized inbound [`Message`]s and
//! delivers replies.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChannelError;
use crate::message::Message;

/// Stream of inbound messages produced by [`Channel::listen`].
pub type MessageStream = mpsc::Receiver<Result<Message, ChannelError>>;

/// The core Channel trait.
///
/// Authorization is the channel's job: `listen` only yields messages from
/// senders for which `is_authorized` holds. The stream ends when the
/// transport goes away; restart it by reconnecting.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name (e.g., "whatsapp", "web", "cli"). Also the context-store key.
    fn name(&self) -> &str;

    /// Establish the transport.
    async fn connect(&self) -> Result<(), ChannelError>;

    /// Tear the transport down.
    async fn disconnect(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Start yielding inbound messages.
    async fn listen(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver an outbound message.
    async fn send(&self, message: &Message) -> Result<(), ChannelError>;

    /// Check if a sender may talk to the agent.
    async fn is_authorized(&self, sender_id: &str) -> bool;

    /// Whether this channel supplies `session_id` metadata that should reset
    /// conversation context when it changes.
    fn tracks_sessions(&self) -> bool {
        false
    }
}
