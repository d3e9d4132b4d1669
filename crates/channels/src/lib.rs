//! Chat channel implementations for Switchboard.
//!
//! Each channel connects to a messaging surface and relays messages to and
//! from the agent through the [`switchboard_core::Channel`] trait.
//!
//! - **CLI**: interactive terminal chat (stdin/stdout)
//! - **Web**: browser chat over an axum WebSocket server
//! - **WhatsApp**: bridge service over WebSocket + HTTP, whitelist-gated

pub mod cli;
pub mod web;
pub mod whatsapp;

pub use cli::CliChannel;
pub use web::WebChannel;
pub use whatsapp::{WhatsAppChannel, parse_bridge_frame};
