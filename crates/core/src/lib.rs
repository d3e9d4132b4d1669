//! # Switchboard Core
//!
//! Domain types, traits, and error definitions for the Switchboard support agent.
//! This crate defines the message model and the seams (model, tool, channel,
//! transcriber) that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is a trait here. Implementations live in their
//! respective crates, so tests can swap in scripted stubs and the dependency
//! graph points inward on core.

pub mod channel;
pub mod error;
pub mod message;
pub mod model;
pub mod tool;
pub mod transcriber;

// Re-export key types at crate root for ergonomics
pub use channel::{Channel, MessageStream};
pub use error::{ChannelError, Error, ModelError, Result, ToolError, TranscriptionError};
pub use message::{AGENT_SENDER_ID, Message, MessageContent, MessageKind, meta};
pub use model::{ChatRole, ChatTurn, Model, ModelReply, ToolInvocation};
pub use tool::{ArgKind, ArgSchema, ArgSpec, FnTool, Tool, ToolRegistry, ToolResult, ToolSchema, tool_fn};
pub use transcriber::Transcriber;
