//! Conversation context: bounded per-(channel, user) history with idle
//! timeout and session-boundary resets.

pub mod clock;
pub mod conversation;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use conversation::{ConversationContext, Turn};
pub use store::{ContextGuard, ContextKey, ContextStore, SessionPolicy};
