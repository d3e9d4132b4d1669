//! The support agent core for Switchboard.
//!
//! An inbound [`Message`](switchboard_core::Message) is answered by:
//!
//! 1. **Resolving context** for its `(channel, sender)` pair
//! 2. **Asking the model**, which may request tools
//! 3. **Running tools** and feeding results back, up to a fixed number of rounds
//! 4. **Replying** on the same channel with the routing metadata preserved
//!
//! [`runner::serve`] connects a channel to the agent.

pub mod context;
pub mod orchestrator;
pub mod prompt;
pub mod runner;

pub use context::{Clock, ContextStore, ConversationContext, ManualClock, SessionPolicy, SystemClock};
pub use orchestrator::{APOLOGY, FALLBACK_ANSWER, SupportAgent, SupportAgentBuilder, VOICE_UNSUPPORTED};
pub use prompt::{SystemPrompt, load_knowledge};
pub use runner::serve;
