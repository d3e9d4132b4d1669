//! Security module for Switchboard: who may talk to the agent.
//!
//! Provides:
//! - **Contact whitelist**: normalized sender ids persisted as YAML, with
//!   phone numbers matched with or without a leading `+`

pub mod whitelist;

pub use whitelist::{ContactWhitelist, WhitelistError, normalize_contact};
