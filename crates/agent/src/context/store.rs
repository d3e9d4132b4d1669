//! Conversation context store keyed by `(channel, user)`.
//!
//! The outer map lock is only held to look up or insert an entry. Each entry
//! has its own async mutex, held by the caller for the whole of one message,
//! so turns from the same user are applied in order while other users
//! proceed independently.

use chrono::TimeDelta;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::conversation::ConversationContext;

/// Exclusive access to one context for the duration of a message.
pub type ContextGuard = OwnedMutexGuard<ConversationContext>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub channel: String,
    pub user_id: String,
}

impl ContextKey {
    pub fn new(channel: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            user_id: user_id.into(),
        }
    }
}

impl std::fmt::Display for ContextKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.channel, self.user_id)
    }
}

/// Whether a channel's `session_id` metadata resets context when it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPolicy {
    Tracked,
    #[default]
    Ignored,
}

pub struct ContextStore {
    contexts: Mutex<HashMap<ContextKey, Arc<AsyncMutex<ConversationContext>>>>,
    policies: RwLock<HashMap<String, SessionPolicy>>,
    timeout: TimeDelta,
    max_pairs: usize,
    clock: Arc<dyn Clock>,
}

impl ContextStore {
    pub fn new(timeout: TimeDelta, max_pairs: usize) -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            policies: RwLock::new(HashMap::new()),
            timeout,
            max_pairs,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Opt `channel` into session-boundary resets.
    pub fn track_sessions_for(&self, channel: &str) {
        self.policies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.to_string(), SessionPolicy::Tracked);
        info!(channel, "Session tracking enabled");
    }

    pub fn session_policy(&self, channel: &str) -> SessionPolicy {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .copied()
            .unwrap_or_default()
    }

    fn entry(&self, key: &ContextKey, session_id: Option<&str>) -> (Arc<AsyncMutex<ConversationContext>>, bool) {
        let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = contexts.get(key) {
            return (existing.clone(), false);
        }
        let ctx = ConversationContext::new(&key.user_id, session_id.map(str::to_string), self.max_pairs);
        let entry = Arc::new(AsyncMutex::new(ctx));
        contexts.insert(key.clone(), entry.clone());
        (entry, true)
    }

    /// Fetch or create the context for `(channel, user_id)` and lock it.
    ///
    /// An existing context is cleared when the channel tracks sessions and
    /// `session_id` differs from the stored one, or when it has been idle
    /// longer than the timeout.
    pub async fn get_or_create(&self, channel: &str, user_id: &str, session_id: Option<&str>) -> ContextGuard {
        let key = ContextKey::new(channel, user_id);
        let tracked = self.session_policy(channel) == SessionPolicy::Tracked;
        let session_id = session_id.filter(|_| tracked);

        let (entry, created) = self.entry(&key, session_id);
        let mut ctx = entry.lock_owned().await;
        if created {
            info!(context = %key, "Created new context");
            return ctx;
        }

        if let Some(sid) = session_id {
            if ctx.session_id.as_deref() != Some(sid) {
                info!(context = %key, "Session changed, clearing history");
                ctx.clear();
                ctx.session_id = Some(sid.to_string());
                return ctx;
            }
        }

        let now = self.clock.now();
        if ctx.is_expired(now, self.timeout) {
            let idle_minutes = ctx
                .last_activity
                .map(|last| (now - last).num_seconds() as f64 / 60.0)
                .unwrap_or_default();
            info!(context = %key, idle_minutes, "Idle timeout, clearing history");
            ctx.clear();
        }
        ctx
    }

    /// Empty one context's history. Returns whether it existed.
    pub async fn clear(&self, channel: &str, user_id: &str) -> bool {
        let key = ContextKey::new(channel, user_id);
        let entry = self
            .contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        match entry {
            Some(entry) => {
                entry.lock().await.clear();
                debug!(context = %key, "Cleared context");
                true
            }
            None => false,
        }
    }

    /// Number of known contexts.
    pub fn len(&self) -> usize {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("contexts", &self.len())
            .field("timeout", &self.timeout)
            .field("max_pairs", &self.max_pairs)
            .finish()
    }
}
