//! Per-(channel, user) rolling conversation history.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use switchboard_core::{ChatRole, ChatTurn};

/// One recorded turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded history for one user on one channel.
///
/// Holds at most `2 * max_pairs` turns; the oldest are dropped first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub user_id: String,
    pub session_id: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
    history: VecDeque<Turn>,
    max_pairs: usize,
}

impl ConversationContext {
    pub fn new(user_id: impl Into<String>, session_id: Option<String>, max_pairs: usize) -> Self {
        Self {
            user_id: user_id.into(),
            session_id,
            last_activity: None,
            history: VecDeque::new(),
            max_pairs,
        }
    }

    fn capacity(&self) -> usize {
        self.max_pairs.saturating_mul(2)
    }

    /// Append a turn, bump `last_activity` and trim from the front.
    pub fn add_turn(&mut self, role: ChatRole, content: impl Into<String>, timestamp: DateTime<Utc>) {
        self.history.push_back(Turn {
            role,
            content: content.into(),
            timestamp,
        });
        self.last_activity = Some(timestamp);
        while self.history.len() > self.capacity() {
            self.history.pop_front();
        }
    }

    /// History as the model sees it: roles and content, oldest first.
    pub fn export_for_model(&self) -> Vec<ChatTurn> {
        self.history
            .iter()
            .map(|t| ChatTurn {
                role: t.role,
                content: t.content.clone(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.last_activity = None;
    }

    /// More than `timeout` has passed since the last turn.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: TimeDelta) -> bool {
        self.last_activity.is_some_and(|last| now - last > timeout)
    }

    pub fn history(&self) -> impl Iterator<Item = &Turn> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
