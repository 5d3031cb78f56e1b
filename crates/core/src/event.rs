//! Domain event system: observe a reasoning session without coupling to it.
//!
//! The graph publishes an event at each transition of the loop. Anything
//! interested (a CLI progress line, a transcript recorder) subscribes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::state::{TerminationReason, Verdict};

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A session began
    SessionStarted {
        session_id: String,
        query_preview: String,
        max_rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// A candidate was appended as a new round
    RoundStarted {
        session_id: String,
        round: usize,
        candidate_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The critic judged the open round
    CritiqueRecorded {
        session_id: String,
        round: usize,
        verdict: Verdict,
        confidence: f32,
        timestamp: DateTime<Utc>,
    },

    /// An agent call failed and will be retried
    AgentRetried {
        session_id: String,
        agent: String,
        attempt: u32,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A session reached a terminal state
    SessionTerminated {
        session_id: String,
        reason: TerminationReason,
        rounds: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Truncate `text` to at most `max` chars for event previews.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
