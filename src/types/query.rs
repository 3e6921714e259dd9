//! Inbound question plus prior conversation.

use serde::{Deserialize, Serialize};

use super::Message;

/// A user question with optional conversation history.
///
/// History is ordered oldest first. A `Query` is never mutated after it
/// is handed to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Message>,
}

impl Query {
    /// Create a query without history.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            history: Vec::new(),
        }
    }

    /// Attach prior conversation turns (oldest first).
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}
