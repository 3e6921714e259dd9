//! Retrieved context passages.

use serde::{Deserialize, Serialize};

/// A snippet returned by similarity search, with its relevance score.
///
/// Produced fresh for every query and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Passage text (the answer half of a Q/A pair for profile corpora).
    pub text: String,
    /// Relevance in `0.0..=1.0`, higher is more relevant.
    pub score: f32,
    /// Identifier of the source document.
    pub source_id: String,
    /// Question this passage answers, when the corpus records one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

impl RetrievedPassage {
    pub fn new(text: impl Into<String>, score: f32, source_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score,
            source_id: source_id.into(),
            question: None,
        }
    }

    /// Attach the originating question.
    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    /// Render the passage as it appears in the context block.
    pub fn render(&self) -> String {
        match &self.question {
            Some(q) => format!("Q: {q}\nA: {}", self.text),
            None => self.text.clone(),
        }
    }
}
