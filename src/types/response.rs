//! Answer and streaming event types

use std::pin::Pin;

use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Buffered answer returned by [`chat`](crate::ChatOrchestrator::chat).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub content: String,
    /// Whether the answer was served from the cache tier.
    #[serde(default)]
    pub cached: bool,
    /// Source ids of the passages used as context (empty on cache hits).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

/// Events emitted during streaming.
///
/// A well-formed stream is zero or more `Content` items followed by
/// exactly one `Done`. A stream that aborts instead ends with an `Err`
/// item and never yields `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Text content chunk
    Content(String),

    /// Stream complete
    Done,
}

/// Boxed stream of chat events.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>;
