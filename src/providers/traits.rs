//! Traits for the external collaborators the pipeline consumes.
//!
//! Each collaborator gets its own small trait rather than one "god
//! trait", so tests can swap in call-counting mocks and the components
//! can wrap them with timeouts and retry:
//!
//! - [`SimilaritySearch`] — nearest-neighbour search over the corpus
//! - [`EmbeddingProvider`] — text → vector, used by search backends
//! - [`DistributedCache`] — shared key/value store with TTL
//! - [`GenerationBackend`] — hosted LLM, buffered or streaming
//!
//! # Error conventions
//!
//! - search and embedding failures → `RetrievalUnavailable`
//! - cache failures → `CacheUnavailable`
//! - generation failures → `BackendUnavailable`, `BackendRejected` or
//!   `BackendRateLimited`

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;
use crate::prompt::Prompt;
use crate::types::{ChatStream, RetrievedPassage};

// ============================================================================
// Similarity search
// ============================================================================

/// Opaque nearest-neighbour service over the document set.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Return up to `k` passages for `query`. Order and filtering are not
    /// required; the [`Retriever`](crate::Retriever) ranks and filters.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>>;
}

// ============================================================================
// Embedding provider
// ============================================================================

/// Provider for query embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============================================================================
// Distributed cache
// ============================================================================

/// Shared cache service (e.g. Redis).
///
/// Implementations report every connectivity problem as
/// `CacheUnavailable`; the [`TieredCache`](crate::TieredCache) absorbs it.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Fetch a value. `Ok(None)` is a clean miss.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

// ============================================================================
// Generation backend
// ============================================================================

/// Hosted large-language-model backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Whole-response completion.
    async fn complete(&self, prompt: &Prompt) -> Result<String>;

    /// Incremental completion.
    ///
    /// The stream yields `Content` chunks and ends with `Done` on success.
    /// A failure is reported as an `Err` item; anything the stream yields
    /// after its first `Err` or `Done` is ignored by the caller.
    async fn complete_stream(&self, prompt: &Prompt) -> Result<ChatStream>;
}
