//! Generation client: timeouts, bounded retry and stream supervision
//! around a [`GenerationBackend`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::prompt::Prompt;
use crate::providers::backpressure::{DEFAULT_STREAM_BUFFER, bounded_stream};
use crate::providers::retry::{RetryConfig, with_retry};
use crate::providers::traits::GenerationBackend;
use crate::types::ChatStream;
use crate::{MimirError, Result};

/// Configuration for the generation client.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Timeout for a buffered call, for opening a stream, and for the gap
    /// between two stream chunks. Default: 30s.
    pub timeout: Duration,
    /// Retry policy for `BackendUnavailable`. Default: one retry.
    pub retry: RetryConfig,
    /// Chunks buffered between backend and consumer. Default: 64.
    pub stream_buffer: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl GenerationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn stream_buffer(mut self, size: usize) -> Self {
        self.stream_buffer = size;
        self
    }
}

/// Invokes the backend in buffered or incremental mode.
///
/// Errors come out normalized: `BackendUnavailable` after the retry
/// budget is spent, `BackendRejected` and `BackendRateLimited` at once.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    config: GenerationConfig,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: GenerationConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Whole-response generation.
    #[instrument(name = "generation.generate", skip_all, fields(backend = %self.backend.name()))]
    pub async fn generate(&self, prompt: &Prompt) -> Result<String> {
        with_retry(&self.config.retry, "generate", || {
            self.timed(self.backend.complete(prompt))
        })
        .await
    }

    /// Incremental generation.
    ///
    /// Only opening the stream is retried; a failure after the first
    /// chunk ends the stream with an `Err` item. The returned stream is
    /// not restartable and stops the backend call when dropped.
    #[instrument(name = "generation.generate_stream", skip_all, fields(backend = %self.backend.name()))]
    pub async fn generate_stream(&self, prompt: &Prompt) -> Result<ChatStream> {
        let inner = with_retry(&self.config.retry, "generate_stream", || {
            self.timed(self.backend.complete_stream(prompt))
        })
        .await?;
        Ok(bounded_stream(
            inner,
            self.config.stream_buffer,
            self.config.timeout,
        ))
    }

    async fn timed<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(MimirError::BackendUnavailable(format!(
                    "no response within {:?}",
                    self.config.timeout
                )))
            })
    }
}
