//! The chat orchestrator: the two public operations of the pipeline.
//!
//! Every request runs the same path up to prompt assembly:
//!
//! ```text
//! admit -> fingerprint -> cache lookup -+-> hit: return cached answer
//!                                       +-> miss: retrieve -> assemble
//! ```
//!
//! [`chat`](ChatOrchestrator::chat) then generates the whole answer and
//! caches it. [`chat_stream`](ChatOrchestrator::chat_stream) relays
//! chunks as they arrive and caches the concatenated answer only once
//! the backend signals completion.
//!
//! No lock is held across any collaborator call. The cache tier and the
//! admission controller are the only state shared between requests.

mod builder;

pub use builder::{Mimir, MimirBuilder};

use std::sync::Arc;
use std::time::Instant;

use futures_util::{StreamExt, stream};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};

use crate::admission::{Admission, AdmissionController};
use crate::cache::TieredCache;
use crate::fingerprint::{Fingerprint, fingerprint};
use crate::generation::GenerationClient;
use crate::prompt::{Prompt, PromptAssembler};
use crate::retrieval::Retriever;
use crate::types::{ChatAnswer, ChatEvent, ChatStream, Query};
use crate::{MimirError, Result, telemetry};

/// Composes admission, cache, retrieval, prompt assembly and generation.
///
/// Build one with [`Mimir::builder`]. Cheap to share behind an `Arc`;
/// all methods take `&self`.
pub struct ChatOrchestrator {
    admission: Arc<AdmissionController>,
    cache: TieredCache,
    retriever: Retriever,
    assembler: PromptAssembler,
    generator: GenerationClient,
    system_prompt: String,
}

/// Result of the shared request path.
enum Prepared {
    Cached(String),
    Fresh {
        fingerprint: Fingerprint,
        prompt: Prompt,
    },
}

impl ChatOrchestrator {
    pub(crate) fn new(
        admission: Arc<AdmissionController>,
        cache: TieredCache,
        retriever: Retriever,
        assembler: PromptAssembler,
        generator: GenerationClient,
        system_prompt: String,
    ) -> Self {
        Self {
            admission,
            cache,
            retriever,
            assembler,
            generator,
            system_prompt,
        }
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Answer `query` in one piece.
    ///
    /// `client_id` identifies the caller for admission control
    /// (typically the remote address).
    #[instrument(name = "mimir.chat", skip(self, query))]
    pub async fn chat(&self, client_id: &str, query: &Query) -> Result<ChatAnswer> {
        let started = Instant::now();
        let result = self.chat_inner(client_id, query).await;

        let status = match &result {
            Ok(answer) if answer.cached => "cached",
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        metrics::counter!(telemetry::REQUESTS_TOTAL, "operation" => "chat", "status" => status)
            .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "operation" => "chat")
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn chat_inner(&self, client_id: &str, query: &Query) -> Result<ChatAnswer> {
        match self.prepare(client_id, query).await? {
            Prepared::Cached(content) => Ok(ChatAnswer {
                content,
                cached: true,
                sources: Vec::new(),
            }),
            Prepared::Fresh {
                fingerprint,
                prompt,
            } => {
                let content = self.generator.generate(&prompt).await?;
                if content.trim().is_empty() {
                    debug!("empty answer, not caching");
                } else {
                    self.cache.put(&fingerprint, &content).await;
                }
                Ok(ChatAnswer {
                    content,
                    cached: false,
                    sources: prompt.sources,
                })
            }
        }
    }

    /// Answer `query` incrementally.
    ///
    /// Errors before the first chunk (admission, backend unreachable) are
    /// returned directly. Once the stream is open it yields `Content`
    /// chunks followed by `Done`, or ends with an `Err` item if the
    /// backend fails mid-answer. Dropping the stream cancels the backend
    /// call; a dropped or failed stream is never cached.
    #[instrument(name = "mimir.chat_stream", skip(self, query))]
    pub async fn chat_stream(&self, client_id: &str, query: &Query) -> Result<ChatStream> {
        let result = self.chat_stream_inner(client_id, query).await;

        let status = match &result {
            Ok((_, true)) => "cached",
            Ok((_, false)) => "ok",
            Err(e) => e.kind().as_str(),
        };
        metrics::counter!(telemetry::REQUESTS_TOTAL, "operation" => "chat_stream", "status" => status)
            .increment(1);
        result.map(|(stream, _)| stream)
    }

    async fn chat_stream_inner(&self, client_id: &str, query: &Query) -> Result<(ChatStream, bool)> {
        match self.prepare(client_id, query).await? {
            Prepared::Cached(answer) => {
                let events: ChatStream =
                    Box::pin(stream::iter([Ok(ChatEvent::Content(answer)), Ok(ChatEvent::Done)]));
                Ok((events, true))
            }
            Prepared::Fresh {
                fingerprint,
                prompt,
            } => {
                let inner = self.generator.generate_stream(&prompt).await?;
                Ok((self.cache_on_completion(inner, fingerprint), false))
            }
        }
    }

    /// Admission, fingerprint, cache lookup, retrieval and assembly.
    async fn prepare(&self, client_id: &str, query: &Query) -> Result<Prepared> {
        if let Admission::Rejected { retry_after } = self.admission.admit(client_id) {
            return Err(MimirError::RateLimited { retry_after });
        }
        if query.text.trim().is_empty() {
            return Err(MimirError::InvalidQuery("query text is empty".into()));
        }

        let fingerprint = fingerprint(&query.text);
        if let Some(answer) = self.cache.get(&fingerprint).await {
            return Ok(Prepared::Cached(answer));
        }

        let passages = match self.retriever.retrieve_default(&query.text).await {
            Ok(passages) => passages,
            Err(e) => {
                metrics::counter!(telemetry::RETRIEVAL_FALLBACKS_TOTAL).increment(1);
                warn!(error = %e, "retrieval unavailable, answering without context");
                Vec::new()
            }
        };

        let prompt = self.assembler.assemble(
            &self.system_prompt,
            &passages,
            &query.history,
            &query.text,
        )?;
        debug!(
            fingerprint = %fingerprint.short(),
            passages = prompt.sources.len(),
            chars = prompt.char_len(),
            "prompt assembled"
        );
        Ok(Prepared::Fresh {
            fingerprint,
            prompt,
        })
    }

    /// Relay `inner` to a fresh channel, caching the full answer when
    /// `Done` arrives while the consumer is still attached.
    fn cache_on_completion(&self, inner: ChatStream, fingerprint: Fingerprint) -> ChatStream {
        let (tx, rx) =
            tokio::sync::mpsc::channel::<Result<ChatEvent>>(self.generator.config().stream_buffer.max(1));
        let cache = self.cache.clone();

        tokio::spawn(async move {
            let mut inner = inner;
            let mut answer = String::new();
            let mut chunks = 0usize;
            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        debug!(chunks, "stream consumer dropped, answer not cached");
                        return;
                    }
                    next = inner.next() => next,
                };

                match next {
                    Some(Ok(ChatEvent::Content(text))) => {
                        answer.push_str(&text);
                        chunks += 1;
                        if tx.send(Ok(ChatEvent::Content(text))).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(ChatEvent::Done)) => {
                        if tx.is_closed() {
                            return;
                        }
                        if !answer.trim().is_empty() {
                            cache.put(&fingerprint, &answer).await;
                        }
                        let _ = tx.send(Ok(ChatEvent::Done)).await;
                        return;
                    }
                    Some(Err(e)) => {
                        metrics::counter!(telemetry::STREAM_ABORTS_TOTAL).increment(1);
                        warn!(error = %e, chunks, "stream aborted, answer not cached");
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                    None => {
                        metrics::counter!(telemetry::STREAM_ABORTS_TOTAL).increment(1);
                        let _ = tx
                            .send(Err(MimirError::BackendUnavailable(
                                "stream closed without completion marker".into(),
                            )))
                            .await;
                        return;
                    }
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}
