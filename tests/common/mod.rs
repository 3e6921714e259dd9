//! Mock collaborators shared by the pipeline integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};

use mimir::prompt::Prompt;
use mimir::{
    ChatEvent, ChatStream, DistributedCache, GenerationBackend, GenerationConfig, Mimir,
    MimirBuilder, MimirError, Result, RetrievalConfig, RetrievedPassage, RetryConfig,
    SimilaritySearch,
};

// ============================================================================
// Similarity search
// ============================================================================

pub struct MockSearch {
    passages: Vec<RetrievedPassage>,
    failures: AtomicU32,
    calls: AtomicU32,
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn returning(passages: Vec<RetrievedPassage>) -> Self {
        Self {
            passages,
            failures: AtomicU32::new(0),
            calls: AtomicU32::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::returning(Vec::new())
    }

    /// Fail the first `n` calls with `RetrievalUnavailable`.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.failures = AtomicU32::new(n);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SimilaritySearch for MockSearch {
    fn name(&self) -> &str {
        "mock-search"
    }

    async fn search(&self, query: &str, _k: usize) -> Result<Vec<RetrievedPassage>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.queries.lock().unwrap().push(query.to_string());
        if self
            .failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(MimirError::RetrievalUnavailable("vector store down".into()));
        }
        Ok(self.passages.clone())
    }
}

// ============================================================================
// Generation backend
// ============================================================================

/// How a scripted stream ends after its chunks.
#[derive(Clone, Copy)]
pub enum StreamEnd {
    Done,
    Fail(fn() -> MimirError),
    /// Close without a completion marker.
    Close,
    /// Never yield again.
    Hang,
}

pub struct MockBackend {
    answer: String,
    chunks: Vec<String>,
    end: StreamEnd,
    complete_failures: AtomicU32,
    fail_with: fn() -> MimirError,
    calls: AtomicU32,
    stream_calls: AtomicU32,
    prompts: Mutex<Vec<Prompt>>,
    stream_dropped: Arc<AtomicBool>,
}

impl MockBackend {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            chunks: Vec::new(),
            end: StreamEnd::Done,
            complete_failures: AtomicU32::new(0),
            fail_with: || MimirError::BackendUnavailable("connection reset".into()),
            calls: AtomicU32::new(0),
            stream_calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
            stream_dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn streaming(chunks: &[&str], end: StreamEnd) -> Self {
        let mut backend = Self::answering(&chunks.concat());
        backend.chunks = chunks.iter().map(|c| c.to_string()).collect();
        backend.end = end;
        backend
    }

    /// Fail the first `n` buffered calls and stream opens with `error`.
    pub fn failing_first(mut self, n: u32, error: fn() -> MimirError) -> Self {
        self.complete_failures = AtomicU32::new(n);
        self.fail_with = error;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn stream_call_count(&self) -> u32 {
        self.stream_calls.load(Ordering::Relaxed)
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn stream_dropped(&self) -> bool {
        self.stream_dropped.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Option<MimirError> {
        self.complete_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .ok()
            .map(|_| (self.fail_with)())
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.prompts.lock().unwrap().push(prompt.clone());
        match self.take_failure() {
            Some(e) => Err(e),
            None => Ok(self.answer.clone()),
        }
    }

    async fn complete_stream(&self, prompt: &Prompt) -> Result<ChatStream> {
        self.stream_calls.fetch_add(1, Ordering::Relaxed);
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(e) = self.take_failure() {
            return Err(e);
        }

        let chunks = stream::iter(
            self.chunks
                .clone()
                .into_iter()
                .map(|c| Ok(ChatEvent::Content(c))),
        );
        let tail: ChatStream = match self.end {
            StreamEnd::Done => Box::pin(stream::iter([Ok::<_, MimirError>(ChatEvent::Done)])),
            StreamEnd::Fail(error) => {
                Box::pin(stream::once(async move { Err::<ChatEvent, _>(error()) }))
            }
            StreamEnd::Close => Box::pin(stream::empty::<Result<ChatEvent>>()),
            StreamEnd::Hang => Box::pin(stream::pending::<Result<ChatEvent>>()),
        };
        let guard = DropFlag(self.stream_dropped.clone());
        let events = chunks.chain(tail).map(move |item| {
            let _ = &guard;
            item
        });
        Ok(Box::pin(events))
    }
}

// ============================================================================
// Distributed cache
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Healthy,
    Failing,
    Slow(Duration),
}

pub struct MockDistributedCache {
    store: Mutex<HashMap<String, String>>,
    mode: Mutex<CacheMode>,
    gets: AtomicU32,
    sets: AtomicU32,
}

impl MockDistributedCache {
    pub fn new(mode: CacheMode) -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            mode: Mutex::new(mode),
            gets: AtomicU32::new(0),
            sets: AtomicU32::new(0),
        }
    }

    pub fn healthy() -> Self {
        Self::new(CacheMode::Healthy)
    }

    pub fn set_mode(&self, mode: CacheMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn seed(&self, key: &str, value: &str) {
        self.store
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.store.lock().unwrap().get(key).cloned()
    }

    pub fn get_count(&self) -> u32 {
        self.gets.load(Ordering::Relaxed)
    }

    pub fn set_count(&self) -> u32 {
        self.sets.load(Ordering::Relaxed)
    }

    async fn check(&self) -> Result<()> {
        let mode = *self.mode.lock().unwrap();
        match mode {
            CacheMode::Healthy => Ok(()),
            CacheMode::Failing => Err(MimirError::CacheUnavailable("connection refused".into())),
            CacheMode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl DistributedCache for MockDistributedCache {
    fn name(&self) -> &str {
        "mock-cache"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.check().await?;
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str, _ttl: Duration) -> Result<()> {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.check().await?;
        self.seed(key, value);
        Ok(())
    }
}

// ============================================================================
// Pipeline helpers
// ============================================================================

pub fn fast_retry() -> RetryConfig {
    RetryConfig::new().initial_delay(Duration::from_millis(1))
}

/// Builder wired to the given mocks with millisecond retry backoff.
pub fn pipeline(search: Arc<MockSearch>, backend: Arc<MockBackend>) -> MimirBuilder {
    Mimir::builder()
        .search(search)
        .backend(backend)
        .retrieval_config(RetrievalConfig::new().retry(fast_retry()))
        .generation_config(GenerationConfig::new().retry(fast_retry()))
        .system_prompt("Answer from the context.")
}

pub fn passage(text: &str, score: f32, id: &str) -> RetrievedPassage {
    RetrievedPassage::new(text, score, id)
}
