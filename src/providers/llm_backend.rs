//! `llm` crate wrapper implementing [`GenerationBackend`].
//!
//! The llm crate takes the system prompt at build time, so a provider is
//! built per request from the stored configuration.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use llm::LLMProvider;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage as LlmMessage, StreamChunk};
use llm::error::LLMError;
use tracing::instrument;

use super::traits::GenerationBackend;
use crate::prompt::Prompt;
use crate::types::{ChatEvent, ChatStream, Message, Role};
use crate::{MimirError, Result};

/// Default hosted model.
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    pub model: String,
    /// Default: 0.3.
    pub temperature: f32,
    /// Default: 500.
    pub max_tokens: u32,
    /// Default: 0.9.
    pub top_p: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 500,
            top_p: 0.9,
        }
    }
}

/// Parse a backend name as used in configuration files.
pub fn parse_backend(name: &str) -> Result<LLMBackend> {
    match name.to_ascii_lowercase().as_str() {
        "groq" => Ok(LLMBackend::Groq),
        "openai" => Ok(LLMBackend::OpenAI),
        "openrouter" => Ok(LLMBackend::OpenRouter),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "ollama" => Ok(LLMBackend::Ollama),
        other => Err(MimirError::Configuration(format!(
            "unknown generation backend: {other}"
        ))),
    }
}

/// Hosted LLM reached through the llm crate.
pub struct LlmBackend {
    backend: LLMBackend,
    api_key: Option<String>,
    name: String,
    sampling: SamplingConfig,
    base_url: Option<String>,
    timeout: Duration,
}

impl LlmBackend {
    /// Create a backend.
    ///
    /// * `backend` - provider (Groq, OpenAI, ...)
    /// * `api_key` - API key (`None` for keyless backends such as Ollama)
    /// * `name` - name for logging (e.g. "groq")
    pub fn new(
        backend: LLMBackend,
        api_key: Option<impl Into<String>>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            api_key: api_key.map(|k| k.into()),
            name: name.into(),
            sampling: SamplingConfig::default(),
            base_url: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set sampling parameters.
    pub fn sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    /// Override the provider base URL (Ollama, proxies).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Transport-level timeout passed to the llm crate.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_provider(&self, system_prompt: Option<&str>) -> Result<Box<dyn LLMProvider>> {
        let mut builder = LLMBuilder::new()
            .backend(self.backend.clone())
            .model(&self.sampling.model)
            .timeout_seconds(self.timeout.as_secs().max(1))
            .temperature(self.sampling.temperature)
            .max_tokens(self.sampling.max_tokens)
            .top_p(self.sampling.top_p);
        if let Some(ref key) = self.api_key {
            builder = builder.api_key(key);
        }
        if let Some(sys) = system_prompt {
            builder = builder.system(sys);
        }
        if let Some(ref url) = self.base_url {
            builder = builder.base_url(url.clone());
        }

        builder
            .build()
            .map_err(|e| MimirError::Configuration(e.to_string()))
    }
}

/// Split our prompt into the llm crate's system prompt + message list.
fn to_llm_messages(messages: &[Message]) -> (Option<String>, Vec<LlmMessage>) {
    let mut system_prompt = None;
    let mut llm_messages = Vec::with_capacity(messages.len());
    for msg in messages {
        match msg.role {
            Role::System => system_prompt = Some(msg.content.clone()),
            Role::User => llm_messages.push(LlmMessage::user().content(msg.content.clone()).build()),
            Role::Assistant => {
                llm_messages.push(LlmMessage::assistant().content(msg.content.clone()).build())
            }
        }
    }
    (system_prompt, llm_messages)
}

/// Map llm stream chunks to chat events.
///
/// `Done` is only emitted when the provider sends one; a stream that ends
/// without it is left unterminated so consumers can treat it as aborted.
fn to_chat_events<S>(chunks: S) -> impl Stream<Item = Result<ChatEvent>> + Send
where
    S: Stream<Item = std::result::Result<StreamChunk, LLMError>> + Send,
{
    chunks.filter_map(|result| async move {
        match result {
            Ok(StreamChunk::Text(text)) => Some(Ok(ChatEvent::Content(text))),
            Ok(StreamChunk::Done { .. }) => Some(Ok(ChatEvent::Done)),
            Ok(_) => None,
            Err(e) => Some(Err(MimirError::from(e))),
        }
    })
}

#[async_trait]
impl GenerationBackend for LlmBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "llm.complete", skip(self, prompt), fields(model = %self.sampling.model, provider = %self.name))]
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let (system_prompt, llm_messages) = to_llm_messages(&prompt.messages);
        let provider = self.build_provider(system_prompt.as_deref())?;

        let response = provider
            .chat(&llm_messages)
            .await
            .map_err(MimirError::from)?;

        Ok(response.text().unwrap_or_default())
    }

    #[instrument(name = "llm.complete_stream", skip(self, prompt), fields(model = %self.sampling.model, provider = %self.name))]
    async fn complete_stream(&self, prompt: &Prompt) -> Result<ChatStream> {
        let (system_prompt, llm_messages) = to_llm_messages(&prompt.messages);
        let provider = self.build_provider(system_prompt.as_deref())?;

        let stream = provider
            .chat_stream_with_tools(&llm_messages, provider.tools())
            .await
            .map_err(MimirError::from)?;

        let events = to_chat_events(stream);
        Ok(Box::pin(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_backends() {
        assert!(matches!(parse_backend("groq"), Ok(LLMBackend::Groq)));
        assert!(matches!(parse_backend("OpenAI"), Ok(LLMBackend::OpenAI)));
        assert!(matches!(parse_backend("ollama"), Ok(LLMBackend::Ollama)));
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = parse_backend("mystery").err().unwrap();
        assert!(err.to_string().contains("mystery"));
    }

    #[test]
    fn system_message_split_out() {
        let messages = vec![
            Message::system("sys"),
            Message::user("q1"),
            Message::assistant("a1"),
            Message::user("q2"),
        ];
        let (system, rest) = to_llm_messages(&messages);
        assert_eq!(system.as_deref(), Some("sys"));
        assert_eq!(rest.len(), 3);
    }

    #[tokio::test]
    async fn stream_without_done_stays_unterminated() {
        let chunks = futures_util::stream::iter(vec![
            Ok(StreamChunk::Text("Hel".into())),
            Ok(StreamChunk::Text("lo".into())),
        ]);
        let events: Vec<_> = to_chat_events(chunks).collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(ChatEvent::Content(t)) if t == "Hel"));
        assert!(!events.iter().any(|e| matches!(e, Ok(ChatEvent::Done))));
    }

    #[tokio::test]
    async fn truncated_backend_stream_is_reported_as_abort() {
        use crate::providers::backpressure::bounded_stream;

        let chunks = futures_util::stream::iter(vec![Ok(StreamChunk::Text("Hel".into()))]);
        let relayed: Vec<_> = bounded_stream(Box::pin(to_chat_events(chunks)), 4, Duration::from_secs(5))
            .collect()
            .await;

        assert!(matches!(relayed.last(), Some(Err(_))));
        assert!(!relayed.iter().any(|e| matches!(e, Ok(ChatEvent::Done))));
    }

    #[test]
    fn sampling_defaults() {
        let s = SamplingConfig::default();
        assert_eq!(s.model, "llama-3.1-8b-instant");
        assert_eq!(s.max_tokens, 500);
        assert!((s.temperature - 0.3).abs() < f32::EPSILON);
        assert!((s.top_p - 0.9).abs() < f32::EPSILON);
    }
}
