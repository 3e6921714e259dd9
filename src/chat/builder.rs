//! Builder for configuring orchestrator instances

use std::sync::Arc;

use tracing::info;

use super::ChatOrchestrator;
use crate::admission::{AdmissionConfig, AdmissionController};
use crate::cache::{CacheConfig, TieredCache};
use crate::config::{Config, Secrets};
use crate::generation::{GenerationClient, GenerationConfig};
use crate::prompt::{DEFAULT_MAX_CHARS, DEFAULT_SYSTEM_PROMPT, PromptAssembler};
use crate::providers::chroma::ChromaSearch;
use crate::providers::huggingface::HuggingFaceEmbedder;
use crate::providers::llm_backend::{LlmBackend, parse_backend};
use crate::providers::traits::{DistributedCache, GenerationBackend, SimilaritySearch};
use crate::retrieval::{RetrievalConfig, Retriever};
use crate::{MimirError, Result};

/// Main entry point for creating orchestrator instances.
pub struct Mimir;

impl Mimir {
    /// Create a new builder for configuring the pipeline.
    pub fn builder() -> MimirBuilder {
        MimirBuilder::new()
    }

    /// Build the pipeline from configuration files and secrets.
    ///
    /// Wires Chroma + HuggingFace for search, the llm crate for
    /// generation and, with the `redis` feature and a `redis_url`, Redis
    /// as the distributed cache tier. An unreachable Redis at startup
    /// leaves the pipeline running on the local tier alone.
    pub async fn from_config(config: &Config, secrets: &Secrets) -> Result<ChatOrchestrator> {
        let embedder = match &config.search.huggingface_url {
            Some(url) => HuggingFaceEmbedder::with_base_url(
                secrets.api_key("huggingface"),
                &config.search.embedding_model,
                url,
            )?,
            None => HuggingFaceEmbedder::new(
                secrets.api_key("huggingface"),
                &config.search.embedding_model,
            )?,
        };
        let search = ChromaSearch::new(
            &config.search.chroma_url,
            &config.search.collection,
            Arc::new(embedder),
        )?;

        let backend_name = config.generation.backend.to_ascii_lowercase();
        let mut backend = LlmBackend::new(
            parse_backend(&backend_name)?,
            secrets.api_key(&backend_name),
            &backend_name,
        )
        .sampling(config.sampling())
        .timeout(config.generation_config().timeout);
        if let Some(url) = &config.generation.base_url {
            backend = backend.base_url(url);
        }

        let builder = Mimir::builder()
            .search(Arc::new(search))
            .backend(Arc::new(backend))
            .cache_config(config.cache_config())
            .admission_config(config.admission_config())
            .retrieval_config(config.retrieval_config())
            .generation_config(config.generation_config())
            .max_prompt_chars(config.prompt.max_chars)
            .system_prompt(config.system_prompt()?);

        #[cfg(feature = "redis")]
        let builder = match &config.cache.redis_url {
            Some(url) => match crate::providers::redis::RedisCache::connect(url).await {
                Ok(redis) => builder.distributed_cache(Arc::new(redis)),
                Err(e) => {
                    tracing::warn!(error = %e, "redis unreachable, running with local cache only");
                    builder
                }
            },
            None => builder,
        };
        #[cfg(not(feature = "redis"))]
        if config.cache.redis_url.is_some() {
            tracing::warn!("redis_url set but the redis feature is disabled, ignoring");
        }

        builder.build()
    }
}

/// Builder for configuring orchestrator instances.
///
/// Similarity search and a generation backend are required; everything
/// else has defaults.
pub struct MimirBuilder {
    search: Option<Arc<dyn SimilaritySearch>>,
    backend: Option<Arc<dyn GenerationBackend>>,
    distributed_cache: Option<Arc<dyn DistributedCache>>,
    cache_config: CacheConfig,
    admission_config: AdmissionConfig,
    retrieval_config: RetrievalConfig,
    generation_config: GenerationConfig,
    max_prompt_chars: usize,
    system_prompt: String,
}

impl MimirBuilder {
    pub fn new() -> Self {
        Self {
            search: None,
            backend: None,
            distributed_cache: None,
            cache_config: CacheConfig::default(),
            admission_config: AdmissionConfig::default(),
            retrieval_config: RetrievalConfig::default(),
            generation_config: GenerationConfig::default(),
            max_prompt_chars: DEFAULT_MAX_CHARS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Similarity search used for retrieval (required).
    pub fn search(mut self, search: Arc<dyn SimilaritySearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Generation backend (required).
    pub fn backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Shared cache tier. Without one, only the local tier is used.
    pub fn distributed_cache(mut self, cache: Arc<dyn DistributedCache>) -> Self {
        self.distributed_cache = Some(cache);
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    pub fn admission_config(mut self, config: AdmissionConfig) -> Self {
        self.admission_config = config;
        self
    }

    pub fn retrieval_config(mut self, config: RetrievalConfig) -> Self {
        self.retrieval_config = config;
        self
    }

    pub fn generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = config;
        self
    }

    /// Prompt size budget in characters.
    pub fn max_prompt_chars(mut self, max_chars: usize) -> Self {
        self.max_prompt_chars = max_chars;
        self
    }

    /// System instruction; may contain `{context}` and `{question}`.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn build(self) -> Result<ChatOrchestrator> {
        let search = self.search.ok_or_else(|| {
            MimirError::Configuration("no similarity search configured".into())
        })?;
        let backend = self.backend.ok_or_else(|| {
            MimirError::Configuration("no generation backend configured".into())
        })?;

        let mut cache = TieredCache::new(self.cache_config);
        if let Some(store) = self.distributed_cache {
            cache = cache.with_distributed(store);
        }

        info!(
            search = search.name(),
            backend = backend.name(),
            distributed_cache = cache.has_distributed(),
            "chat pipeline ready"
        );

        Ok(ChatOrchestrator::new(
            Arc::new(AdmissionController::new(self.admission_config)),
            cache,
            Retriever::new(search, self.retrieval_config),
            PromptAssembler::new(self.max_prompt_chars),
            GenerationClient::new(backend, self.generation_config),
            self.system_prompt,
        ))
    }
}

impl Default for MimirBuilder {
    fn default() -> Self {
        Self::new()
    }
}
