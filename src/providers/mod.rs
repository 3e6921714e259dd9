//! Collaborator traits and their concrete implementations.
//!
//! The pipeline only ever talks to the traits in [`traits`]; the HTTP
//! clients here are what the CLI and `Mimir::from_config` wire in.
//! Retry and stream supervision helpers live here too, since every
//! network-facing component shares them.

pub mod backpressure;
pub mod chroma;
pub mod huggingface;
pub mod llm_backend;
#[cfg(feature = "redis")]
pub mod redis;
pub mod retry;
pub mod traits;

pub use backpressure::bounded_stream;
pub use chroma::ChromaSearch;
pub use huggingface::HuggingFaceEmbedder;
pub use llm_backend::{LlmBackend, SamplingConfig};
#[cfg(feature = "redis")]
pub use redis::RedisCache;
pub use retry::{RetryConfig, with_retry};
pub use traits::{DistributedCache, EmbeddingProvider, GenerationBackend, SimilaritySearch};
