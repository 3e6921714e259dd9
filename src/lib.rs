//! Mimir - retrieval-augmented question answering pipeline
//!
//! Mimir answers questions about a fixed document corpus. Each request
//! passes admission control, is fingerprinted and looked up in a
//! two-tier cache, and on a miss is answered by a hosted LLM from
//! passages retrieved by similarity search.
//!
//! The pipeline talks to its collaborators through the traits in
//! [`providers::traits`], so any vector store, cache or LLM can be
//! plugged in. Concrete HTTP clients for Chroma, HuggingFace, Redis and
//! the `llm` crate's backends ship in [`providers`].
//!
//! # Chat Example
//!
//! ```rust,no_run
//! use mimir::{Config, Mimir, Query, Secrets};
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let config = Config::load(None)?;
//!     let secrets = Secrets::load()?;
//!     let mimir = Mimir::from_config(&config, &secrets).await?;
//!
//!     let answer = mimir
//!         .chat("127.0.0.1", &Query::new("What did Cory build at Acme?"))
//!         .await?;
//!     println!("{}", answer.content);
//!     Ok(())
//! }
//! ```
//!
//! # Streaming Example
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use mimir::{ChatEvent, ChatOrchestrator, Query};
//!
//! async fn stream(mimir: &ChatOrchestrator) -> mimir::Result<()> {
//!     let mut events = mimir
//!         .chat_stream("127.0.0.1", &Query::new("What are Cory's skills?"))
//!         .await?;
//!     while let Some(event) = events.next().await {
//!         match event? {
//!             ChatEvent::Content(text) => print!("{text}"),
//!             ChatEvent::Done => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod generation;
pub mod prompt;
pub mod providers;
pub mod retrieval;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use admission::{Admission, AdmissionConfig, AdmissionController};
pub use cache::{CacheConfig, CacheTier, LocalCache, TieredCache};
pub use chat::{ChatOrchestrator, Mimir, MimirBuilder};
pub use config::{Config, Secrets};
pub use error::{ErrorKind, MimirError, Result};
pub use fingerprint::{Fingerprint, fingerprint};
pub use generation::{GenerationClient, GenerationConfig};
pub use prompt::{Prompt, PromptAssembler};
pub use providers::retry::RetryConfig;
pub use providers::traits::{
    DistributedCache, EmbeddingProvider, GenerationBackend, SimilaritySearch,
};
pub use retrieval::{RetrievalConfig, Retriever};

// Re-export all types
pub use types::{ChatAnswer, ChatEvent, ChatStream, Message, Query, RetrievedPassage, Role};
