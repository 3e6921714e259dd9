//! HuggingFace Inference API client for query embeddings.
//!
//! Uses the serverless feature-extraction pipeline.
//! See: <https://huggingface.co/docs/api-inference/index>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::traits::EmbeddingProvider;
use crate::{MimirError, Result};

/// Default base URL for HuggingFace Inference API
const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Sentence embedding model the document index was built with.
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Client for the HuggingFace feature-extraction pipeline.
#[derive(Clone)]
pub struct HuggingFaceEmbedder {
    api_key: Option<String>,
    http: Client,
    base_url: String,
    model: String,
}

impl HuggingFaceEmbedder {
    /// Create an embedder against the public inference API.
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    /// Create an embedder with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MimirError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            http,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn check_status(&self, response: &reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = match status.as_u16() {
            401 => "authentication failed".to_string(),
            404 => format!("model not found: {}", self.model),
            429 => "rate limited".to_string(),
            503 => "model is loading".to_string(),
            _ => format!("HuggingFace API error: {status}"),
        };
        Err(MimirError::RetrievalUnavailable(message))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a str,
}

/// Sentence-transformer models return a flat vector; some pipelines wrap
/// it once more.
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Flat(Vec<f32>),
    Nested(Vec<Vec<f32>>),
}

impl EmbedResponse {
    fn into_vector(self) -> Option<Vec<f32>> {
        match self {
            EmbedResponse::Flat(v) => Some(v),
            EmbedResponse::Nested(v) => v.into_iter().next(),
        }
        .filter(|v| !v.is_empty())
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbedder {
    fn name(&self) -> &str {
        "huggingface"
    }

    #[instrument(name = "huggingface.embed", skip(self, text), fields(model = %self.model))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/pipeline/feature-extraction/{}", self.base_url, self.model);

        let mut request = self.http.post(&url).json(&EmbedRequest { inputs: text });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| MimirError::RetrievalUnavailable(e.to_string()))?;

        self.check_status(&response)?;

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| MimirError::RetrievalUnavailable(e.to_string()))?;

        body.into_vector()
            .ok_or_else(|| MimirError::RetrievalUnavailable("empty embedding".to_string()))
    }
}
