//! Chroma vector store client implementing [`SimilaritySearch`].
//!
//! Queries go through the collection REST API:
//!
//! - `GET  /api/v1/collections/{name}` resolves the collection id (once)
//! - `POST /api/v1/collections/{id}/query` runs the nearest-neighbour search
//!
//! Collections use Chroma's default squared-L2 space. Distances between
//! normalized sentence embeddings fall in `0..=2`; they are mapped to a
//! relevance score `1 - d/2` so that higher is better. The default floor
//! of 0.25 therefore keeps passages with distance up to 1.5.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use super::traits::{EmbeddingProvider, SimilaritySearch};
use crate::types::RetrievedPassage;
use crate::{MimirError, Result};

pub const DEFAULT_CHROMA_URL: &str = "http://localhost:8000";
pub const DEFAULT_COLLECTION: &str = "cory_profile";

/// Similarity search against a Chroma collection.
pub struct ChromaSearch {
    http: Client,
    base_url: String,
    collection: String,
    collection_id: OnceCell<String>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ChromaSearch {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MimirError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            collection_id: OnceCell::new(),
            embedder,
        })
    }

    async fn collection_id(&self) -> Result<&str> {
        self.collection_id
            .get_or_try_init(|| async {
                let url = format!("{}/api/v1/collections/{}", self.base_url, self.collection);
                let response = self.http.get(&url).send().await.map_err(unavailable)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(MimirError::RetrievalUnavailable(format!(
                        "collection {} lookup failed: {status}",
                        self.collection
                    )));
                }
                let info: CollectionInfo = response.json().await.map_err(unavailable)?;
                debug!(collection = %self.collection, id = %info.id, "resolved collection");
                Ok(info.id)
            })
            .await
            .map(String::as_str)
    }
}

fn unavailable(e: reqwest::Error) -> MimirError {
    MimirError::RetrievalUnavailable(e.to_string())
}

/// Embedding distance to relevance score.
pub fn distance_to_score(distance: f32) -> f32 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [&'a [f32]; 1],
    n_results: usize,
    include: [&'static str; 3],
}

/// One result list per query embedding; we always send exactly one.
#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<HashMap<String, Value>>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

impl QueryResponse {
    fn into_passages(self) -> Vec<RetrievedPassage> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let mut documents = self.documents.and_then(|d| d.into_iter().next()).unwrap_or_default();
        let mut metadatas = self.metadatas.and_then(|m| m.into_iter().next()).unwrap_or_default();
        let distances = self.distances.and_then(|d| d.into_iter().next()).unwrap_or_default();

        ids.into_iter()
            .enumerate()
            .map(|(i, id)| {
                let metadata = metadatas.get_mut(i).and_then(Option::take).unwrap_or_default();
                let document = documents.get_mut(i).and_then(Option::take);
                let field = |key: &str| metadata.get(key).and_then(Value::as_str).map(str::to_string);

                let text = field("answer").or(document).unwrap_or_default();
                let score = distances.get(i).copied().map(distance_to_score).unwrap_or(0.0);
                let passage = RetrievedPassage::new(text, score, id);
                match field("question") {
                    Some(q) => passage.with_question(q),
                    None => passage,
                }
            })
            .collect()
    }
}

#[async_trait]
impl SimilaritySearch for ChromaSearch {
    fn name(&self) -> &str {
        "chroma"
    }

    #[instrument(name = "chroma.search", skip(self, query), fields(collection = %self.collection))]
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        let embedding = self.embedder.embed(query).await?;
        let id = self.collection_id().await?;

        let url = format!("{}/api/v1/collections/{}/query", self.base_url, id);
        let response = self
            .http
            .post(&url)
            .json(&QueryRequest {
                query_embeddings: [&embedding],
                n_results: k,
                include: ["documents", "metadatas", "distances"],
            })
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(MimirError::RetrievalUnavailable(format!(
                "chroma query failed: {status}"
            )));
        }

        let body: QueryResponse = response.json().await.map_err(unavailable)?;
        Ok(body.into_passages())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_maps_to_unit_score() {
        assert_eq!(distance_to_score(0.0), 1.0);
        assert_eq!(distance_to_score(1.0), 0.5);
        assert_eq!(distance_to_score(2.0), 0.0);
        assert_eq!(distance_to_score(3.0), 0.0);
        assert_eq!(distance_to_score(-0.1), 1.0);
    }

    #[test]
    fn response_uses_metadata_answer_and_question() {
        let body: QueryResponse = serde_json::from_value(serde_json::json!({
            "ids": [["a", "b"]],
            "documents": [["doc a", "doc b"]],
            "metadatas": [[{"question": "Where?", "answer": "Berlin"}, null]],
            "distances": [[0.5, 1.0]]
        }))
        .unwrap();
        let passages = body.into_passages();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].render(), "Q: Where?\nA: Berlin");
        assert_eq!(passages[0].score, 0.75);
        assert_eq!(passages[1].text, "doc b");
        assert_eq!(passages[1].question, None);
    }

    #[test]
    fn response_without_optional_fields() {
        let body: QueryResponse =
            serde_json::from_value(serde_json::json!({ "ids": [["a"]] })).unwrap();
        let passages = body.into_passages();
        assert_eq!(passages[0].text, "");
        assert_eq!(passages[0].score, 0.0);
    }
}
