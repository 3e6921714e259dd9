//! Mimir error types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Mimir error types
#[derive(Debug, thiserror::Error)]
pub enum MimirError {
    // Admission
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    // Retrieval
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    // Generation backend
    #[error("generation backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("generation backend rejected the request: {0}")]
    BackendRejected(String),

    #[error("generation backend rate limited, retry after {retry_after:?}")]
    BackendRateLimited { retry_after: Option<Duration> },

    // Cache tier (never surfaced by the orchestrator)
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    // Request errors
    #[error("prompt needs {required} chars but the budget is {budget}")]
    PromptTooLarge { budget: usize, required: usize },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stable, machine-readable error kind.
///
/// Serialized in snake_case so API layers can expose it next to (never
/// inside) the success payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    RetrievalUnavailable,
    BackendUnavailable,
    BackendRejected,
    BackendRateLimited,
    CacheUnavailable,
    PromptTooLarge,
    InvalidQuery,
    Configuration,
    Internal,
}

impl ErrorKind {
    /// The snake_case wire code for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::RetrievalUnavailable => "retrieval_unavailable",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::BackendRejected => "backend_rejected",
            ErrorKind::BackendRateLimited => "backend_rate_limited",
            ErrorKind::CacheUnavailable => "cache_unavailable",
            ErrorKind::PromptTooLarge => "prompt_too_large",
            ErrorKind::InvalidQuery => "invalid_query",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MimirError {
    /// Machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MimirError::RateLimited { .. } => ErrorKind::RateLimited,
            MimirError::RetrievalUnavailable(_) => ErrorKind::RetrievalUnavailable,
            MimirError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            MimirError::BackendRejected(_) => ErrorKind::BackendRejected,
            MimirError::BackendRateLimited { .. } => ErrorKind::BackendRateLimited,
            MimirError::CacheUnavailable(_) => ErrorKind::CacheUnavailable,
            MimirError::PromptTooLarge { .. } => ErrorKind::PromptTooLarge,
            MimirError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            MimirError::Configuration(_) => ErrorKind::Configuration,
            MimirError::Json(_) => ErrorKind::Internal,
        }
    }

    /// Whether a bounded retry may succeed.
    ///
    /// Only connectivity failures qualify. Rejections and backend rate
    /// limits are surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MimirError::BackendUnavailable(_) | MimirError::RetrievalUnavailable(_)
        )
    }

    /// Retry hint carried by rate-limit errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MimirError::RateLimited { retry_after } => Some(*retry_after),
            MimirError::BackendRateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether this error may reach the end caller.
    ///
    /// Retrieval and cache failures are always absorbed by the pipeline.
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            MimirError::RetrievalUnavailable(_) | MimirError::CacheUnavailable(_)
        )
    }
}

impl From<llm::error::LLMError> for MimirError {
    fn from(err: llm::error::LLMError) -> Self {
        // The llm crate flattens provider responses into strings
        classify_backend_message(err.to_string())
    }
}

/// Sort a backend failure message into the generation error taxonomy.
///
/// Status codes only count as whole tokens, so digits inside URLs, ports
/// or request ids do not change the classification.
pub(crate) fn classify_backend_message(msg: String) -> MimirError {
    let lower = msg.to_lowercase();
    let has_status = |code: &str| {
        lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| token == code)
    };

    if lower.contains("rate limit") || has_status("429") {
        MimirError::BackendRateLimited { retry_after: None }
    } else if lower.contains("authentication")
        || lower.contains("auth error")
        || lower.contains("invalid api key")
        || lower.contains("invalid request")
        || lower.contains("content policy")
        || ["400", "401", "403"].into_iter().any(has_status)
    {
        MimirError::BackendRejected(msg)
    } else {
        MimirError::BackendUnavailable(msg)
    }
}

/// Result type alias for Mimir operations
pub type Result<T> = std::result::Result<T, MimirError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_messages_are_classified() {
        assert!(matches!(
            classify_backend_message("HTTP 429 Too Many Requests".into()),
            MimirError::BackendRateLimited { .. }
        ));
        assert!(matches!(
            classify_backend_message("Auth Error: bad key".into()),
            MimirError::BackendRejected(_)
        ));
        assert!(matches!(
            classify_backend_message("Invalid Request: max_tokens too large".into()),
            MimirError::BackendRejected(_)
        ));
        assert!(matches!(
            classify_backend_message("HTTP Error: connection reset by peer".into()),
            MimirError::BackendUnavailable(_)
        ));
        assert!(matches!(
            classify_backend_message("Provider Error: status 403 Forbidden".into()),
            MimirError::BackendRejected(_)
        ));
    }

    #[test]
    fn status_digits_inside_urls_are_ignored() {
        let err = classify_backend_message(
            "HTTP Error: error sending request for url (http://10.0.0.4:8400/v1/chat): connection reset"
                .into(),
        );
        assert!(matches!(err, MimirError::BackendUnavailable(_)));
        assert!(err.is_transient());

        assert!(matches!(
            classify_backend_message("HTTP Error: request id req_4290abc timed out".into()),
            MimirError::BackendUnavailable(_)
        ));
    }
}
