//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.mimir/config.toml` (user)
//! 3. `/etc/mimir/config.toml` (system)
//!
//! Every field has a default, so an empty file (or no file at all when
//! no explicit path is given) yields a working configuration.
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.mimir/secrets.toml` (user, must be 0600)
//! 2. `/etc/mimir/secrets.toml` (system, must be 0600)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::admission::AdmissionConfig;
use crate::cache::{CacheConfig, DEFAULT_KEY_PREFIX};
use crate::generation::GenerationConfig;
use crate::prompt::{DEFAULT_MAX_CHARS, DEFAULT_SYSTEM_PROMPT};
use crate::providers::chroma::{DEFAULT_CHROMA_URL, DEFAULT_COLLECTION};
use crate::providers::huggingface::DEFAULT_EMBEDDING_MODEL;
use crate::providers::llm_backend::{DEFAULT_MODEL, SamplingConfig};
use crate::providers::retry::RetryConfig;
use crate::retrieval::RetrievalConfig;
use crate::{MimirError, Result};

/// Environment variable that overrides the configured system prompt.
pub const SYSTEM_PROMPT_ENV: &str = "SYSTEM_PROMPT";

/// Pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub admission: AdmissionSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
    #[serde(default)]
    pub prompt: PromptSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub search: SearchSection,
}

/// `[cache]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub ttl_secs: u64,
    pub local_capacity: u64,
    pub key_prefix: String,
    pub distributed_timeout_ms: u64,
    /// Distributed tier; local-only when unset.
    pub redis_url: Option<String>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            local_capacity: 1_000,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            distributed_timeout_ms: 250,
            redis_url: None,
        }
    }
}

/// `[admission]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdmissionSection {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for AdmissionSection {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 20,
        }
    }
}

/// `[retrieval]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub k: usize,
    pub min_score: f32,
    pub timeout_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            k: 5,
            min_score: 0.25,
            timeout_ms: 5_000,
            max_attempts: 2,
        }
    }
}

/// `[prompt]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptSection {
    pub max_chars: usize,
    pub system_prompt: Option<String>,
    pub system_prompt_file: Option<PathBuf>,
}

impl Default for PromptSection {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            system_prompt: None,
            system_prompt_file: None,
        }
    }
}

/// `[generation]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    /// One of groq, openai, openrouter, anthropic, ollama.
    pub backend: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub stream_buffer: usize,
    /// Override the provider endpoint (e.g. a local Ollama).
    pub base_url: Option<String>,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            backend: "groq".to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 500,
            top_p: 0.9,
            timeout_secs: 30,
            max_attempts: 2,
            initial_backoff_ms: 500,
            stream_buffer: 64,
            base_url: None,
        }
    }
}

/// `[search]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub chroma_url: String,
    pub collection: String,
    pub embedding_model: String,
    /// Override the HuggingFace inference endpoint.
    pub huggingface_url: Option<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            chroma_url: DEFAULT_CHROMA_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            huggingface_url: None,
        }
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided, must exist)
    /// 2. `~/.mimir/config.toml`
    /// 3. `/etc/mimir/config.toml`
    ///
    /// Falls back to defaults when no explicit path is given and neither
    /// standard file exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MimirError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".mimir").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/mimir/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .ttl(Duration::from_secs(self.cache.ttl_secs))
            .local_capacity(self.cache.local_capacity)
            .key_prefix(self.cache.key_prefix.clone())
            .distributed_timeout(Duration::from_millis(self.cache.distributed_timeout_ms))
    }

    pub fn admission_config(&self) -> AdmissionConfig {
        AdmissionConfig::new()
            .window(Duration::from_secs(self.admission.window_secs))
            .max_requests(self.admission.max_requests)
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        let defaults = RetrievalConfig::default();
        RetrievalConfig::new()
            .k(self.retrieval.k)
            .min_score(self.retrieval.min_score)
            .timeout(Duration::from_millis(self.retrieval.timeout_ms))
            .retry(defaults.retry.max_attempts(self.retrieval.max_attempts))
    }

    pub fn generation_config(&self) -> GenerationConfig {
        let g = &self.generation;
        GenerationConfig::new()
            .timeout(Duration::from_secs(g.timeout_secs))
            .stream_buffer(g.stream_buffer)
            .retry(
                RetryConfig::new()
                    .max_attempts(g.max_attempts)
                    .initial_delay(Duration::from_millis(g.initial_backoff_ms)),
            )
    }

    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            model: self.generation.model.clone(),
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
            top_p: self.generation.top_p,
        }
    }

    /// Resolve the system instruction.
    ///
    /// Order: `SYSTEM_PROMPT` env var, inline `system_prompt`,
    /// `system_prompt_file`, then the built-in default.
    pub fn system_prompt(&self) -> Result<String> {
        self.system_prompt_with_override(std::env::var(SYSTEM_PROMPT_ENV).ok())
    }

    fn system_prompt_with_override(&self, env_override: Option<String>) -> Result<String> {
        if let Some(prompt) = env_override.filter(|p| !p.trim().is_empty()) {
            return Ok(prompt);
        }
        if let Some(prompt) = &self.prompt.system_prompt {
            return Ok(prompt.clone());
        }
        if let Some(path) = &self.prompt.system_prompt_file {
            return fs::read_to_string(path).map_err(|e| {
                MimirError::Configuration(format!(
                    "Failed to read system prompt file {path:?}: {e}"
                ))
            });
        }
        Ok(DEFAULT_SYSTEM_PROMPT.to_string())
    }
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub groq: Option<ApiKeySecret>,
    #[serde(default)]
    pub openai: Option<ApiKeySecret>,
    #[serde(default)]
    pub openrouter: Option<ApiKeySecret>,
    #[serde(default)]
    pub anthropic: Option<ApiKeySecret>,
    #[serde(default)]
    pub huggingface: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Provider name → environment variable name mapping.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("groq", "GROQ_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
    ("openrouter", "OPENROUTER_API_KEY"),
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("huggingface", "HF_API_KEY"),
];

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (keys may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".mimir").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/mimir/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load a secrets file, rejecting it if group or others can read it.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(MimirError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Get API key for a provider, falling back to the corresponding environment variable.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let from_file = match provider {
            "groq" => self.groq.as_ref(),
            "openai" => self.openai.as_ref(),
            "openrouter" => self.openrouter.as_ref(),
            "anthropic" => self.anthropic.as_ref(),
            "huggingface" => self.huggingface.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone());

        from_file.or_else(|| {
            PROVIDER_ENV_VARS
                .iter()
                .find(|(name, _)| *name == provider)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.cache.key_prefix, "chat:");
        assert_eq!(config.admission.max_requests, 20);
        assert_eq!(config.admission.window_secs, 60);
        assert_eq!(config.retrieval.k, 5);
        assert_eq!(config.generation.backend, "groq");
        assert_eq!(config.generation.model, "llama-3.1-8b-instant");
        assert!(config.cache.redis_url.is_none());
        assert_eq!(config.search.collection, "cory_profile");
        assert_eq!(config.search.chroma_url, "http://localhost:8000");
    }

    #[test]
    fn parse_partial_sections() {
        let toml = r#"
            [cache]
            ttl_secs = 600
            redis_url = "redis://localhost:6379"

            [retrieval]
            min_score = 0.5

            [generation]
            backend = "ollama"
            base_url = "http://localhost:11434"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.ttl_secs, 600);
        // Defaults preserved within a section
        assert_eq!(config.cache.local_capacity, 1_000);
        assert_eq!(config.retrieval.min_score, 0.5);
        assert_eq!(config.retrieval.k, 5);
        assert_eq!(config.generation.backend, "ollama");
        assert_eq!(config.generation.max_tokens, 500);
    }

    #[test]
    fn component_configs_follow_sections() {
        let toml = r#"
            [cache]
            ttl_secs = 60
            distributed_timeout_ms = 100

            [admission]
            window_secs = 10
            max_requests = 3

            [retrieval]
            max_attempts = 1

            [generation]
            timeout_secs = 5
            max_attempts = 3
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache_config().ttl, Duration::from_secs(60));
        assert_eq!(
            config.cache_config().distributed_timeout,
            Duration::from_millis(100)
        );
        assert_eq!(config.admission_config().max_requests, 3);
        assert_eq!(config.admission_config().window, Duration::from_secs(10));
        assert_eq!(config.retrieval_config().retry.max_attempts, 1);
        assert_eq!(config.generation_config().timeout, Duration::from_secs(5));
        assert_eq!(config.generation_config().retry.max_attempts, 3);
    }

    #[test]
    fn system_prompt_resolution_order() {
        let mut config = Config::default();
        assert_eq!(
            config.system_prompt_with_override(None).unwrap(),
            DEFAULT_SYSTEM_PROMPT
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "from file {{context}}").unwrap();
        config.prompt.system_prompt_file = Some(file.path().to_path_buf());
        assert_eq!(
            config.system_prompt_with_override(None).unwrap(),
            "from file {context}"
        );

        config.prompt.system_prompt = Some("inline".into());
        assert_eq!(config.system_prompt_with_override(None).unwrap(), "inline");

        assert_eq!(
            config
                .system_prompt_with_override(Some("from env".into()))
                .unwrap(),
            "from env"
        );
        // blank override ignored
        assert_eq!(
            config.system_prompt_with_override(Some("  ".into())).unwrap(),
            "inline"
        );
    }

    #[test]
    fn missing_system_prompt_file_is_error() {
        let mut config = Config::default();
        config.prompt.system_prompt_file = Some(PathBuf::from("/nonexistent/prompt.txt"));
        assert!(matches!(
            config.system_prompt_with_override(None),
            Err(MimirError::Configuration(_))
        ));
    }

    #[test]
    fn parse_secrets() {
        let toml = r#"
            [groq]
            api_key = "gsk-test-key"

            [huggingface]
            api_key = "hf-test-key"
        "#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.groq.as_ref().unwrap().api_key, "gsk-test-key");
        assert_eq!(secrets.api_key("huggingface"), Some("hf-test-key".into()));
        assert!(secrets.openai.is_none());
        assert_eq!(secrets.api_key("nonexistent"), None);
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[admission]\nmax_requests = 7").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.admission.max_requests, 7);
    }

    #[cfg(unix)]
    #[test]
    fn insecure_secrets_file_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[groq]\napi_key = \"k\"").unwrap();

        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o644)).unwrap();
        let err = Secrets::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("insecure permissions"));

        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o600)).unwrap();
        let secrets = Secrets::load_from_file(file.path()).unwrap();
        assert_eq!(secrets.api_key("groq"), Some("k".into()));
    }
}
