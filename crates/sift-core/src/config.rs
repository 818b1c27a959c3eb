use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SiftError;

/// Top-level configuration loaded from `.sift.toml`.
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// working local setup.
///
/// # Examples
///
/// ```
/// use sift_core::SiftConfig;
///
/// let config = SiftConfig::default();
/// assert_eq!(config.chunker.token_budget, 1500);
/// assert_eq!(config.search.rrf_k, 60);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiftConfig {
    /// Chunking behavior.
    #[serde(default)]
    pub chunker: ChunkerConfig,
    /// Embedding provider and pipeline settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Query defaults.
    #[serde(default)]
    pub search: SearchConfig,
    /// Index storage settings.
    #[serde(default)]
    pub index: IndexConfig,
}

impl SiftConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Io`] if the file cannot be read, or
    /// [`SiftError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sift_core::SiftConfig;
    /// use std::path::Path;
    ///
    /// let config = SiftConfig::from_file(Path::new(".sift.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, SiftError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use sift_core::SiftConfig;
    ///
    /// let toml = r#"
    /// [search]
    /// limit = 25
    /// "#;
    /// let config = SiftConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.search.limit, 25);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, SiftError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// Chunker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Upper bound on estimated tokens per chunk (default: 1500).
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    /// Files parsed concurrently (default: 4).
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Window size used by the fallback chunker when no declarations are
    /// detected (default: 60).
    #[serde(default = "default_fallback_window_lines")]
    pub fallback_window_lines: usize,
}

fn default_token_budget() -> usize {
    1500
}

fn default_max_workers() -> usize {
    4
}

fn default_fallback_window_lines() -> usize {
    60
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            max_workers: default_max_workers(),
            fallback_window_lines: default_fallback_window_lines(),
        }
    }
}

/// Configuration for the embedding provider and batching pipeline.
///
/// # Examples
///
/// ```
/// use sift_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "ollama");
/// assert_eq!(config.model, "nomic-embed-text");
/// assert_eq!(config.batch_size, 16);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: `"ollama"`, `"voyage"` or `"openai"` (default: `"ollama"`).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Model name (default: `"nomic-embed-text"`).
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// API key for hosted providers.
    pub api_key: Option<String>,
    /// Custom base URL for provider requests.
    pub base_url: Option<String>,
    /// Requested output dimensions, for providers that support truncation.
    pub dimensions: Option<usize>,
    /// Texts per provider request (default: 16).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Attempts per batch before degrading to per-item requests (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause between consecutive batches in milliseconds (default: 100).
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
    /// Pause between per-item fallback requests in milliseconds (default: 50).
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
    /// Split camelCase / snake_case identifiers into words before embedding
    /// (default: true).
    #[serde(default = "default_true")]
    pub segment_identifiers: bool,
    /// Request budget per minute for rate-limited providers.
    pub requests_per_minute: Option<u32>,
    /// Token budget per minute for rate-limited providers.
    pub tokens_per_minute: Option<u32>,
    /// Timeout for connectivity checks in seconds (default: 5).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Timeout for embedding requests in seconds (default: 60).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_embedding_provider() -> String {
    "ollama".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_batch_size() -> usize {
    16
}

fn default_max_retries() -> u32 {
    3
}

fn default_inter_batch_delay_ms() -> u64 {
    100
}

fn default_item_delay_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key: None,
            base_url: None,
            dimensions: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            item_delay_ms: default_item_delay_ms(),
            segment_identifiers: true,
            requests_per_minute: None,
            tokens_per_minute: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Query defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum results per query (default: 10).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Similarity floor in `[0, 1]` (default: 0.3).
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
    /// Fuse keyword results with vector results (default: true).
    #[serde(default = "default_true")]
    pub hybrid: bool,
    /// Apply the multi-signal rerank (default: true).
    #[serde(default = "default_true")]
    pub rerank: bool,
    /// Reciprocal Rank Fusion constant (default: 60).
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,
}

fn default_limit() -> usize {
    10
}

fn default_min_similarity() -> f64 {
    0.3
}

fn default_rrf_k() -> usize {
    60
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            min_similarity: default_min_similarity(),
            hybrid: true,
            rerank: true,
            rrf_k: default_rrf_k(),
        }
    }
}

/// Index storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Database location, relative to the indexed root (default: `.sift/index.db`).
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    /// Build the FTS5 keyword index on first insert (default: true).
    #[serde(default = "default_true")]
    pub lexical: bool,
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".sift/index.db")
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            lexical: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = SiftConfig::default();
        assert_eq!(config.chunker.token_budget, 1500);
        assert_eq!(config.chunker.max_workers, 4);
        assert_eq!(config.embedding.provider, "ollama");
        assert_eq!(config.embedding.max_retries, 3);
        assert!(config.embedding.segment_identifiers);
        assert!(config.embedding.api_key.is_none());
        assert_eq!(config.search.limit, 10);
        assert_eq!(config.search.min_similarity, 0.3);
        assert!(config.search.hybrid);
        assert!(config.search.rerank);
        assert_eq!(config.index.path, PathBuf::from(".sift/index.db"));
        assert!(config.index.lexical);
    }

    #[test]
    fn parse_partial_toml() {
        let toml = r#"
[embedding]
provider = "voyage"
model = "voyage-code-3"
batch_size = 64
requests_per_minute = 300

[search]
hybrid = false
"#;
        let config = SiftConfig::from_toml(toml).unwrap();
        assert_eq!(config.embedding.provider, "voyage");
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.embedding.requests_per_minute, Some(300));
        assert_eq!(config.embedding.max_retries, 3);
        assert!(!config.search.hybrid);
        assert!(config.search.rerank);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = SiftConfig::from_toml("").unwrap();
        assert_eq!(config.chunker.token_budget, 1500);
        assert_eq!(config.embedding.model, "nomic-embed-text");
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = SiftConfig::from_toml("{{invalid}}");
        assert!(result.is_err());
    }
}
