//! The embedding provider seam and the factory that picks one from config.

use std::sync::Arc;

use async_trait::async_trait;
use sift_core::{EmbeddingConfig, Result, SiftError};

use crate::hosted::{HostedFlavor, HostedProvider};
use crate::ollama::OllamaProvider;
use crate::text::TaskPrefixes;

/// One vector, tagged with the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub model: String,
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            model: model.into(),
            vector,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// A source of embeddings.
///
/// Implementations are shared across tasks, so they take `&self` and keep
/// any mutable state (rate limiters, clients) behind interior mutability.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in logs and `sift doctor`.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Output dimensionality, when known before the first request.
    fn dimensions(&self) -> Option<usize> {
        None
    }

    /// Whether returned vectors should be scaled to unit length.
    fn normalizes(&self) -> bool {
        true
    }

    /// Query/document markers, for models trained asymmetrically.
    fn task_prefixes(&self) -> Option<TaskPrefixes> {
        None
    }

    /// Whether the provider endpoint answers at all.
    async fn check_connection(&self) -> bool;

    /// Whether the configured model can be used.
    async fn is_model_available(&self) -> bool;

    /// Embed one text as a query or as a document.
    async fn embed(&self, text: &str, is_query: bool) -> Result<Embedding>;

    /// Embed several documents in one request. Output order matches input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;
}

/// Build the provider named by `config.provider`.
///
/// # Errors
///
/// Returns [`SiftError::Config`] for an unknown provider name or a hosted
/// provider without an API key.
///
/// # Examples
///
/// ```
/// use sift_core::EmbeddingConfig;
/// use sift_embed::provider_from_config;
///
/// let provider = provider_from_config(&EmbeddingConfig::default()).unwrap();
/// assert_eq!(provider.name(), "ollama");
/// assert_eq!(provider.model(), "nomic-embed-text");
///
/// let bad = EmbeddingConfig { provider: "carrier-pigeon".into(), ..Default::default() };
/// assert!(provider_from_config(&bad).is_err());
/// ```
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.to_lowercase().as_str() {
        "ollama" => Ok(Arc::new(OllamaProvider::from_config(config)?)),
        "voyage" => Ok(Arc::new(HostedProvider::from_config(HostedFlavor::Voyage, config)?)),
        "openai" => Ok(Arc::new(HostedProvider::from_config(HostedFlavor::OpenAi, config)?)),
        other => Err(SiftError::Config(format!(
            "unknown embedding provider `{other}`: expected ollama, voyage or openai"
        ))),
    }
}
