//! Local embeddings through an Ollama server.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::{EmbeddingConfig, Result, SiftError};
use tracing::debug;

use crate::provider::{Embedding, EmbeddingProvider};
use crate::text::TaskPrefixes;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client for Ollama's `/api/embed` endpoint.
///
/// # Examples
///
/// ```
/// use sift_embed::ollama::OllamaProvider;
/// use sift_embed::EmbeddingProvider;
///
/// let provider = OllamaProvider::new("nomic-embed-text");
/// assert_eq!(provider.model(), "nomic-embed-text");
/// assert!(provider.task_prefixes().is_some());
/// ```
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: Option<usize>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaProvider {
    /// A provider for `model` on the default local endpoint.
    pub fn new(model: &str) -> Self {
        Self::from_config(&EmbeddingConfig {
            model: model.to_string(),
            ..EmbeddingConfig::default()
        })
        .unwrap_or_else(|_| Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.to_string(),
            dimensions: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
        })
    }

    /// # Errors
    ///
    /// Returns [`SiftError::Config`] if the HTTP client cannot be built.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SiftError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            connect_timeout,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    async fn installed_models(&self) -> Option<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(self.connect_timeout)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let tags: TagsResponse = response.json().await.ok()?;
        Some(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn request(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let count = input.len();
        let request = EmbedRequest {
            model: &self.model,
            input,
            dimensions: self.dimensions,
        };
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            // Reachability is settled by the preflight checks; a refused or
            // timed-out request here is transient and goes through retry.
            .map_err(|e| SiftError::Embedding(format!("request to {} failed: {e}", self.base_url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(SiftError::ProviderUnavailable(format!(
                    "model `{}` is not installed (run `ollama pull {}`): {body}",
                    self.model, self.model
                )));
            }
            return Err(SiftError::Embedding(format!("Ollama returned {status}: {body}")));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| SiftError::Embedding(format!("failed to parse response: {e}")))?;
        if parsed.embeddings.len() != count {
            return Err(SiftError::Embedding(format!(
                "expected {count} embeddings, got {}",
                parsed.embeddings.len()
            )));
        }
        debug!(count, model = %self.model, "ollama embed");
        Ok(parsed.embeddings)
    }
}

/// Whether an installed tag such as `nomic-embed-text:latest` satisfies the
/// configured model name.
fn tag_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || installed
            .strip_prefix(wanted)
            .is_some_and(|rest| rest.starts_with(':'))
        || wanted
            .strip_suffix(":latest")
            .is_some_and(|base| installed == base)
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    fn task_prefixes(&self) -> Option<TaskPrefixes> {
        self.model.contains("nomic").then(TaskPrefixes::nomic)
    }

    async fn check_connection(&self) -> bool {
        self.installed_models().await.is_some()
    }

    async fn is_model_available(&self) -> bool {
        self.installed_models()
            .await
            .is_some_and(|models| models.iter().any(|m| tag_matches(m, &self.model)))
    }

    async fn embed(&self, text: &str, is_query: bool) -> Result<Embedding> {
        let input = match self.task_prefixes() {
            Some(prefixes) => prefixes.apply(text, is_query),
            None => text.to_string(),
        };
        let mut vectors = self.request(vec![input]).await?;
        let vector = vectors.pop().unwrap_or_default();
        Ok(Embedding::new(self.model.clone(), vector))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let input = match self.task_prefixes() {
            Some(prefixes) => texts.iter().map(|t| prefixes.apply(t, false)).collect(),
            None => texts.to_vec(),
        };
        Ok(self
            .request(input)
            .await?
            .into_iter()
            .map(|v| Embedding::new(self.model.clone(), v))
            .collect())
    }
}
