//! Hosted embedding APIs speaking the `/embeddings` wire format.
//!
//! Voyage and OpenAI share the request/response shape and differ only in
//! how asymmetric inputs and output truncation are requested. Both are
//! throttled through a [`RateLimiter`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sift_core::{EmbeddingConfig, Result, SiftError};
use tracing::debug;

use crate::provider::{Embedding, EmbeddingProvider};
use crate::rate_limit::RateLimiter;

/// Model name the config defaults to; hosted providers replace it with
/// their own default.
const LOCAL_DEFAULT_MODEL: &str = "nomic-embed-text";

/// Which hosted API to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostedFlavor {
    Voyage,
    OpenAi,
}

impl HostedFlavor {
    pub fn name(self) -> &'static str {
        match self {
            HostedFlavor::Voyage => "voyage",
            HostedFlavor::OpenAi => "openai",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            HostedFlavor::Voyage => "https://api.voyageai.com/v1",
            HostedFlavor::OpenAi => "https://api.openai.com/v1",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            HostedFlavor::Voyage => "voyage-code-3",
            HostedFlavor::OpenAi => "text-embedding-3-small",
        }
    }

    fn key_var(self) -> &'static str {
        match self {
            HostedFlavor::Voyage => "VOYAGE_API_KEY",
            HostedFlavor::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Published default limits, used when config sets none.
    fn default_limits(self) -> (u32, u32) {
        match self {
            HostedFlavor::Voyage => (300, 1_000_000),
            HostedFlavor::OpenAi => (3_000, 1_000_000),
        }
    }
}

/// Client for a hosted embedding API.
///
/// # Examples
///
/// ```
/// use sift_embed::hosted::{HostedFlavor, HostedProvider};
/// use sift_embed::EmbeddingProvider;
///
/// let provider = HostedProvider::new(HostedFlavor::Voyage, "test-key");
/// assert_eq!(provider.model(), "voyage-code-3");
/// ```
pub struct HostedProvider {
    flavor: HostedFlavor,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: Option<usize>,
    limiter: RateLimiter,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl std::fmt::Debug for HostedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedProvider")
            .field("flavor", &self.flavor)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimension: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl HostedProvider {
    /// A provider using the flavor's default endpoint and model.
    pub fn new(flavor: HostedFlavor, api_key: &str) -> Self {
        let (rpm, tpm) = flavor.default_limits();
        Self {
            flavor,
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: flavor.default_base_url().to_string(),
            model: flavor.default_model().to_string(),
            dimensions: None,
            limiter: RateLimiter::new(Some(rpm), Some(tpm)),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Build from config. The key falls back to the flavor's env var.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Config`] if no API key is available.
    pub fn from_config(flavor: HostedFlavor, config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(flavor.key_var()).ok())
            .ok_or_else(|| {
                SiftError::Config(format!(
                    "embedding API key not found: set embedding.api_key in .sift.toml or {} env var",
                    flavor.key_var()
                ))
            })?;

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SiftError::Config(format!("failed to build HTTP client: {e}")))?;

        let model = if config.model.is_empty() || config.model == LOCAL_DEFAULT_MODEL {
            flavor.default_model().to_string()
        } else {
            config.model.clone()
        };
        let (rpm, tpm) = flavor.default_limits();

        Ok(Self {
            flavor,
            client,
            api_key,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(flavor.default_base_url())
                .trim_end_matches('/')
                .to_string(),
            model,
            dimensions: config.dimensions,
            limiter: RateLimiter::new(
                Some(config.requests_per_minute.unwrap_or(rpm)),
                Some(config.tokens_per_minute.unwrap_or(tpm)),
            ),
            connect_timeout,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    fn request_body<'a>(&'a self, input: &'a [String], is_query: bool) -> EmbedRequest<'a> {
        match self.flavor {
            HostedFlavor::Voyage => EmbedRequest {
                model: &self.model,
                input,
                input_type: Some(if is_query { "query" } else { "document" }),
                output_dimension: self.dimensions,
                dimensions: None,
            },
            HostedFlavor::OpenAi => EmbedRequest {
                model: &self.model,
                input,
                input_type: None,
                output_dimension: None,
                dimensions: self.dimensions,
            },
        }
    }

    async fn request(&self, input: &[String], is_query: bool) -> Result<Vec<Vec<f32>>> {
        let estimated: usize = input.iter().map(|t| t.chars().count().div_ceil(4)).sum();
        self.limiter.acquire(estimated).await;

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .timeout(self.request_timeout)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(input, is_query))
            .send()
            .await
            .map_err(|e| SiftError::Embedding(format!("request to {} failed: {e}", self.base_url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(status_error(self.flavor, status, &body));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| SiftError::Embedding(format!("failed to parse response: {e}")))?;
        let vectors = ordered_vectors(parsed);
        if vectors.len() != input.len() {
            return Err(SiftError::Embedding(format!(
                "expected {} embeddings, got {}",
                input.len(),
                vectors.len()
            )));
        }
        debug!(count = input.len(), provider = self.flavor.name(), "hosted embed");
        Ok(vectors)
    }
}

fn status_error(flavor: HostedFlavor, status: StatusCode, body: &str) -> SiftError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SiftError::Config(format!(
            "{} rejected the API key ({status}): {body}",
            flavor.name()
        )),
        StatusCode::NOT_FOUND => {
            SiftError::ProviderUnavailable(format!("{} returned {status}: {body}", flavor.name()))
        }
        _ => SiftError::Embedding(format!("{} API returned {status}: {body}", flavor.name())),
    }
}

fn ordered_vectors(mut response: EmbedResponse) -> Vec<Vec<f32>> {
    response.data.sort_by_key(|item| item.index);
    response.data.into_iter().map(|item| item.embedding).collect()
}

#[async_trait]
impl EmbeddingProvider for HostedProvider {
    fn name(&self) -> &str {
        self.flavor.name()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    async fn check_connection(&self) -> bool {
        self.client
            .get(format!("{}/models", self.base_url))
            .timeout(self.connect_timeout)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .is_ok()
    }

    /// Hosted APIs have no listing that covers every model, so a single
    /// probe embedding stands in for the check.
    async fn is_model_available(&self) -> bool {
        self.request(&["ping".to_string()], true).await.is_ok()
    }

    async fn embed(&self, text: &str, is_query: bool) -> Result<Embedding> {
        let mut vectors = self.request(&[text.to_string()], is_query).await?;
        let vector = vectors.pop().unwrap_or_default();
        Ok(Embedding::new(self.model.clone(), vector))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .request(texts, false)
            .await?
            .into_iter()
            .map(|v| Embedding::new(self.model.clone(), v))
            .collect())
    }
}
