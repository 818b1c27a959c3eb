//! Embedding providers and the batching pipeline.
//!
//! Chunks are rendered into a context-rich [document text](text), sent to
//! an [`EmbeddingProvider`] (local Ollama or a hosted API) in sequential
//! batches, and come back carrying unit-length vectors. Transient failures
//! are retried with backoff and then isolated per chunk by the
//! [`EmbeddingPipeline`].

pub mod hosted;
pub mod ollama;
pub mod pipeline;
pub mod provider;
pub mod rate_limit;
pub mod text;
pub mod vector;

pub use pipeline::{BatchSizer, EmbeddingPipeline, FailedChunk, GenerateOutcome, PipelineOptions};
pub use provider::{provider_from_config, Embedding, EmbeddingProvider};
pub use rate_limit::RateLimiter;
pub use text::TaskPrefixes;
