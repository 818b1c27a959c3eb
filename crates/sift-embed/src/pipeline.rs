//! Batched embedding of chunks with retry, degradation and progress.
//!
//! Batches go to the provider one at a time with a fixed pause between
//! them. A batch that keeps failing is retried with exponential backoff,
//! then split into one request per chunk so a single bad input cannot sink
//! its neighbours. Only fatal errors (configuration, provider unavailable)
//! end a run early; everything else is reported per chunk.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sift_core::{EmbeddingConfig, IndexPhase, ProgressEvent, Result, SiftError, SourceChunk};
use tracing::{debug, info, warn};

use crate::provider::{Embedding, EmbeddingProvider};
use crate::text::document_text;
use crate::vector::normalize;

/// Largest batch the sizer will grow to.
pub const MAX_BATCH_SIZE: usize = 100;

const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Tunables for [`EmbeddingPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: usize,
    /// Total attempts per batch, including the first.
    pub max_retries: u32,
    pub inter_batch_delay: Duration,
    pub item_delay: Duration,
    pub segment_identifiers: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
            item_delay: Duration::from_millis(config.item_delay_ms),
            segment_identifiers: config.segment_identifiers,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&EmbeddingConfig::default())
    }
}

/// Adaptive batch size, shared between the pipeline and its caller.
///
/// # Examples
///
/// ```
/// use sift_embed::BatchSizer;
///
/// let sizer = BatchSizer::new(4);
/// assert_eq!(sizer.shrink(), 2);
/// assert_eq!(sizer.grow(), 3);
/// ```
#[derive(Debug)]
pub struct BatchSizer {
    current: AtomicUsize,
}

impl BatchSizer {
    pub fn new(initial: usize) -> Self {
        Self {
            current: AtomicUsize::new(initial.clamp(1, MAX_BATCH_SIZE)),
        }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    /// Halve the batch size, never below 1. Returns the new size.
    pub fn shrink(&self) -> usize {
        let next = (self.current() / 2).max(1);
        self.current.store(next, Ordering::Relaxed);
        next
    }

    /// Grow by 25%, rounded up and capped at [`MAX_BATCH_SIZE`]. Returns
    /// the new size.
    pub fn grow(&self) -> usize {
        let next = (self.current() * 5).div_ceil(4).min(MAX_BATCH_SIZE);
        self.current.store(next, Ordering::Relaxed);
        next
    }
}

/// A chunk that could not be embedded, and why.
#[derive(Debug, Clone)]
pub struct FailedChunk {
    pub chunk: SourceChunk,
    pub reason: String,
}

/// Result of [`EmbeddingPipeline::generate`].
///
/// Every input chunk ends up in exactly one of `embedded` or `failed`,
/// unless the run was cancelled, in which case the unprocessed tail is
/// dropped.
#[derive(Debug, Default)]
pub struct GenerateOutcome {
    /// Chunks carrying a non-empty vector.
    pub embedded: Vec<SourceChunk>,
    pub failed: Vec<FailedChunk>,
    pub cancelled: bool,
}

/// Sequential, fault-tolerant embedding of chunks.
pub struct EmbeddingPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    options: PipelineOptions,
    sizer: BatchSizer,
}

impl EmbeddingPipeline {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, options: PipelineOptions) -> Self {
        let sizer = BatchSizer::new(options.batch_size);
        Self {
            provider,
            options,
            sizer,
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn sizer(&self) -> &BatchSizer {
        &self.sizer
    }

    /// Embed a batch of document texts, retrying the whole batch with
    /// exponential backoff (1s, 2s, 4s, ...) until `max_retries` attempts
    /// have been made.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error immediately, otherwise the error of the
    /// last attempt.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let attempts = self.options.max_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.provider.embed_batch(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let delay = backoff(attempt);
                    warn!(
                        attempt,
                        of = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "embedding batch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Embed a search query, normalized when the provider asks for it.
    ///
    /// # Errors
    ///
    /// Propagates the provider error, or [`SiftError::Embedding`] for an
    /// empty vector.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedding = self.provider.embed(query, true).await?;
        if embedding.vector.is_empty() {
            return Err(SiftError::Embedding("provider returned an empty query vector".into()));
        }
        Ok(self.finish(embedding.vector))
    }

    /// Embed every chunk. See [`EmbeddingPipeline::generate_with`].
    pub async fn generate(&self, chunks: Vec<SourceChunk>) -> Result<GenerateOutcome> {
        self.generate_with(chunks, &|_| {}, None).await
    }

    /// Embed every chunk, reporting progress after each batch and stopping
    /// between batches once `cancel` is set.
    ///
    /// # Errors
    ///
    /// Only fatal errors are returned. Per-chunk failures are collected in
    /// [`GenerateOutcome::failed`].
    pub async fn generate_with(
        &self,
        chunks: Vec<SourceChunk>,
        progress: &(dyn Fn(ProgressEvent) + Send + Sync),
        cancel: Option<&AtomicBool>,
    ) -> Result<GenerateOutcome> {
        let total = chunks.len();
        let mut remaining = chunks;
        let mut outcome = GenerateOutcome::default();
        let mut expected_dims = self.provider.dimensions();
        let mut done = 0usize;
        let mut batch_number = 0usize;

        while !remaining.is_empty() {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                info!(done, total, "embedding cancelled");
                outcome.cancelled = true;
                break;
            }
            if batch_number > 0 && !self.options.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.options.inter_batch_delay).await;
            }
            batch_number += 1;

            let size = self.sizer.current().min(remaining.len());
            let batch: Vec<SourceChunk> = remaining.drain(..size).collect();
            let texts: Vec<String> = batch
                .iter()
                .map(|c| document_text(c, self.options.segment_identifiers))
                .collect();
            debug!(batch = batch_number, size, "embedding batch");

            match self.embed_batch(&texts).await {
                Ok(embeddings) => {
                    let mut embeddings = embeddings.into_iter();
                    for chunk in batch {
                        let result = embeddings.next().ok_or_else(|| "no vector returned".to_string());
                        self.accept(&mut outcome, &mut expected_dims, chunk, result);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let next = self.sizer.shrink();
                    warn!(
                        batch = batch_number,
                        error = %e,
                        next_batch_size = next,
                        "batch failed after retries, embedding items one by one"
                    );
                    for (i, (chunk, text)) in batch.into_iter().zip(texts).enumerate() {
                        if i > 0 && !self.options.item_delay.is_zero() {
                            tokio::time::sleep(self.options.item_delay).await;
                        }
                        let result = match self.provider.embed(&text, false).await {
                            Ok(embedding) => Ok(embedding),
                            Err(e) if e.is_fatal() => return Err(e),
                            Err(e) => Err(e.to_string()),
                        };
                        self.accept(&mut outcome, &mut expected_dims, chunk, result);
                    }
                }
            }

            done += size;
            progress(ProgressEvent::new(
                IndexPhase::Embedding,
                done,
                total,
                format!("embedded {done}/{total} chunks"),
            ));
        }

        info!(
            embedded = outcome.embedded.len(),
            failed = outcome.failed.len(),
            "embedding finished"
        );
        Ok(outcome)
    }

    fn accept(
        &self,
        outcome: &mut GenerateOutcome,
        expected_dims: &mut Option<usize>,
        mut chunk: SourceChunk,
        result: std::result::Result<Embedding, String>,
    ) {
        let reason = match result {
            Err(reason) => reason,
            Ok(embedding) if embedding.vector.is_empty() => {
                "provider returned an empty vector".to_string()
            }
            Ok(embedding) => match *expected_dims {
                Some(dims) if dims != embedding.dimensions() => format!(
                    "expected {dims} dimensions, got {}",
                    embedding.dimensions()
                ),
                _ => {
                    *expected_dims = Some(embedding.dimensions());
                    chunk.vector = Some(self.finish(embedding.vector));
                    outcome.embedded.push(chunk);
                    return;
                }
            },
        };
        debug!(chunk = %chunk.id, %reason, "chunk not embedded");
        outcome.failed.push(FailedChunk { chunk, reason });
    }

    fn finish(&self, vector: Vec<f32>) -> Vec<f32> {
        if self.provider.normalizes() {
            normalize(vector)
        } else {
            vector
        }
    }
}

fn backoff(failed_attempt: u32) -> Duration {
    BACKOFF_BASE * 2u32.pow(failed_attempt.saturating_sub(1).min(16))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sift_core::ChunkType;
    use tokio::time::Instant;

    use super::*;
    use crate::vector::l2_norm;

    /// A provider whose batch endpoint fails a set number of times, and
    /// which rejects any text containing `BROKEN`.
    struct Stub {
        batch_failures: AtomicUsize,
        fatal: bool,
        batch_calls: Mutex<Vec<Instant>>,
        item_calls: AtomicUsize,
    }

    impl Stub {
        fn new(batch_failures: usize) -> Self {
            Self {
                batch_failures: AtomicUsize::new(batch_failures),
                fatal: false,
                batch_calls: Mutex::new(Vec::new()),
                item_calls: AtomicUsize::new(0),
            }
        }

        fn vector_for(text: &str) -> Vec<f32> {
            if text.contains("EMPTY") {
                Vec::new()
            } else {
                vec![text.len() as f32, 3.0, 4.0]
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for Stub {
        fn name(&self) -> &str {
            "stub"
        }

        fn model(&self) -> &str {
            "stub-model"
        }

        async fn check_connection(&self) -> bool {
            true
        }

        async fn is_model_available(&self) -> bool {
            true
        }

        async fn embed(&self, text: &str, _is_query: bool) -> Result<Embedding> {
            self.item_calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("BROKEN") {
                return Err(SiftError::Embedding("cannot embed".into()));
            }
            Ok(Embedding::new("stub-model", Self::vector_for(text)))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            self.batch_calls.lock().unwrap().push(Instant::now());
            if self.fatal {
                return Err(SiftError::ProviderUnavailable("down".into()));
            }
            let left = self.batch_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.batch_failures.store(left - 1, Ordering::SeqCst);
                return Err(SiftError::Embedding("transient".into()));
            }
            if texts.iter().any(|t| t.contains("BROKEN")) {
                return Err(SiftError::Embedding("bad input in batch".into()));
            }
            Ok(texts
                .iter()
                .map(|t| Embedding::new("stub-model", Self::vector_for(t)))
                .collect())
        }
    }

    fn chunk(i: u32, text: &str) -> SourceChunk {
        SourceChunk::new("src/lib.rs", i * 10 + 1, i * 10 + 5, text.into(), ChunkType::Function, "rust", i)
    }

    fn pipeline(stub: Arc<Stub>, batch_size: usize) -> EmbeddingPipeline {
        EmbeddingPipeline::new(
            stub,
            PipelineOptions {
                batch_size,
                ..PipelineOptions::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn batch_retries_with_exponential_backoff() {
        let stub = Arc::new(Stub::new(2));
        let pipeline = pipeline(stub.clone(), 16);
        let start = Instant::now();

        let texts = vec!["fn a() {}".to_string(), "fn b() {}".to_string()];
        let embeddings = pipeline.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].vector, vec![9.0, 3.0, 4.0]);

        let calls = stub.batch_calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        let offsets: Vec<Duration> = calls.iter().map(|t| *t - start).collect();
        assert_eq!(
            offsets,
            vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(3)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_the_last_error() {
        let stub = Arc::new(Stub::new(10));
        let pipeline = pipeline(stub.clone(), 16);
        let err = pipeline.embed_batch(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, SiftError::Embedding(_)));
        assert_eq!(stub.batch_calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_batch_degrades_to_single_items() {
        let stub = Arc::new(Stub::new(0));
        let pipeline = pipeline(stub.clone(), 4);
        let chunks = vec![
            chunk(0, "fn ok_a() {}"),
            chunk(1, "fn BROKEN() {}"),
            chunk(2, "fn ok_b() {}"),
            chunk(3, "fn ok_c() {}"),
            chunk(4, "fn ok_d() {}"),
        ];

        let outcome = pipeline.generate(chunks).await.unwrap();
        assert_eq!(outcome.embedded.len(), 4);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].chunk.text.contains("BROKEN"));
        assert!(!outcome.cancelled);
        // The first batch of 4 was split into items; the batch size halved.
        assert_eq!(stub.item_calls.load(Ordering::SeqCst), 4);
        assert_eq!(pipeline.sizer().current(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_vectors_are_failures() {
        let stub = Arc::new(Stub::new(0));
        let pipeline = pipeline(stub, 8);
        let outcome = pipeline
            .generate(vec![chunk(0, "fn a() {}"), chunk(1, "// EMPTY")])
            .await
            .unwrap();
        assert_eq!(outcome.embedded.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].reason.contains("empty"));
    }

    #[tokio::test(start_paused = true)]
    async fn embedded_vectors_are_unit_length() {
        let stub = Arc::new(Stub::new(0));
        let pipeline = pipeline(stub, 8);
        let outcome = pipeline.generate(vec![chunk(0, "fn a() {}")]).await.unwrap();
        let vector = outcome.embedded[0].vector.as_ref().unwrap();
        assert!((l2_norm(vector) - 1.0).abs() < 1e-5);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_abort_the_run() {
        let stub = Arc::new(Stub {
            fatal: true,
            ..Stub::new(0)
        });
        let pipeline = pipeline(stub.clone(), 8);
        let result = pipeline.generate(vec![chunk(0, "fn a() {}")]).await;
        assert!(matches!(result, Err(SiftError::ProviderUnavailable(_))));
        assert_eq!(stub.batch_calls.lock().unwrap().len(), 1);
        // No per-item fallback and no shrink after a fatal batch error.
        assert_eq!(stub.item_calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.sizer().current(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_reported_and_cancel_stops_between_batches() {
        let stub = Arc::new(Stub::new(0));
        let pipeline = pipeline(stub, 2);
        let chunks: Vec<SourceChunk> = (0..6).map(|i| chunk(i, "fn f() {}")).collect();
        let cancel = AtomicBool::new(false);
        let events = Mutex::new(Vec::new());

        let outcome = pipeline
            .generate_with(
                chunks,
                &|event| {
                    events.lock().unwrap().push(event.current);
                    if event.current >= 4 {
                        cancel.store(true, Ordering::SeqCst);
                    }
                },
                Some(&cancel),
            )
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.embedded.len(), 4);
        assert_eq!(*events.lock().unwrap(), vec![2, 4]);
    }

    #[test]
    fn sizer_halves_with_a_floor_and_grows_with_a_cap() {
        let sizer = BatchSizer::new(4);
        assert_eq!(sizer.shrink(), 2);
        assert_eq!(sizer.shrink(), 1);
        assert_eq!(sizer.shrink(), 1);
        assert_eq!(sizer.grow(), 2);

        let big = BatchSizer::new(90);
        assert_eq!(big.grow(), 100);
        assert_eq!(big.grow(), 100);
        assert_eq!(BatchSizer::new(500).current(), 100);
        assert_eq!(BatchSizer::new(0).current(), 1);
    }

    #[test]
    fn backoff_doubles_from_one_second() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(4));
    }
}
