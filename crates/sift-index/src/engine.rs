//! Indexing and search orchestration.
//!
//! An indexing run goes: skip unchanged files, preflight the provider,
//! chunk in parallel, embed sequentially, then replace each file's rows.
//! Per-file and per-chunk problems land in the [`IndexRunSummary`]; only
//! fatal errors abort.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use sift_chunker::{chunk_files, ChunkerSet, FileInput};
use sift_core::{
    IndexPhase, IndexRunSummary, ProgressEvent, Result, SearchConfig, SearchSummary, SiftConfig,
    SiftError, SourceChunk,
};
use sift_embed::{EmbeddingPipeline, EmbeddingProvider, PipelineOptions};
use sift_grammar::GrammarRegistry;
use tracing::{debug, info, warn};

use crate::rank::{normalize_for_display, rerank};
use crate::store::VectorIndex;

/// Per-query settings, defaulting to the `[search]` config section.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub min_similarity: f64,
    pub hybrid: bool,
    pub rerank: bool,
    pub rrf_k: usize,
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            limit: config.limit,
            min_similarity: config.min_similarity,
            hybrid: config.hybrid,
            rerank: config.rerank,
            rrf_k: config.rrf_k,
        }
    }
}

/// Per-run indexing settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Clear the collection and re-embed everything.
    pub full: bool,
}

/// Hex SHA-256 of a file's content.
///
/// # Examples
///
/// ```
/// use sift_index::engine::content_hash;
///
/// assert_eq!(content_hash("").len(), 64);
/// assert_ne!(content_hash("a"), content_hash("b"));
/// ```
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Chunker, embedding pipeline and vector index wired together.
pub struct Engine {
    config: SiftConfig,
    chunkers: ChunkerSet,
    pipeline: EmbeddingPipeline,
    index: VectorIndex,
}

impl Engine {
    pub fn new(config: SiftConfig, provider: Arc<dyn EmbeddingProvider>, index: VectorIndex) -> Self {
        let registry = Arc::new(GrammarRegistry::new());
        let chunkers = ChunkerSet::new(registry, &config.chunker);
        let pipeline = EmbeddingPipeline::new(provider, PipelineOptions::from_config(&config.embedding));
        Self {
            config,
            chunkers,
            pipeline,
            index,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn pipeline(&self) -> &EmbeddingPipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &SiftConfig {
        &self.config
    }

    /// Confirm the provider answers and has the configured model.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::ProviderUnavailable`] if either check fails.
    pub async fn preflight(&self) -> Result<()> {
        let provider = self.pipeline.provider();
        if !provider.check_connection().await {
            return Err(SiftError::ProviderUnavailable(format!(
                "cannot connect to the {} embedding provider",
                provider.name()
            )));
        }
        if !provider.is_model_available().await {
            return Err(SiftError::ProviderUnavailable(format!(
                "model `{}` is not available from {}",
                provider.model(),
                provider.name()
            )));
        }
        Ok(())
    }

    /// Bring the index in line with `files`, the complete discovered set.
    ///
    /// Unchanged files are skipped and indexed files missing from `files`
    /// are removed.
    ///
    /// # Errors
    ///
    /// Only fatal errors are returned: an unreachable provider, bad
    /// configuration, a dimensionality mismatch or a database failure.
    pub async fn index_files(
        &self,
        files: Vec<FileInput>,
        options: IndexOptions,
        progress: &(dyn Fn(ProgressEvent) + Send + Sync),
        cancel: Option<&AtomicBool>,
    ) -> Result<IndexRunSummary> {
        if options.full {
            info!("full rebuild requested, clearing index");
            self.index.clear()?;
        }

        {
            let discovered: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
            for stale in self.index.indexed_files()? {
                if !discovered.contains(stale.as_str()) {
                    debug!(file = %stale, "removing vanished file");
                    self.index.delete_file(&stale)?;
                }
            }
        }

        let total_files = files.len();
        let mut changed = Vec::new();
        let mut hashes = HashMap::new();
        for file in files {
            let hash = content_hash(&file.text);
            if self.index.file_hash(&file.path)?.as_deref() == Some(hash.as_str()) {
                continue;
            }
            hashes.insert(file.path.clone(), hash);
            changed.push(file);
        }
        info!(total_files, changed = changed.len(), "files to index");

        let mut summary = self.run(changed, &hashes, progress, cancel).await?;
        summary.total_files = total_files;
        Ok(summary)
    }

    /// Re-chunk and re-embed one file, replacing all of its rows.
    ///
    /// # Errors
    ///
    /// Same as [`index_files`](Self::index_files).
    pub async fn reindex_file(&self, file: FileInput) -> Result<IndexRunSummary> {
        let hashes = HashMap::from([(file.path.clone(), content_hash(&file.text))]);
        self.run(vec![file], &hashes, &|_| {}, None).await
    }

    async fn run(
        &self,
        files: Vec<FileInput>,
        hashes: &HashMap<String, String>,
        progress: &(dyn Fn(ProgressEvent) + Send + Sync),
        cancel: Option<&AtomicBool>,
    ) -> Result<IndexRunSummary> {
        let started = Instant::now();
        let mut summary = IndexRunSummary {
            total_files: files.len(),
            ..IndexRunSummary::default()
        };
        if files.is_empty() {
            summary.success = true;
            progress(ProgressEvent::new(IndexPhase::Done, 0, 0, "index is up to date"));
            return Ok(summary);
        }

        progress(ProgressEvent::new(IndexPhase::Preflight, 0, 1, "checking embedding provider"));
        self.preflight().await?;

        progress(ProgressEvent::new(IndexPhase::Chunking, 0, files.len(), "chunking files"));
        let outcomes = chunk_files(&self.chunkers, &files, self.config.chunker.max_workers);
        let mut chunks: Vec<SourceChunk> = Vec::new();
        let mut per_file: HashMap<String, usize> = HashMap::new();
        for (file, outcome) in files.iter().zip(outcomes) {
            if let Some(error) = &outcome.error {
                summary
                    .errors
                    .push(format!("{}: {error} (indexed with {} chunking)", file.path, outcome.parse_method));
            }
            per_file.insert(file.path.clone(), outcome.chunks.len());
            chunks.extend(outcome.chunks);
        }
        summary.total_chunks = chunks.len();
        progress(ProgressEvent::new(
            IndexPhase::Chunking,
            files.len(),
            files.len(),
            format!("{} chunks from {} files", chunks.len(), files.len()),
        ));

        let generated = self.pipeline.generate_with(chunks, progress, cancel).await?;
        summary.cancelled = generated.cancelled;

        // Refuse the whole run before any file's old rows are touched.
        let requested = generated
            .embedded
            .iter()
            .find_map(|c| c.vector.as_ref().map(Vec::len).filter(|&n| n > 0));
        if let (Some(existing), Some(requested)) = (self.index.dimensions()?, requested) {
            if existing != requested {
                return Err(SiftError::SchemaMismatch {
                    existing,
                    requested,
                });
            }
        }

        let mut embedded: HashMap<String, Vec<SourceChunk>> = HashMap::new();
        for chunk in generated.embedded {
            embedded.entry(chunk.file_path.clone()).or_default().push(chunk);
        }
        let mut failed: HashMap<String, usize> = HashMap::new();
        for item in &generated.failed {
            *failed.entry(item.chunk.file_path.clone()).or_default() += 1;
            summary.errors.push(format!("{}: {}", item.chunk.id, item.reason));
        }
        summary.failed_chunks = generated.failed.len();

        for (done, file) in files.iter().enumerate() {
            let expected = per_file.get(&file.path).copied().unwrap_or(0);
            let stored = embedded.remove(&file.path).unwrap_or_default();
            let failures = failed.get(&file.path).copied().unwrap_or(0);
            if stored.len() + failures < expected {
                // Cancelled before this file was fully embedded; leave it for
                // the next run.
                continue;
            }

            summary.successful_chunks += self.index.replace_file(&file.path, &stored)?;
            if failures == 0 {
                if let Some(hash) = hashes.get(&file.path) {
                    self.index.record_file(&file.path, hash)?;
                }
            } else {
                warn!(file = %file.path, failures, "file partially indexed");
            }
            progress(ProgressEvent::new(
                IndexPhase::Storing,
                done + 1,
                files.len(),
                file.path.clone(),
            ));
        }

        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        summary.success = summary.failed_chunks == 0 && !summary.cancelled;
        progress(ProgressEvent::new(
            IndexPhase::Done,
            summary.successful_chunks,
            summary.total_chunks,
            "indexing finished",
        ));
        info!(
            chunks = summary.total_chunks,
            stored = summary.successful_chunks,
            failed = summary.failed_chunks,
            duration_ms = summary.duration_ms,
            "indexing run complete"
        );
        Ok(summary)
    }

    /// Answer a query.
    ///
    /// An empty collection yields a summary with `index_ready == false`.
    /// Non-fatal embedding failures are reported in `error`.
    ///
    /// # Errors
    ///
    /// Returns fatal provider and database errors.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchSummary> {
        let started = Instant::now();
        let mut summary = SearchSummary {
            query: query.to_string(),
            results: Vec::new(),
            total_results: 0,
            search_time_ms: 0,
            index_ready: true,
            error: None,
        };

        if !self.index.is_ready()? {
            summary.index_ready = false;
            summary.error = Some(SiftError::IndexNotReady.to_string());
            return Ok(summary);
        }

        let vector = match self.pipeline.embed_query(query).await {
            Ok(vector) => vector,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                summary.error = Some(e.to_string());
                return Ok(summary);
            }
        };

        let candidates = if options.rerank {
            options.limit.saturating_mul(2)
        } else {
            options.limit
        };
        let mut results = if options.hybrid {
            self.index
                .hybrid_search(query, &vector, candidates, options.min_similarity, options.rrf_k)?
        } else {
            self.index
                .vector_search(&vector, candidates, options.min_similarity)?
        };
        if options.rerank {
            results = rerank(query, results);
        }
        results.truncate(options.limit);
        normalize_for_display(&mut results);

        summary.total_results = results.len();
        summary.results = results;
        summary.search_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(query, results = summary.total_results, "search complete");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex() {
        let hash = content_hash("fn main() {}");
        assert_eq!(hash, content_hash("fn main() {}"));
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn search_options_follow_config() {
        let options = SearchOptions::from(&SearchConfig::default());
        assert_eq!(options.limit, 10);
        assert_eq!(options.rrf_k, 60);
        assert!(options.hybrid && options.rerank);
    }
}
