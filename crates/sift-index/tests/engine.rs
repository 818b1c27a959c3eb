use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sift_chunker::FileInput;
use sift_core::{Result, SiftConfig, SiftError};
use sift_embed::text::tokenize;
use sift_embed::{Embedding, EmbeddingProvider};
use sift_grammar::Language;
use sift_index::{Engine, IndexOptions, SearchOptions, VectorIndex};

const DIMS: usize = 64;

/// Hashed bag-of-words vectors: texts sharing words land close together.
struct BagOfWords {
    available: bool,
    dims: usize,
    texts_embedded: AtomicUsize,
}

impl BagOfWords {
    fn new() -> Self {
        Self::with_dims(DIMS)
    }

    fn with_dims(dims: usize) -> Self {
        Self {
            available: true,
            dims,
            texts_embedded: AtomicUsize::new(0),
        }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dims];
        for token in tokenize(text) {
            let h = token
                .bytes()
                .fold(2_166_136_261u32, |h, b| (h ^ u32::from(b)).wrapping_mul(16_777_619));
            v[h as usize % self.dims] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn name(&self) -> &str {
        "bag-of-words"
    }

    fn model(&self) -> &str {
        "bow-64"
    }

    async fn check_connection(&self) -> bool {
        self.available
    }

    async fn is_model_available(&self) -> bool {
        self.available
    }

    async fn embed(&self, text: &str, _is_query: bool) -> Result<Embedding> {
        if text.contains("EXPLODE") {
            return Err(SiftError::Embedding("refused".into()));
        }
        self.texts_embedded.fetch_add(1, Ordering::SeqCst);
        Ok(Embedding::new("bow-64", self.vector(text)))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.iter().any(|t| t.contains("EXPLODE")) {
            return Err(SiftError::Embedding("refused".into()));
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| Embedding::new("bow-64", self.vector(t)))
            .collect())
    }
}

fn config() -> SiftConfig {
    let mut config = SiftConfig::default();
    config.embedding.inter_batch_delay_ms = 0;
    config.embedding.item_delay_ms = 0;
    config.embedding.max_retries = 1;
    config
}

fn engine(provider: Arc<BagOfWords>) -> Engine {
    Engine::new(config(), provider, VectorIndex::in_memory(true).unwrap())
}

fn js(path: &str, text: &str) -> FileInput {
    FileInput {
        path: path.into(),
        text: text.into(),
        language: Language::JavaScript,
    }
}

fn options() -> SearchOptions {
    SearchOptions {
        min_similarity: 0.0,
        ..SearchOptions::from(&SiftConfig::default().search)
    }
}

const GREET_JS: &str = "\
function greetUser(name) {
  return `hello ${name}`;
}

function parseConfig(text) {
  return JSON.parse(text);
}
";

#[tokio::test]
async fn indexes_and_finds_the_relevant_function() {
    let engine = engine(Arc::new(BagOfWords::new()));
    let summary = engine
        .index_files(vec![js("src/greet.js", GREET_JS)], IndexOptions::default(), &|_| {}, None)
        .await
        .unwrap();
    assert!(summary.success);
    assert_eq!(summary.total_files, 1);
    assert_eq!(summary.total_chunks, 2);
    assert_eq!(summary.successful_chunks, 2);
    assert_eq!(summary.failed_chunks, 0);

    let found = engine.search("greet user", &options()).await.unwrap();
    assert!(found.index_ready);
    assert!(found.error.is_none());
    assert!(found.results[0].chunk.text.contains("greetUser"));
    assert_eq!(found.results[0].normalized_score, Some(100.0));
    assert!(found.results[0].re_rank_score.is_some());
    assert_eq!(found.total_results, found.results.len());
}

#[tokio::test]
async fn reindexing_a_file_replaces_all_of_its_rows() {
    let engine = engine(Arc::new(BagOfWords::new()));
    engine
        .reindex_file(js("src/a.js", "function alphaOld() {\n  return 1;\n}\n"))
        .await
        .unwrap();
    assert_eq!(engine.index().stats().unwrap().chunk_count, 1);

    engine
        .reindex_file(js(
            "src/a.js",
            "function betaNew() {\n  return 2;\n}\n\nfunction gammaNew() {\n  return 3;\n}\n",
        ))
        .await
        .unwrap();

    let stored = engine.index().chunks_for_file("src/a.js").unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|c| !c.text.contains("alphaOld")));
    assert!(engine.index().keyword_search("alpha old", 10).unwrap().is_empty());

    let found = engine.search("alpha old", &options()).await.unwrap();
    assert!(found.results.iter().all(|r| !r.chunk.text.contains("alphaOld")));
}

#[tokio::test]
async fn dimension_change_keeps_existing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("index.db");
    let before = "function alphaOld() {\n  return 1;\n}\n";

    let wide = Engine::new(config(), Arc::new(BagOfWords::new()), VectorIndex::open(&db, true).unwrap());
    wide.reindex_file(js("src/a.js", before)).await.unwrap();
    drop(wide);

    let narrow = Engine::new(
        config(),
        Arc::new(BagOfWords::with_dims(8)),
        VectorIndex::open(&db, true).unwrap(),
    );
    let result = narrow
        .reindex_file(js("src/a.js", "function betaNew() {\n  return 2;\n}\n"))
        .await;
    assert!(matches!(
        result,
        Err(SiftError::SchemaMismatch { existing: 64, requested: 8 })
    ));

    let stored = narrow.index().chunks_for_file("src/a.js").unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].text.contains("alphaOld"));
}

#[tokio::test]
async fn unchanged_files_are_skipped_and_vanished_files_removed() {
    let provider = Arc::new(BagOfWords::new());
    let engine = engine(provider.clone());
    let files = vec![
        js("src/greet.js", GREET_JS),
        js("src/other.js", "function other() {\n  return 0;\n}\n"),
    ];
    engine
        .index_files(files.clone(), IndexOptions::default(), &|_| {}, None)
        .await
        .unwrap();
    let embedded = provider.texts_embedded.load(Ordering::SeqCst);
    assert_eq!(embedded, 3);

    let again = engine
        .index_files(files.clone(), IndexOptions::default(), &|_| {}, None)
        .await
        .unwrap();
    assert!(again.success);
    assert_eq!(again.total_chunks, 0);
    assert_eq!(provider.texts_embedded.load(Ordering::SeqCst), embedded);

    engine
        .index_files(vec![files[0].clone()], IndexOptions::default(), &|_| {}, None)
        .await
        .unwrap();
    assert_eq!(engine.index().indexed_files().unwrap(), vec!["src/greet.js"]);
    assert_eq!(engine.index().stats().unwrap().chunk_count, 2);

    let full = engine
        .index_files(vec![files[0].clone()], IndexOptions { full: true }, &|_| {}, None)
        .await
        .unwrap();
    assert_eq!(full.total_chunks, 2);
}

#[tokio::test]
async fn unavailable_provider_aborts_before_embedding() {
    let provider = Arc::new(BagOfWords {
        available: false,
        ..BagOfWords::new()
    });
    let engine = engine(provider.clone());
    let result = engine
        .index_files(vec![js("src/greet.js", GREET_JS)], IndexOptions::default(), &|_| {}, None)
        .await;
    assert!(matches!(result, Err(SiftError::ProviderUnavailable(_))));
    assert_eq!(provider.texts_embedded.load(Ordering::SeqCst), 0);
    assert_eq!(engine.index().stats().unwrap().chunk_count, 0);
}

#[tokio::test]
async fn search_before_indexing_is_not_ready() {
    let engine = engine(Arc::new(BagOfWords::new()));
    let summary = engine.search("anything", &options()).await.unwrap();
    assert!(!summary.index_ready);
    assert!(summary.results.is_empty());
    assert!(summary.error.is_some());
}

#[tokio::test]
async fn failed_chunks_are_reported_and_retried_next_run() {
    let engine = engine(Arc::new(BagOfWords::new()));
    let src = "\
function fine() {
  return 1;
}

function broken() {
  return 'EXPLODE';
}
";
    let summary = engine
        .index_files(vec![js("src/mixed.js", src)], IndexOptions::default(), &|_| {}, None)
        .await
        .unwrap();
    assert!(!summary.success);
    assert_eq!(summary.total_chunks, 2);
    assert_eq!(summary.successful_chunks, 1);
    assert_eq!(summary.failed_chunks, 1);
    assert!(summary.errors.iter().any(|e| e.starts_with("src/mixed.js:")));
    // No hash recorded, so the next run tries the file again.
    assert_eq!(engine.index().file_hash("src/mixed.js").unwrap(), None);
}

#[tokio::test]
async fn progress_covers_every_phase() {
    use std::sync::Mutex;

    use sift_core::IndexPhase;

    let engine = engine(Arc::new(BagOfWords::new()));
    let phases = Mutex::new(Vec::new());
    engine
        .index_files(
            vec![js("src/greet.js", GREET_JS)],
            IndexOptions::default(),
            &|event| phases.lock().unwrap().push(event.phase),
            None,
        )
        .await
        .unwrap();
    let phases = phases.into_inner().unwrap();
    for phase in [
        IndexPhase::Preflight,
        IndexPhase::Chunking,
        IndexPhase::Embedding,
        IndexPhase::Storing,
        IndexPhase::Done,
    ] {
        assert!(phases.contains(&phase), "missing {phase}");
    }
    assert_eq!(phases.last(), Some(&IndexPhase::Done));
}
