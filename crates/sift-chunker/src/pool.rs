//! Bounded parallel chunking across files.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use sift_grammar::Language;

use crate::chunker::{ChunkOutcome, ChunkerSet};

/// One file queued for chunking.
#[derive(Debug, Clone)]
pub struct FileInput {
    /// Path as it should appear in chunk ids.
    pub path: String,
    pub text: String,
    pub language: Language,
}

/// Chunk every file with at most `max_workers` threads.
///
/// Results come back in input order regardless of which worker finished
/// first.
pub fn chunk_files(set: &ChunkerSet, files: &[FileInput], max_workers: usize) -> Vec<ChunkOutcome> {
    let workers = max_workers.clamp(1, files.len().max(1));
    if workers == 1 {
        return files
            .iter()
            .map(|f| set.chunk(&f.path, &f.text, f.language))
            .collect();
    }

    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<Option<ChunkOutcome>>> = Mutex::new(vec![None; files.len()]);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(file) = files.get(index) else {
                    break;
                };
                let outcome = set.chunk(&file.path, &file.text, file.language);
                let mut slots = results.lock().unwrap_or_else(|p| p.into_inner());
                slots[index] = Some(outcome);
            });
        }
    });

    results
        .into_inner()
        .unwrap_or_else(|p| p.into_inner())
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sift_core::ChunkerConfig;
    use sift_grammar::GrammarRegistry;

    use super::*;

    fn input(i: usize) -> FileInput {
        FileInput {
            path: format!("src/f{i}.rs"),
            text: format!("fn f{i}() {{}}\n\nfn g{i}() {{}}\n"),
            language: Language::Rust,
        }
    }

    #[test]
    fn preserves_input_order() {
        let set = ChunkerSet::new(Arc::new(GrammarRegistry::new()), &ChunkerConfig::default());
        let files: Vec<FileInput> = (0..12).map(input).collect();
        let outcomes = chunk_files(&set, &files, 4);
        assert_eq!(outcomes.len(), 12);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.chunks.len(), 2);
            assert_eq!(outcome.chunks[0].file_path, format!("src/f{i}.rs"));
        }
    }

    #[test]
    fn parallel_matches_sequential() {
        let set = ChunkerSet::new(Arc::new(GrammarRegistry::new()), &ChunkerConfig::default());
        let files: Vec<FileInput> = (0..6).map(input).collect();
        let serial: Vec<Vec<String>> = chunk_files(&set, &files, 1)
            .into_iter()
            .map(|o| o.chunks.into_iter().map(|c| c.id).collect())
            .collect();
        let parallel: Vec<Vec<String>> = chunk_files(&set, &files, 3)
            .into_iter()
            .map(|o| o.chunks.into_iter().map(|c| c.id).collect())
            .collect();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn no_files_no_work() {
        let set = ChunkerSet::new(Arc::new(GrammarRegistry::new()), &ChunkerConfig::default());
        assert!(chunk_files(&set, &[], 4).is_empty());
    }
}
