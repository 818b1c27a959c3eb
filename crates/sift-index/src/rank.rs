//! Score fusion, reranking and display scaling.

use std::collections::{HashMap, HashSet};

use sift_core::{ChunkType, SearchResult};
use sift_embed::text::tokenize;

const SEMANTIC_WEIGHT: f64 = 0.50;
const OVERLAP_WEIGHT: f64 = 0.30;
const PATH_WEIGHT: f64 = 0.10;
const TYPE_WEIGHT: f64 = 0.10;

/// Similarity of two unit vectors from their squared L2 distance.
///
/// # Examples
///
/// ```
/// use sift_index::rank::similarity_from_squared_distance;
///
/// assert_eq!(similarity_from_squared_distance(0.0), 1.0);
/// assert_eq!(similarity_from_squared_distance(1.0), 0.5);
/// assert_eq!(similarity_from_squared_distance(4.0), 0.0);
/// ```
pub fn similarity_from_squared_distance(squared_distance: f64) -> f64 {
    (1.0 - squared_distance / 2.0).clamp(0.0, 1.0)
}

/// Fuse ranked lists with Reciprocal Rank Fusion.
///
/// Each result scores `1 / (k + rank)` (rank starting at 1) in every list
/// that contains it, summed. Results are keyed by chunk id; the first list
/// a result appears in supplies its fields. Output is sorted by fused score,
/// highest first, with `fusion_score` set.
pub fn reciprocal_rank_fusion(lists: &[Vec<SearchResult>], k: usize) -> Vec<SearchResult> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut order: Vec<SearchResult> = Vec::new();

    for list in lists {
        for (rank, result) in list.iter().enumerate() {
            let id = &result.chunk.id;
            let contribution = 1.0 / (k as f64 + rank as f64 + 1.0);
            match scores.get_mut(id) {
                Some(score) => *score += contribution,
                None => {
                    scores.insert(id.clone(), contribution);
                    order.push(result.clone());
                }
            }
        }
    }

    let mut fused: Vec<SearchResult> = order
        .into_iter()
        .map(|mut result| {
            result.fusion_score = scores.get(&result.chunk.id).copied();
            result
        })
        .collect();
    fused.sort_by(|a, b| {
        b.fusion_score
            .partial_cmp(&a.fusion_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused
}

/// Fixed preference for chunk kinds: callables first, module plumbing last.
pub fn chunk_type_priority(chunk_type: ChunkType) -> f64 {
    match chunk_type {
        ChunkType::Function | ChunkType::Method => 1.0,
        ChunkType::Class | ChunkType::Component => 0.9,
        ChunkType::Interface | ChunkType::Type | ChunkType::Namespace => 0.8,
        ChunkType::Computed | ChunkType::Watch | ChunkType::Lifecycle | ChunkType::Data => 0.75,
        ChunkType::Jsx | ChunkType::Template | ChunkType::Script => 0.6,
        ChunkType::Variable => 0.5,
        ChunkType::Block | ChunkType::Css | ChunkType::Unknown => 0.4,
        ChunkType::Import | ChunkType::Export => 0.1,
    }
}

/// Fraction of distinct query tokens that occur in `tokens`.
fn overlap_ratio(query: &HashSet<String>, tokens: &HashSet<String>) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let hits = query.iter().filter(|t| tokens.contains(*t)).count();
    hits as f64 / query.len() as f64
}

fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Rescore results with semantic, lexical, path and type signals, then sort
/// by the new score. Ties keep their incoming order.
///
/// # Examples
///
/// ```
/// use sift_core::{ChunkType, SearchResult, SourceChunk};
/// use sift_index::rank::rerank;
///
/// let chunk = |path: &str, text: &str, t| SourceChunk::new(path, 1, 3, text.into(), t, "rust", 0);
/// let results = vec![
///     SearchResult::new(chunk("src/io.rs", "use std::io;", ChunkType::Import), 0.8),
///     SearchResult::new(chunk("src/auth.rs", "fn check_token() {}", ChunkType::Function), 0.7),
/// ];
/// let ranked = rerank("check token", results);
/// assert_eq!(ranked[0].chunk.file_path, "src/auth.rs");
/// ```
pub fn rerank(query: &str, results: Vec<SearchResult>) -> Vec<SearchResult> {
    let query_tokens = token_set(query);
    let mut scored: Vec<SearchResult> = results
        .into_iter()
        .map(|mut result| {
            let overlap = overlap_ratio(&query_tokens, &token_set(&result.chunk.text));
            let path = overlap_ratio(&query_tokens, &token_set(&result.chunk.file_path));
            let priority = chunk_type_priority(result.chunk.chunk_type);
            result.re_rank_score = Some(
                SEMANTIC_WEIGHT * result.similarity
                    + OVERLAP_WEIGHT * overlap
                    + PATH_WEIGHT * path
                    + TYPE_WEIGHT * priority,
            );
            result
        })
        .collect();
    scored.sort_by(|a, b| {
        b.re_rank_score
            .partial_cmp(&a.re_rank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
}

/// Min-max scale similarity into `normalized_score` (0-100) within one
/// result set. Order is untouched. A set whose similarities are all equal
/// scores 100 throughout.
pub fn normalize_for_display(results: &mut [SearchResult]) {
    let (min, max) = results.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
        (lo.min(r.similarity), hi.max(r.similarity))
    });
    let range = max - min;
    for result in results.iter_mut() {
        let score = if range > f64::EPSILON {
            (result.similarity - min) / range * 100.0
        } else {
            100.0
        };
        result.normalized_score = Some(score);
    }
}
