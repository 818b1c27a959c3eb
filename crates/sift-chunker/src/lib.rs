//! AST-aware source chunking.
//!
//! Parses a file with its tree-sitter grammar, finds breakpoints with a
//! depth-bounded walk driven by per-language [node tables](tables), and
//! turns them into contiguous, classified [`SourceChunk`](sift_core::SourceChunk)s:
//! import runs collapse into one chunk, adjacent variable declarations
//! merge, and oversized chunks split to fit a token budget. Files without a
//! grammar go through a line-oriented [`FallbackChunker`].

pub mod breakpoints;
pub mod chunker;
pub mod classify;
pub mod pool;
pub mod spans;
pub mod tables;
mod vue;

pub use chunker::{AstChunker, ChunkOutcome, Chunker, ChunkerSet, FallbackChunker, ParseMethod};
pub use pool::{chunk_files, FileInput};
pub use spans::estimate_tokens;
