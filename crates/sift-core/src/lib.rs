//! Core types, configuration, and error handling for sift.
//!
//! This crate provides the shared foundation used by all other sift crates:
//! - [`SiftError`]: the unified error type, built on `thiserror`
//! - [`SiftConfig`]: configuration loaded from `.sift.toml`
//! - Shared types: [`SourceChunk`], [`ChunkType`], [`SearchResult`],
//!   [`ProgressEvent`], [`IndexRunSummary`], [`SearchSummary`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{ChunkerConfig, EmbeddingConfig, IndexConfig, SearchConfig, SiftConfig};
pub use error::SiftError;
pub use types::{
    chunk_id, ChunkType, IndexPhase, IndexRunSummary, OutputFormat, ProgressEvent, SearchResult,
    SearchSummary, SourceChunk,
};

/// A convenience `Result` type for sift operations.
pub type Result<T> = std::result::Result<T, SiftError>;
