//! Vector storage, hybrid retrieval and the indexing engine.
//!
//! [`VectorIndex`] keeps embedded chunks in SQLite and answers vector,
//! keyword and fused queries. [`rank`] holds the scoring math (RRF,
//! rerank, display scaling). [`Engine`] drives a full indexing run and
//! answers searches on top of both.

pub mod engine;
pub mod rank;
pub mod store;

pub use engine::{content_hash, Engine, IndexOptions, SearchOptions};
pub use store::{IndexStats, VectorIndex};
