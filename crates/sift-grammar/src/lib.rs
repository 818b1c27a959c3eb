//! Language detection and the grammar registry.
//!
//! [`Language`] maps file extensions to tree-sitter grammars;
//! [`GrammarRegistry`] loads each grammar once, on first use, and shares it
//! read-only across concurrent parses.

mod language;
mod registry;

pub use language::Language;
pub use registry::{Grammar, GrammarRegistry};
