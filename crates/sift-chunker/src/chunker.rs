//! The chunker contract and its AST and fallback variants.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sift_core::{ChunkType, ChunkerConfig, SourceChunk};
use sift_grammar::{GrammarRegistry, Language};
use tracing::{debug, warn};

use crate::breakpoints::{self, Breakpoint};
use crate::spans::{self, SourceLines};

/// How a file's chunks were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMethod {
    Ast,
    Fallback,
}

impl fmt::Display for ParseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMethod::Ast => f.write_str("ast"),
            ParseMethod::Fallback => f.write_str("fallback"),
        }
    }
}

/// Result of chunking one file.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub chunks: Vec<SourceChunk>,
    pub parse_success: bool,
    pub parse_method: ParseMethod,
    /// Why parsing failed, or, after a degrade to the fallback chunker, why
    /// the AST chunker gave up.
    pub error: Option<String>,
}

impl ChunkOutcome {
    fn parsed(chunks: Vec<SourceChunk>, parse_method: ParseMethod) -> Self {
        Self {
            chunks,
            parse_success: true,
            parse_method,
            error: None,
        }
    }

    fn failed(parse_method: ParseMethod, error: impl Into<String>) -> Self {
        Self {
            chunks: Vec::new(),
            parse_success: false,
            parse_method,
            error: Some(error.into()),
        }
    }
}

/// Splits one file's text into chunks.
///
/// Implementations are synchronous and hold no per-parse state, so one
/// chunker can serve many threads.
pub trait Chunker: Send + Sync {
    /// Which variant this is.
    fn method(&self) -> ParseMethod;

    /// Chunk `text`. Never fails outright: problems are reported through
    /// [`ChunkOutcome::parse_success`] and [`ChunkOutcome::error`].
    fn chunk(
        &self,
        file_path: &str,
        text: &str,
        language: Language,
        token_budget: usize,
    ) -> ChunkOutcome;
}

/// Syntax-tree based chunker.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use sift_chunker::{AstChunker, Chunker};
/// use sift_core::ChunkType;
/// use sift_grammar::{GrammarRegistry, Language};
///
/// let chunker = AstChunker::new(Arc::new(GrammarRegistry::new()));
/// let src = "use std::io;\n\nfn main() {\n    println!(\"hi\");\n}\n";
/// let outcome = chunker.chunk("src/main.rs", src, Language::Rust, 1500);
/// assert!(outcome.parse_success);
/// assert_eq!(outcome.chunks.len(), 2);
/// assert_eq!(outcome.chunks[1].chunk_type, ChunkType::Function);
/// ```
pub struct AstChunker {
    registry: Arc<GrammarRegistry>,
}

impl AstChunker {
    pub fn new(registry: Arc<GrammarRegistry>) -> Self {
        Self { registry }
    }

    /// Breakpoints for `text`, normalized. `Err` carries the parse failure.
    pub fn breakpoints(&self, text: &str, language: Language) -> Result<Vec<Breakpoint>, String> {
        let grammar = self
            .registry
            .get_language(language)
            .ok_or_else(|| format!("no grammar available for {language}"))?;
        let mut parser = grammar
            .parser()
            .ok_or_else(|| format!("failed to initialize {language} parser"))?;
        let tree = parser
            .parse(text, None)
            .ok_or_else(|| "parser produced no tree".to_string())?;

        let root = tree.root_node();
        let points = breakpoints::normalize(breakpoints::extract(
            root,
            text,
            language,
            &self.registry,
        ));
        if root.has_error() {
            if points.is_empty() {
                return Err("unrecoverable syntax errors".into());
            }
            debug!(%language, "syntax errors in tree; using recovered nodes");
        }
        Ok(points)
    }
}

impl Chunker for AstChunker {
    fn method(&self) -> ParseMethod {
        ParseMethod::Ast
    }

    fn chunk(
        &self,
        file_path: &str,
        text: &str,
        language: Language,
        token_budget: usize,
    ) -> ChunkOutcome {
        if text.trim().is_empty() {
            return ChunkOutcome::parsed(Vec::new(), ParseMethod::Ast);
        }
        let points = match self.breakpoints(text, language) {
            Ok(points) => points,
            Err(error) => return ChunkOutcome::failed(ParseMethod::Ast, error),
        };

        let lines = SourceLines::new(text);
        let spans = spans::from_breakpoints(&points, lines.len());
        let chunks = spans::assemble(file_path, language, &lines, spans, token_budget);
        debug!(
            file = file_path,
            breakpoints = points.len(),
            chunks = chunks.len(),
            "chunked"
        );
        ChunkOutcome::parsed(chunks, ParseMethod::Ast)
    }
}

const DECLARATION_START_PATTERN: &str = r"^(export\s+)?(default\s+)?(pub(\([^)]*\))?\s+)?(public\s+|private\s+|protected\s+|static\s+|abstract\s+|final\s+|async\s+|unsafe\s+)*(function|class|interface|def|fn|func|fun|struct|enum|trait|impl|module|namespace|type|object|protocol|extension|mod)\b";

const IMPORT_LINE_PATTERN: &str =
    r"^(import\b|from\s+\S+\s+import\b|use\s|#\s*include\b|require(_relative)?\b)";

static DECLARATION_START: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(DECLARATION_START_PATTERN).ok());

static IMPORT_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(IMPORT_LINE_PATTERN).ok());

/// Line-oriented chunker for languages without a usable grammar.
///
/// Declarations starting at column 0 become breakpoints; a file without any
/// is cut into fixed windows.
///
/// # Examples
///
/// ```
/// use sift_chunker::{Chunker, FallbackChunker, ParseMethod};
/// use sift_grammar::Language;
///
/// let chunker = FallbackChunker::new(60);
/// let src = "def a():\n    pass\n\ndef b():\n    pass\n";
/// let outcome = chunker.chunk("a.star", src, Language::Unknown, 1500);
/// assert_eq!(outcome.parse_method, ParseMethod::Fallback);
/// assert_eq!(outcome.chunks.len(), 2);
/// ```
pub struct FallbackChunker {
    window_lines: usize,
}

impl FallbackChunker {
    pub fn new(window_lines: usize) -> Self {
        Self {
            window_lines: window_lines.max(1),
        }
    }

    fn breakpoints(&self, lines: &SourceLines<'_>) -> Vec<Breakpoint> {
        let mut points = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            let line_no = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if matches_pattern(&IMPORT_LINE, line) {
                points.push(Breakpoint::new(line_no, Some(ChunkType::Import)));
            } else if matches_pattern(&DECLARATION_START, line) {
                points.push(Breakpoint::new(line_no, None));
            }
        }

        if points.is_empty() {
            points = (1..=lines.len())
                .step_by(self.window_lines)
                .map(|line| Breakpoint::new(line, None))
                .collect();
        }
        breakpoints::normalize(points)
    }
}

fn matches_pattern(pattern: &LazyLock<Option<Regex>>, line: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(line))
}

impl Chunker for FallbackChunker {
    fn method(&self) -> ParseMethod {
        ParseMethod::Fallback
    }

    fn chunk(
        &self,
        file_path: &str,
        text: &str,
        language: Language,
        token_budget: usize,
    ) -> ChunkOutcome {
        if text.trim().is_empty() {
            return ChunkOutcome::parsed(Vec::new(), ParseMethod::Fallback);
        }
        let lines = SourceLines::new(text);
        let points = self.breakpoints(&lines);
        let spans = spans::from_breakpoints(&points, lines.len());
        let chunks = spans::assemble(file_path, language, &lines, spans, token_budget);
        ChunkOutcome::parsed(chunks, ParseMethod::Fallback)
    }
}

/// Picks the AST chunker where a grammar exists and degrades to the
/// fallback chunker when parsing fails.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use sift_chunker::{ChunkerSet, ParseMethod};
/// use sift_core::ChunkerConfig;
/// use sift_grammar::{GrammarRegistry, Language};
///
/// let set = ChunkerSet::new(Arc::new(GrammarRegistry::new()), &ChunkerConfig::default());
/// let outcome = set.chunk("notes.txt", "some text\n", Language::Unknown);
/// assert_eq!(outcome.parse_method, ParseMethod::Fallback);
/// ```
pub struct ChunkerSet {
    registry: Arc<GrammarRegistry>,
    ast: AstChunker,
    fallback: FallbackChunker,
    token_budget: usize,
}

impl ChunkerSet {
    pub fn new(registry: Arc<GrammarRegistry>, config: &ChunkerConfig) -> Self {
        Self {
            ast: AstChunker::new(Arc::clone(&registry)),
            fallback: FallbackChunker::new(config.fallback_window_lines),
            registry,
            token_budget: config.token_budget,
        }
    }

    /// The chunker that would be tried first for `language`.
    pub fn select(&self, language: Language) -> &dyn Chunker {
        if self.registry.supports_language(language) {
            &self.ast
        } else {
            &self.fallback
        }
    }

    /// Chunk with the configured token budget.
    pub fn chunk(&self, file_path: &str, text: &str, language: Language) -> ChunkOutcome {
        let outcome = self
            .select(language)
            .chunk(file_path, text, language, self.token_budget);
        if outcome.parse_success {
            return outcome;
        }

        let reason = outcome.error.unwrap_or_default();
        warn!(file = file_path, %reason, "AST chunking failed; using fallback chunker");
        let mut degraded = self
            .fallback
            .chunk(file_path, text, language, self.token_budget);
        degraded.error = Some(reason);
        degraded
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }
}
