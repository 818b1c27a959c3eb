use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic classification of a chunk.
///
/// # Examples
///
/// ```
/// use sift_core::ChunkType;
///
/// let t: ChunkType = "function".parse().unwrap();
/// assert_eq!(t, ChunkType::Function);
/// assert_eq!(t.to_string(), "function");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Namespace,
    Variable,
    Import,
    Export,
    Jsx,
    Component,
    Block,
    Template,
    Script,
    Css,
    Data,
    Computed,
    Lifecycle,
    Watch,
    Unknown,
}

impl ChunkType {
    /// All variants, in declaration order.
    pub const ALL: [ChunkType; 20] = [
        ChunkType::Function,
        ChunkType::Method,
        ChunkType::Class,
        ChunkType::Interface,
        ChunkType::Type,
        ChunkType::Namespace,
        ChunkType::Variable,
        ChunkType::Import,
        ChunkType::Export,
        ChunkType::Jsx,
        ChunkType::Component,
        ChunkType::Block,
        ChunkType::Template,
        ChunkType::Script,
        ChunkType::Css,
        ChunkType::Data,
        ChunkType::Computed,
        ChunkType::Lifecycle,
        ChunkType::Watch,
        ChunkType::Unknown,
    ];

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkType::Function => "function",
            ChunkType::Method => "method",
            ChunkType::Class => "class",
            ChunkType::Interface => "interface",
            ChunkType::Type => "type",
            ChunkType::Namespace => "namespace",
            ChunkType::Variable => "variable",
            ChunkType::Import => "import",
            ChunkType::Export => "export",
            ChunkType::Jsx => "jsx",
            ChunkType::Component => "component",
            ChunkType::Block => "block",
            ChunkType::Template => "template",
            ChunkType::Script => "script",
            ChunkType::Css => "css",
            ChunkType::Data => "data",
            ChunkType::Computed => "computed",
            ChunkType::Lifecycle => "lifecycle",
            ChunkType::Watch => "watch",
            ChunkType::Unknown => "unknown",
        }
    }

    /// Human-readable label used in embedding headers.
    ///
    /// # Examples
    ///
    /// ```
    /// use sift_core::ChunkType;
    ///
    /// assert_eq!(ChunkType::Jsx.label(), "JSX markup");
    /// ```
    pub fn label(self) -> &'static str {
        match self {
            ChunkType::Function => "function",
            ChunkType::Method => "method",
            ChunkType::Class => "class",
            ChunkType::Interface => "interface",
            ChunkType::Type => "type definition",
            ChunkType::Namespace => "namespace",
            ChunkType::Variable => "variable declarations",
            ChunkType::Import => "imports",
            ChunkType::Export => "exports",
            ChunkType::Jsx => "JSX markup",
            ChunkType::Component => "component",
            ChunkType::Block => "code block",
            ChunkType::Template => "template markup",
            ChunkType::Script => "script section",
            ChunkType::Css => "stylesheet",
            ChunkType::Data => "component data",
            ChunkType::Computed => "computed properties",
            ChunkType::Lifecycle => "lifecycle hook",
            ChunkType::Watch => "watcher",
            ChunkType::Unknown => "code",
        }
    }

    /// Whether this is an import or export statement.
    pub fn is_module_boundary(self) -> bool {
        matches!(self, ChunkType::Import | ChunkType::Export)
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        ChunkType::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| format!("unknown chunk type: {s}"))
    }
}

/// Build the canonical chunk id `filePath:startLine-endLine`.
///
/// # Examples
///
/// ```
/// assert_eq!(sift_core::chunk_id("src/app.ts", 3, 9), "src/app.ts:3-9");
/// ```
pub fn chunk_id(file_path: &str, start_line: u32, end_line: u32) -> String {
    format!("{file_path}:{start_line}-{end_line}")
}

/// A contiguous span of source lines treated as one indexing unit.
///
/// Lines are 1-indexed and inclusive. `vector` is attached by the embedding
/// pipeline and never recomputed in place.
///
/// # Examples
///
/// ```
/// use sift_core::{ChunkType, SourceChunk};
///
/// let chunk = SourceChunk::new("src/main.rs", 1, 3, "fn main() {}".into(), ChunkType::Function, "rust", 0);
/// assert_eq!(chunk.id, "src/main.rs:1-3");
/// assert!(chunk.vector.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceChunk {
    /// `filePath:startLine-endLine`.
    pub id: String,
    /// Path of the originating file.
    pub file_path: String,
    /// First line (1-indexed).
    pub start_line: u32,
    /// Last line (1-indexed, inclusive).
    pub end_line: u32,
    /// Exact source text of the span.
    pub text: String,
    /// Semantic classification.
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    /// Language name (e.g. `"typescript"`).
    pub language: String,
    /// Position of the chunk within its file, 0-based.
    pub sequence_index: u32,
    /// When the chunk was produced.
    pub created_at: DateTime<Utc>,
    /// Embedding, once attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl SourceChunk {
    /// Create a chunk without a vector.
    pub fn new(
        file_path: &str,
        start_line: u32,
        end_line: u32,
        text: String,
        chunk_type: ChunkType,
        language: &str,
        sequence_index: u32,
    ) -> Self {
        Self {
            id: chunk_id(file_path, start_line, end_line),
            file_path: file_path.to_string(),
            start_line,
            end_line,
            text,
            chunk_type,
            language: language.to_string(),
            sequence_index,
            created_at: Utc::now(),
            vector: None,
        }
    }

    /// Number of lines spanned.
    pub fn line_count(&self) -> u32 {
        self.end_line - self.start_line + 1
    }

    /// Whether a non-empty vector is attached.
    pub fn has_vector(&self) -> bool {
        self.vector.as_ref().is_some_and(|v| !v.is_empty())
    }
}

/// A ranked hit from the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// The matched chunk (vector omitted).
    pub chunk: SourceChunk,
    /// Vector similarity in `[0, 1]`.
    pub similarity: f64,
    /// Display score in `[0, 100]`, relative to the result set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_score: Option<f64>,
    /// Composite rerank score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub re_rank_score: Option<f64>,
    /// Reciprocal Rank Fusion score, for hybrid results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fusion_score: Option<f64>,
}

impl SearchResult {
    /// Wrap a chunk with its similarity.
    pub fn new(chunk: SourceChunk, similarity: f64) -> Self {
        Self {
            chunk,
            similarity,
            normalized_score: None,
            re_rank_score: None,
            fusion_score: None,
        }
    }
}

/// Stage of an indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexPhase {
    Preflight,
    Chunking,
    Embedding,
    Storing,
    Done,
}

impl fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexPhase::Preflight => "preflight",
            IndexPhase::Chunking => "chunking",
            IndexPhase::Embedding => "embedding",
            IndexPhase::Storing => "storing",
            IndexPhase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Incremental progress report from a long-running operation.
///
/// # Examples
///
/// ```
/// use sift_core::{IndexPhase, ProgressEvent};
///
/// let event = ProgressEvent::new(IndexPhase::Embedding, 5, 20, "batch 1");
/// assert_eq!(event.percentage, 25.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: IndexPhase,
    pub current: usize,
    pub total: usize,
    pub percentage: f64,
    pub message: String,
}

impl ProgressEvent {
    /// Build an event, deriving `percentage` from `current / total`.
    pub fn new(phase: IndexPhase, current: usize, total: usize, message: impl Into<String>) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            (current as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
        };
        Self {
            phase,
            current,
            total,
            percentage,
            message: message.into(),
        }
    }
}

/// Outcome of an indexing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRunSummary {
    /// `true` when every discovered chunk was stored.
    pub success: bool,
    pub total_files: usize,
    pub total_chunks: usize,
    pub successful_chunks: usize,
    pub failed_chunks: usize,
    pub duration_ms: u64,
    /// Per-file and per-chunk failures, in the order they occurred.
    pub errors: Vec<String>,
    /// Set when the run was stopped between batches on request.
    #[serde(default)]
    pub cancelled: bool,
}

/// Outcome of a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSummary {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    pub search_time_ms: u64,
    /// `false` when the index has never been populated.
    pub index_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output format for CLI subcommands.
///
/// # Examples
///
/// ```
/// use sift_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
