//! Building the text that gets embedded.
//!
//! Embedding raw code works poorly for natural-language queries, so each
//! chunk is prefixed with a short header (language, file, kind, name) and,
//! optionally, the words hidden inside its compound identifiers.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use sift_core::SourceChunk;

/// Most words listed on the keyword line.
const MAX_KEYWORDS: usize = 48;

const IDENTIFIER_PATTERN: &str = r"[A-Za-z_$][A-Za-z0-9_$]*";

/// Declaration shapes whose first capture group is the declared name.
const NAME_SOURCES: &[&str] = &[
    r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?(?:async\s+)?(?:function\*?|class|interface|type|enum|namespace|module)\s+([A-Za-z_$][\w$]*)",
    r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?(?:fn|struct|enum|trait|type|mod|union)\s+([A-Za-z_]\w*)",
    r"(?m)^\s*impl(?:<[^>]*>)?\s+(?:[\w:]+\s+for\s+)?([A-Za-z_]\w*)",
    r"(?m)^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)",
    r"(?m)^\s*func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)",
    r"(?m)^\s*(?:[\w<>\[\]]+\s+)*(?:fun|class|object|interface|struct|protocol|extension)\s+([A-Za-z_]\w*)",
    r"(?m)^\s*(?:export\s+)?(?:const|let|var|val)\s+([A-Za-z_$][\w$]*)",
    r"(?m)^\s*([A-Za-z_]\w*)\s*(?:\([^)]*\))?\s*\{",
];

static IDENTIFIER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(IDENTIFIER_PATTERN).ok());

static NAME_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| NAME_SOURCES.iter().filter_map(|p| Regex::new(p).ok()).collect());

/// Fixed markers for models trained with asymmetric query/document inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPrefixes {
    pub query: String,
    pub document: String,
}

impl TaskPrefixes {
    /// Prefixes used by the nomic-embed family.
    pub fn nomic() -> Self {
        Self {
            query: "search_query: ".into(),
            document: "search_document: ".into(),
        }
    }

    /// Prepend the query or document marker.
    pub fn apply(&self, text: &str, is_query: bool) -> String {
        let prefix = if is_query { &self.query } else { &self.document };
        format!("{prefix}{text}")
    }
}

/// Split one identifier into lowercase words.
///
/// Handles camelCase, PascalCase, snake_case, kebab-case and acronyms.
///
/// # Examples
///
/// ```
/// use sift_embed::text::split_identifier;
///
/// assert_eq!(split_identifier("parseHTTPResponse"), vec!["parse", "http", "response"]);
/// assert_eq!(split_identifier("MAX_RETRY_COUNT"), vec!["max", "retry", "count"]);
/// assert_eq!(split_identifier("getUser2FA"), vec!["get", "user2", "fa"]);
/// ```
pub fn split_identifier(identifier: &str) -> Vec<String> {
    let mut words = Vec::new();
    for part in identifier.split(|c: char| !c.is_alphanumeric()) {
        let chars: Vec<char> = part.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            let boundary = i > 0 && c.is_uppercase() && {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            };
            if boundary && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            current.extend(c.to_lowercase());
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words
}

/// Lowercase word tokens of `text`, with identifiers split into their parts.
/// Single-character tokens are dropped.
///
/// # Examples
///
/// ```
/// use sift_embed::text::tokenize;
///
/// assert_eq!(tokenize("fn loadUserConfig(x)"), vec!["fn", "load", "user", "config"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let Some(identifier) = IDENTIFIER.as_ref() else {
        return Vec::new();
    };
    identifier
        .find_iter(text)
        .flat_map(|m| split_identifier(m.as_str()))
        .filter(|w| w.chars().count() > 1)
        .collect()
}

/// Distinct words from the compound identifiers in `text`, in order of first
/// appearance. Plain single-word identifiers are already matchable as-is and
/// are skipped.
pub fn identifier_terms(text: &str, limit: usize) -> Vec<String> {
    let Some(identifier) = IDENTIFIER.as_ref() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    for m in identifier.find_iter(text) {
        let words = split_identifier(m.as_str());
        if words.len() < 2 {
            continue;
        }
        for word in words {
            if word.chars().count() > 1 && seen.insert(word.clone()) {
                terms.push(word);
                if terms.len() >= limit {
                    return terms;
                }
            }
        }
    }
    terms
}

/// Best-effort name of the declaration a chunk holds.
///
/// # Examples
///
/// ```
/// use sift_embed::text::extract_name;
///
/// assert_eq!(extract_name("export async function loadUser() {}").as_deref(), Some("loadUser"));
/// assert_eq!(extract_name("impl Display for Thing {").as_deref(), Some("Thing"));
/// assert_eq!(extract_name("// nothing here"), None);
/// ```
pub fn extract_name(text: &str) -> Option<String> {
    NAME_PATTERNS
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Text submitted to the provider for one chunk.
///
/// ```text
/// Language: rust
/// File: store.rs
/// Type: function
/// Name: load_index
/// Keywords: load index
///
/// <code>
/// ```
pub fn document_text(chunk: &SourceChunk, segment_identifiers: bool) -> String {
    let file_name = Path::new(&chunk.file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&chunk.file_path);

    let mut out = format!(
        "Language: {}\nFile: {}\nType: {}\n",
        chunk.language,
        file_name,
        chunk.chunk_type.label()
    );
    if let Some(name) = extract_name(&chunk.text) {
        out.push_str(&format!("Name: {name}\n"));
    }
    if segment_identifiers {
        let terms = identifier_terms(&chunk.text, MAX_KEYWORDS);
        if !terms.is_empty() {
            out.push_str(&format!("Keywords: {}\n", terms.join(" ")));
        }
    }
    out.push('\n');
    out.push_str(&chunk.text);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::ChunkType;

    #[test]
    fn every_pattern_compiles() {
        for pattern in NAME_SOURCES.iter().chain([&IDENTIFIER_PATTERN]) {
            assert!(Regex::new(pattern).is_ok(), "bad pattern: {pattern}");
        }
        assert_eq!(NAME_PATTERNS.len(), NAME_SOURCES.len());
    }

    fn chunk(text: &str, chunk_type: ChunkType) -> SourceChunk {
        SourceChunk::new("src/store/index.ts", 1, 3, text.into(), chunk_type, "typescript", 0)
    }

    #[test]
    fn splits_mixed_case_and_separators() {
        assert_eq!(split_identifier("XMLHttpRequest"), vec!["xml", "http", "request"]);
        assert_eq!(split_identifier("snake_case_name"), vec!["snake", "case", "name"]);
        assert_eq!(split_identifier("kebab-case"), vec!["kebab", "case"]);
        assert_eq!(split_identifier("simple"), vec!["simple"]);
        assert!(split_identifier("__").is_empty());
    }

    #[test]
    fn terms_skip_plain_words_and_repeat() {
        let terms = identifier_terms("const userId = getUserId(user);", 10);
        assert_eq!(terms, vec!["user", "id", "get"]);
    }

    #[test]
    fn terms_respect_limit() {
        assert_eq!(identifier_terms("alphaBeta gammaDelta", 3).len(), 3);
    }

    #[test]
    fn document_header_lists_context() {
        let c = chunk("export class SearchIndex {\n  rebuildAll() {}\n}", ChunkType::Class);
        let text = document_text(&c, true);
        assert!(text.starts_with("Language: typescript\nFile: index.ts\nType: class\n"));
        assert!(text.contains("Name: SearchIndex\n"));
        assert!(text.contains("Keywords: search index rebuild all\n"));
        assert!(text.ends_with(&c.text));
    }

    #[test]
    fn segmentation_can_be_disabled() {
        let c = chunk("function loadUser() {}", ChunkType::Function);
        assert!(!document_text(&c, false).contains("Keywords:"));
    }

    #[test]
    fn prefixes_mark_queries_and_documents() {
        let prefixes = TaskPrefixes::nomic();
        assert_eq!(prefixes.apply("auth", true), "search_query: auth");
        assert_eq!(prefixes.apply("fn a() {}", false), "search_document: fn a() {}");
    }
}
