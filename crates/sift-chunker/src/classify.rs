//! Content heuristics for chunks without an AST-derived type.
//!
//! Checks run in priority order: JSX, function (then method), class,
//! interface, type/enum, export, import, variable. Anything else is a block.

use std::sync::LazyLock;

use regex::Regex;
use sift_core::ChunkType;
use sift_grammar::Language;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
}

const JSX_PATTERNS: &[&str] = &[
    r"return\s*\(\s*<[A-Za-z>]",
    r"=>\s*\(?\s*<[A-Z][A-Za-z0-9.]*[\s/>]",
    r"</[A-Za-z][A-Za-z0-9.]*>",
    r"<>\s*$",
];

static JSX: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(JSX_PATTERNS));

const FUNCTION_PATTERNS: &[&str] = &[
    r"^\s*(export\s+)?(default\s+)?(async\s+)?function\b",
    r"^\s*(pub(\([^)]*\))?\s+)?(const\s+)?(async\s+)?(unsafe\s+)?(extern\s+\S+\s+)?fn\s+\w+",
    r"^\s*(async\s+)?def\s+\w+",
    r"^\s*func\s+",
    r"^\s*(export\s+)?(const|let|var)\s+\w+\s*(:[^=]+)?=\s*(async\s+)?(\([^)]*\)|\w+)\s*(:[^=]+)?=>",
    r"^\s*((public|private|protected|internal|static|final|abstract|override|suspend|open)\s+)*fun\s+\w+",
    r"^\s*((public|private|protected|static|final|abstract)\s+)*function\s+\w+\s*\(",
    r"^\s*def\s+(self\.)?\w+[?!]?",
];

static FUNCTION: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(FUNCTION_PATTERNS));

const METHOD_PATTERNS: &[&str] = &[
    r"^\s*((public|private|protected|static|final|abstract|synchronized|override)\s+)+[\w<>\[\],\s]+\s+\w+\s*\([^;]*$",
    r"^\s*func\s+\([^)]*\)\s*\w+",
];

static METHOD: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(METHOD_PATTERNS));

const CLASS_PATTERNS: &[&str] = &[
    r"^\s*(export\s+)?(default\s+)?(abstract\s+)?class\s+\w+",
    r"^\s*((public|private|protected|final|abstract|static|sealed|data|open)\s+)*class\s+\w+",
    r"^\s*(pub(\([^)]*\))?\s+)?(struct|union)\s+\w+",
    r"^\s*impl\b",
    r"^\s*(typedef\s+)?struct\s+\w*\s*\{",
];

static CLASS: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(CLASS_PATTERNS));

const INTERFACE_PATTERNS: &[&str] = &[
    r"^\s*(export\s+)?(declare\s+)?interface\s+\w+",
    r"^\s*(pub(\([^)]*\))?\s+)?(unsafe\s+)?trait\s+\w+",
    r"^\s*((public|private|protected)\s+)?(@)?interface\s+\w+",
    r"^\s*protocol\s+\w+",
];

static INTERFACE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(INTERFACE_PATTERNS));

const TYPE_PATTERNS: &[&str] = &[
    r"^\s*(export\s+)?(declare\s+)?(const\s+)?(type|enum)\s+\w+",
    r"^\s*(pub(\([^)]*\))?\s+)?(enum|type)\s+\w+",
    r"^\s*((public|private|protected)\s+)?enum\s+\w+",
    r"^\s*typedef\b",
];

static TYPE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(TYPE_PATTERNS));

const EXPORT_PATTERNS: &[&str] = &[r"^\s*export\b", r"^\s*module\.exports\b", r"^\s*exports\.\w+\s*="];

static EXPORT: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(EXPORT_PATTERNS));

const IMPORT_PATTERNS: &[&str] = &[
    r"^\s*import\b",
    r"^\s*from\s+[\w.]+\s+import\b",
    r"^\s*(pub\s+)?use\s+[\w:{]",
    r"^\s*#\s*include\b",
    r"^\s*(const|let|var)\s+.*=\s*require\(",
    r"^\s*require(_relative)?\s*[\('\x22]",
    r"^\s*package\s+[\w.]+",
    r"^\s*(extern\s+crate|using)\s+",
];

static IMPORT: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(IMPORT_PATTERNS));

const VARIABLE_PATTERNS: &[&str] = &[
    r"^\s*(export\s+)?(const|let|var)\s+\w+",
    r"^\s*(pub(\([^)]*\))?\s+)?(static|const)\s+(mut\s+)?[A-Z_][A-Z0-9_]*\s*:",
    r"^\s*(val|var)\s+\w+",
    r"^\s*\$\w+\s*=",
    r"^\s*[A-Za-z_][\w.]*\s*(:\s*[^=]+)?=[^=>]",
    r"^\s*#\s*define\s+\w+",
];

static VARIABLE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(VARIABLE_PATTERNS));

const VUE_PATTERNS: &[(ChunkType, &str)] = &[
    (ChunkType::Template, r"^\s*<template\b"),
    (ChunkType::Script, r"^\s*<script\b"),
    (ChunkType::Css, r"^\s*<style\b"),
    (ChunkType::Component, r"export\s+default\s+(\{|defineComponent\()"),
    (ChunkType::Computed, r"^\s*(computed\s*:|(const|let)\s+\w+\s*=\s*computed\()"),
    (ChunkType::Watch, r"^\s*(watch\s*:|watch(Effect)?\()"),
    (
        ChunkType::Lifecycle,
        r"^\s*(on(Before)?(Mount|Mounted|Update|Updated|Unmount|Unmounted)\(|(beforeCreate|created|beforeMount|mounted|beforeUpdate|updated|beforeUnmount|unmounted)\s*\()",
    ),
    (ChunkType::Data, r"^\s*(data\s*\(\)|(const|let)\s+\w+\s*=\s*(ref|reactive)\()"),
];

static VUE: LazyLock<Vec<(ChunkType, Regex)>> = LazyLock::new(|| {
    VUE_PATTERNS
        .iter()
        .filter_map(|&(t, p)| Regex::new(p).ok().map(|r| (t, r)))
        .collect()
});

/// Classify chunk text by content alone.
///
/// Declarations are matched against the first significant line (skipping
/// blank lines, comments, decorators and attributes); JSX is searched for
/// anywhere in the chunk.
///
/// # Examples
///
/// ```
/// use sift_chunker::classify::classify_text;
/// use sift_core::ChunkType;
/// use sift_grammar::Language;
///
/// let ty = classify_text("// helper\nasync function load() {}\n", Language::JavaScript);
/// assert_eq!(ty, ChunkType::Function);
/// assert_eq!(classify_text("x + 1\n", Language::Unknown), ChunkType::Block);
/// ```
pub fn classify_text(text: &str, language: Language) -> ChunkType {
    let head = first_significant_line(text);

    if language.is_markup() {
        if let Some((chunk_type, _)) = VUE.iter().find(|(_, re)| re.is_match(text)) {
            return *chunk_type;
        }
    }

    if language != Language::Python && JSX.iter().any(|re| re.is_match(text)) {
        return ChunkType::Jsx;
    }

    let head = head.unwrap_or("");
    let ordered: [(&[Regex], ChunkType); 8] = [
        (FUNCTION.as_slice(), ChunkType::Function),
        (METHOD.as_slice(), ChunkType::Method),
        (CLASS.as_slice(), ChunkType::Class),
        (INTERFACE.as_slice(), ChunkType::Interface),
        (TYPE.as_slice(), ChunkType::Type),
        (EXPORT.as_slice(), ChunkType::Export),
        (IMPORT.as_slice(), ChunkType::Import),
        (VARIABLE.as_slice(), ChunkType::Variable),
    ];
    ordered
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|re| re.is_match(head)))
        .map(|(_, chunk_type)| *chunk_type)
        .unwrap_or(ChunkType::Block)
}

fn first_significant_line(text: &str) -> Option<&str> {
    let mut in_block_comment = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if in_block_comment {
            if trimmed.contains("*/") {
                in_block_comment = false;
            }
            continue;
        }
        if trimmed.starts_with("/*") {
            in_block_comment = !trimmed.contains("*/");
            continue;
        }
        let skip = trimmed.is_empty()
            || trimmed.starts_with("//")
            || (trimmed.starts_with('#') && !is_preprocessor(trimmed))
            || trimmed.starts_with('@')
            || trimmed.starts_with('*')
            || trimmed.starts_with("<!--");
        if !skip {
            return Some(line);
        }
    }
    None
}

fn is_preprocessor(line: &str) -> bool {
    line.starts_with("#include") || line.starts_with("#define")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pattern_compiles() {
        let lists = [
            JSX_PATTERNS,
            FUNCTION_PATTERNS,
            METHOD_PATTERNS,
            CLASS_PATTERNS,
            INTERFACE_PATTERNS,
            TYPE_PATTERNS,
            EXPORT_PATTERNS,
            IMPORT_PATTERNS,
            VARIABLE_PATTERNS,
        ];
        let vue = VUE_PATTERNS.iter().map(|(_, p)| *p);
        for pattern in lists.into_iter().flatten().copied().chain(vue) {
            assert!(Regex::new(pattern).is_ok(), "bad pattern: {pattern}");
        }
    }

    #[test]
    fn priority_puts_jsx_before_function() {
        let text = "function App() {\n  return (\n    <div>hi</div>\n  );\n}\n";
        assert_eq!(classify_text(text, Language::JavaScript), ChunkType::Jsx);
    }

    #[test]
    fn declarations_across_languages() {
        let cases = [
            ("pub fn run() {}", Language::Rust, ChunkType::Function),
            ("def load(path):\n    pass", Language::Python, ChunkType::Function),
            ("class Store:\n    pass", Language::Python, ChunkType::Class),
            ("pub struct Config {}", Language::Rust, ChunkType::Class),
            ("pub trait Provider {}", Language::Rust, ChunkType::Interface),
            ("export interface Props {}", Language::TypeScript, ChunkType::Interface),
            ("export type Id = string;", Language::TypeScript, ChunkType::Type),
            ("enum Color { Red }", Language::Rust, ChunkType::Type),
            ("export { a, b };", Language::TypeScript, ChunkType::Export),
            ("import os", Language::Python, ChunkType::Import),
            ("#include <stdio.h>", Language::C, ChunkType::Import),
            ("const LIMIT = 10;", Language::TypeScript, ChunkType::Variable),
            ("const add = (a, b) => a + b;", Language::JavaScript, ChunkType::Function),
            ("if (x) {\n  y();\n}", Language::JavaScript, ChunkType::Block),
        ];
        for (text, language, expected) in cases {
            assert_eq!(classify_text(text, language), expected, "{text}");
        }
    }

    #[test]
    fn skips_leading_comments_and_attributes() {
        let text = "/**\n * Docs.\n */\n#[derive(Debug)]\npub struct A;\n";
        assert_eq!(classify_text(text, Language::Rust), ChunkType::Class);
    }

    #[test]
    fn markup_sections() {
        assert_eq!(
            classify_text("<template>\n  <div/>\n</template>", Language::Vue),
            ChunkType::Template
        );
        assert_eq!(
            classify_text("const total = computed(() => 1);", Language::Vue),
            ChunkType::Computed
        );
        assert_eq!(classify_text("onMounted(() => {});", Language::Vue), ChunkType::Lifecycle);
    }

    #[test]
    fn empty_is_block() {
        assert_eq!(classify_text("", Language::Rust), ChunkType::Block);
        assert_eq!(classify_text("\n\n", Language::Go), ChunkType::Block);
    }
}
