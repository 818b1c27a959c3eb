//! Turning breakpoints into final chunks.
//!
//! Spans are contiguous: each runs from its breakpoint to the line before the
//! next one. Content ahead of the first breakpoint is attached to the first
//! span, so the first chunk of a file always starts at line 1.

use sift_core::{ChunkType, SourceChunk};
use sift_grammar::Language;

use crate::breakpoints::Breakpoint;
use crate::classify::classify_text;

/// Largest run of blank lines that still lets two variable chunks merge.
pub const MAX_MERGE_GAP: u32 = 2;

/// Estimated token count: characters / 4, rounded up.
///
/// # Examples
///
/// ```
/// use sift_chunker::spans::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert_eq!(estimate_tokens("abcde"), 2);
/// ```
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// The lines of one source file, addressed 1-based.
pub struct SourceLines<'a> {
    lines: Vec<&'a str>,
}

impl<'a> SourceLines<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
        }
    }

    pub fn len(&self) -> u32 {
        u32::try_from(self.lines.len()).unwrap_or(u32::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.lines.iter().copied()
    }

    fn line(&self, line: u32) -> &'a str {
        (line as usize)
            .checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .copied()
            .unwrap_or("")
    }

    /// Text of lines `start..=end`, joined with `\n`.
    pub fn slice(&self, start: u32, end: u32) -> String {
        let from = (start as usize).saturating_sub(1);
        let to = (end as usize).min(self.lines.len());
        self.lines.get(from..to).map(|l| l.join("\n")).unwrap_or_default()
    }

    fn is_blank(&self, start: u32, end: u32) -> bool {
        (start..=end).all(|line| self.line(line).trim().is_empty())
    }

    /// Last non-blank line in `start..=end`, or `start` if all are blank.
    fn last_content_line(&self, start: u32, end: u32) -> u32 {
        (start..=end)
            .rev()
            .find(|&line| !self.line(line).trim().is_empty())
            .unwrap_or(start)
    }
}

/// A line range with a possibly unknown type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
    pub chunk_type: Option<ChunkType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TypedSpan {
    start: u32,
    end: u32,
    chunk_type: ChunkType,
}

/// Derive contiguous spans from sorted, deduplicated breakpoints.
///
/// No breakpoints in a non-empty file gives one whole-file span.
pub fn from_breakpoints(points: &[Breakpoint], line_count: u32) -> Vec<Span> {
    if line_count == 0 {
        return Vec::new();
    }
    let lines: Vec<&Breakpoint> = points
        .iter()
        .filter(|p| p.line >= 1 && p.line <= line_count)
        .collect();
    if lines.is_empty() {
        return vec![Span {
            start: 1,
            end: line_count,
            chunk_type: None,
        }];
    }

    lines
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let start = if i == 0 { 1 } else { point.line };
            let end = lines
                .get(i + 1)
                .map(|next| next.line - 1)
                .unwrap_or(line_count);
            Span {
                start,
                end,
                chunk_type: point.chunk_type,
            }
        })
        .collect()
}

/// Classify, merge, split to budget and number the spans of one file.
pub fn assemble(
    file_path: &str,
    language: Language,
    lines: &SourceLines<'_>,
    spans: Vec<Span>,
    token_budget: usize,
) -> Vec<SourceChunk> {
    let typed: Vec<TypedSpan> = spans
        .into_iter()
        .map(|span| TypedSpan {
            start: span.start,
            end: span.end,
            chunk_type: span
                .chunk_type
                .unwrap_or_else(|| classify_text(&lines.slice(span.start, span.end), language)),
        })
        .collect();

    merge_variables(typed, lines)
        .into_iter()
        .flat_map(|span| split_to_budget(span, lines, token_budget))
        .filter(|span| !lines.is_blank(span.start, span.end))
        .enumerate()
        .map(|(index, span)| {
            SourceChunk::new(
                file_path,
                span.start,
                span.end,
                lines.slice(span.start, span.end),
                span.chunk_type,
                language.name(),
                u32::try_from(index).unwrap_or(u32::MAX),
            )
        })
        .collect()
}

/// Merge maximal runs of variable spans whose separating blank gap is at
/// most [`MAX_MERGE_GAP`] lines.
fn merge_variables(spans: Vec<TypedSpan>, lines: &SourceLines<'_>) -> Vec<TypedSpan> {
    let mut out: Vec<TypedSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if let Some(last) = out.last_mut() {
            if last.chunk_type == ChunkType::Variable && span.chunk_type == ChunkType::Variable {
                let content_end = lines.last_content_line(last.start, last.end);
                let gap = span.start.saturating_sub(content_end + 1);
                if gap <= MAX_MERGE_GAP {
                    last.end = span.end;
                    continue;
                }
            }
        }
        out.push(span);
    }
    out
}

/// Split a span at line boundaries so each piece fits the budget. A single
/// line over budget stays whole.
fn split_to_budget(span: TypedSpan, lines: &SourceLines<'_>, budget: usize) -> Vec<TypedSpan> {
    if budget == 0 || estimate_tokens(&lines.slice(span.start, span.end)) <= budget {
        return vec![span];
    }

    let mut pieces = Vec::new();
    let mut start = span.start;
    // Characters in `start..line`, each line counted with its newline.
    let mut chars = 0usize;
    for line in span.start..=span.end {
        let len = lines.line(line).chars().count() + 1;
        if line > start && (chars + len - 1).div_ceil(4) > budget {
            pieces.push(TypedSpan {
                start,
                end: line - 1,
                chunk_type: span.chunk_type,
            });
            start = line;
            chars = 0;
        }
        chars += len;
    }
    pieces.push(TypedSpan {
        start,
        end: span.end,
        chunk_type: span.chunk_type,
    });
    pieces
}
