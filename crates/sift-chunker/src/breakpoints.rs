//! Depth-bounded breakpoint extraction over a syntax tree.
//!
//! Depth 0 records every child of the root whose kind appears in the
//! language's [`NodeTable`]. Depths 1 to [`MAX_DEPTH`] record only
//! function-like nodes and multi-line JSX blocks. `<script>` sections of
//! markup files are parsed in their own language and merged in with their
//! lines translated to the parent file.

use std::collections::BTreeMap;

use sift_core::ChunkType;
use sift_grammar::{GrammarRegistry, Language};
use tracing::debug;
use tree_sitter::Node;

use crate::tables::{table_for, NodeTable};
use crate::vue;

/// Deepest level at which nested function-like nodes are recorded.
pub const MAX_DEPTH: usize = 3;

/// JSX blocks shorter than this stay inside their enclosing chunk.
pub const MIN_JSX_LINES: usize = 3;

/// A line that starts a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    /// 1-based line in the file being chunked.
    pub line: u32,
    /// Type derived from the node, if known.
    pub chunk_type: Option<ChunkType>,
    /// Tree depth the node was found at.
    pub depth: usize,
}

impl Breakpoint {
    pub fn new(line: u32, chunk_type: Option<ChunkType>) -> Self {
        Self {
            line,
            chunk_type,
            depth: 0,
        }
    }

    fn is_module_boundary(&self) -> bool {
        self.chunk_type.is_some_and(ChunkType::is_module_boundary)
    }
}

/// Collect raw breakpoints for a parsed file, in discovery order.
pub fn extract(
    root: Node<'_>,
    source: &str,
    language: Language,
    registry: &GrammarRegistry,
) -> Vec<Breakpoint> {
    let Some(table) = table_for(language) else {
        return Vec::new();
    };
    let mut walk = Walk {
        source: source.as_bytes(),
        table,
        language,
        embedded: false,
        line_offset: 0,
        registry,
        out: Vec::new(),
    };
    walk.top_level(root);
    walk.out
}

/// Sort by line, drop duplicates (the first recorded wins) and collapse
/// runs of consecutive import/export breakpoints into the first of the run.
///
/// # Examples
///
/// ```
/// use sift_chunker::breakpoints::{normalize, Breakpoint};
/// use sift_core::ChunkType;
///
/// let points = vec![
///     Breakpoint::new(3, Some(ChunkType::Import)),
///     Breakpoint::new(1, Some(ChunkType::Import)),
///     Breakpoint::new(2, Some(ChunkType::Import)),
///     Breakpoint::new(5, Some(ChunkType::Function)),
///     Breakpoint::new(5, Some(ChunkType::Variable)),
/// ];
/// let points = normalize(points);
/// assert_eq!(points.len(), 2);
/// assert_eq!(points[0].line, 1);
/// assert_eq!(points[1].chunk_type, Some(ChunkType::Function));
/// ```
pub fn normalize(points: Vec<Breakpoint>) -> Vec<Breakpoint> {
    let mut by_line: BTreeMap<u32, Breakpoint> = BTreeMap::new();
    for point in points {
        by_line.entry(point.line).or_insert(point);
    }

    let mut out: Vec<Breakpoint> = Vec::with_capacity(by_line.len());
    for point in by_line.into_values() {
        let continues_run = point.is_module_boundary()
            && out.last().is_some_and(Breakpoint::is_module_boundary);
        if !continues_run {
            out.push(point);
        }
    }
    out
}

struct Walk<'a> {
    source: &'a [u8],
    table: &'static NodeTable,
    language: Language,
    /// Inside a markup file's `<script>` block.
    embedded: bool,
    line_offset: u32,
    registry: &'a GrammarRegistry,
    out: Vec<Breakpoint>,
}

impl<'a> Walk<'a> {
    fn top_level(&mut self, parent: Node<'_>) {
        let children = named_children(parent);
        for (i, child) in children.iter().enumerate() {
            let kind = child.kind();
            if self.table.is_transparent(kind) {
                self.top_level(*child);
                continue;
            }

            if let Some(chunk_type) = self.classify_top(*child) {
                let row = self.leading_row(*child, &children[..i]);
                self.push(row, chunk_type, 0);
                if kind == "script_element" {
                    self.embedded_script(*child);
                }
            }

            // A wrapper's declaration was recorded above; its body is depth 1.
            let body = if self.table.wrapper_default(kind).is_some() {
                self.carried_declaration(*child).unwrap_or(*child)
            } else {
                *child
            };
            if !self.table.is_atomic(kind) && !self.table.is_atomic(body.kind()) {
                for grandchild in named_children(body) {
                    self.nested(grandchild, 1);
                }
            }
        }
    }

    fn nested(&mut self, node: Node<'_>, depth: usize) {
        if depth > MAX_DEPTH || self.table.is_atomic(node.kind()) {
            return;
        }
        if let Some(chunk_type) = self.classify_nested(node) {
            self.push(node.start_position().row, chunk_type, depth);
        }
        for child in named_children(node) {
            self.nested(child, depth + 1);
        }
    }

    fn push(&mut self, row: usize, chunk_type: ChunkType, depth: usize) {
        let line = u32::try_from(row).unwrap_or(u32::MAX - 1) + 1 + self.line_offset;
        self.out.push(Breakpoint {
            line,
            chunk_type: Some(chunk_type),
            depth,
        });
    }

    fn classify_top(&self, node: Node<'_>) -> Option<ChunkType> {
        match self.table.wrapper_default(node.kind()) {
            Some(default) => self.unwrap_declaration(node).or(default),
            None => self.declaration_type(node),
        }
    }

    fn declaration_type(&self, node: Node<'_>) -> Option<ChunkType> {
        let kind = node.kind();
        let base = self.table.top_type(kind)?;

        if self.table.is_variable(kind) {
            if self.embedded {
                if let Some(refined) = vue::declaration_type(node, self.source) {
                    return Some(refined);
                }
            }
            if self.initializer_is_function(node) {
                return Some(ChunkType::Function);
            }
        }

        let refined = match (self.language, kind) {
            (Language::Go, "type_declaration") => go_type(node),
            (Language::Swift, "class_declaration") => swift_type(node, self.source),
            _ => None,
        };
        Some(refined.unwrap_or(base))
    }

    /// Type of the declaration a wrapper node carries, if any.
    fn unwrap_declaration(&self, node: Node<'_>) -> Option<ChunkType> {
        for child in named_children(node) {
            if let Some(chunk_type) = self.declaration_type(child) {
                return Some(chunk_type);
            }
            if self.table.wrapper_default(child.kind()).is_some() {
                if let Some(chunk_type) = self.unwrap_declaration(child) {
                    return Some(chunk_type);
                }
            }
        }

        if self.embedded {
            if let Some(chunk_type) = vue::statement_type(node, self.source) {
                return Some(chunk_type);
            }
        }

        let value = node.child_by_field_name("value")?;
        if self.table.is_function_value(value.kind()) {
            Some(ChunkType::Function)
        } else if value.kind() == "class" {
            Some(ChunkType::Class)
        } else {
            None
        }
    }

    /// Declaration node a wrapper carries, looking through nested wrappers.
    fn carried_declaration<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        named_children(node).into_iter().find_map(|child| {
            if self.declaration_type(child).is_some() {
                Some(child)
            } else if self.table.wrapper_default(child.kind()).is_some() {
                self.carried_declaration(child)
            } else {
                None
            }
        })
    }

    fn classify_nested(&self, node: Node<'_>) -> Option<ChunkType> {
        let kind = node.kind();
        if self.embedded {
            if let Some(chunk_type) = vue::option_type(node, self.source) {
                return Some(chunk_type);
            }
        }
        if self.table.is_nested_function(kind) {
            return Some(ChunkType::Function);
        }
        if self.table.is_variable(kind) && self.initializer_is_function(node) {
            return Some(ChunkType::Function);
        }
        if self.table.is_jsx(kind) && line_span(node) >= MIN_JSX_LINES {
            return Some(ChunkType::Jsx);
        }
        None
    }

    fn initializer_is_function(&self, node: Node<'_>) -> bool {
        let mut candidates = Vec::new();
        push_initializers(node, &mut candidates);
        for child in named_children(node) {
            candidates.push(child);
            push_initializers(child, &mut candidates);
        }
        candidates
            .iter()
            .any(|value| self.table.is_function_value(value.kind()))
    }

    /// Row a declaration's chunk starts at, pulled up over directly preceding
    /// comments and attributes.
    fn leading_row(&self, node: Node<'_>, before: &[Node<'_>]) -> usize {
        let mut row = node.start_position().row;
        let floor = before
            .iter()
            .rev()
            .find(|n| !self.table.is_leading(n.kind()))
            .map(last_row);

        for sibling in before.iter().rev() {
            if !self.table.is_leading(sibling.kind()) {
                break;
            }
            let start = sibling.start_position().row;
            if floor.is_some_and(|f| start <= f) || last_row(sibling) + 1 < row {
                break;
            }
            row = start;
        }
        row
    }

    fn embedded_script(&mut self, element: Node<'_>) {
        let Some(raw) = named_children(element)
            .into_iter()
            .find(|c| c.kind() == "raw_text")
        else {
            return;
        };
        let language = script_language(element, self.source);
        let Some(table) = table_for(language) else {
            return;
        };
        let Some(mut parser) = self
            .registry
            .get_language(language)
            .and_then(|grammar| grammar.parser())
        else {
            debug!(%language, "no grammar for embedded script");
            return;
        };

        let source: &'a [u8] = self.source;
        let Ok(text) = std::str::from_utf8(&source[raw.byte_range()]) else {
            return;
        };
        let Some(tree) = parser.parse(text, None) else {
            return;
        };

        let offset = u32::try_from(raw.start_position().row).unwrap_or(0);
        let mut sub = Walk {
            source: text.as_bytes(),
            table,
            language,
            embedded: true,
            line_offset: self.line_offset + offset,
            registry: self.registry,
            out: Vec::new(),
        };
        sub.top_level(tree.root_node());
        debug!(%language, breakpoints = sub.out.len(), "embedded script");
        self.out.append(&mut sub.out);
    }
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn push_initializers<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    for field in ["value", "right"] {
        if let Some(value) = node.child_by_field_name(field) {
            if value.kind() == "expression_list" {
                out.extend(named_children(value));
            } else {
                out.push(value);
            }
        }
    }
}

/// Last row holding the node's text. Nodes that swallow their trailing
/// newline end at column 0 of the following row.
fn last_row(node: &Node<'_>) -> usize {
    let end = node.end_position();
    if end.column == 0 && end.row > node.start_position().row {
        end.row - 1
    } else {
        end.row
    }
}

fn line_span(node: Node<'_>) -> usize {
    last_row(&node) - node.start_position().row + 1
}

pub(crate) fn node_text<'s>(node: Node<'_>, source: &'s [u8]) -> &'s str {
    source
        .get(node.byte_range())
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .unwrap_or("")
}

/// `type X struct {}` is a class, `type X interface {}` an interface.
fn go_type(node: Node<'_>) -> Option<ChunkType> {
    let specs: Vec<_> = named_children(node)
        .into_iter()
        .filter(|c| c.kind() == "type_spec")
        .collect();
    let [spec] = specs.as_slice() else {
        return None;
    };
    match spec.child_by_field_name("type")?.kind() {
        "struct_type" => Some(ChunkType::Class),
        "interface_type" => Some(ChunkType::Interface),
        _ => None,
    }
}

/// Swift folds struct, enum and extension into `class_declaration`.
fn swift_type(node: Node<'_>, source: &[u8]) -> Option<ChunkType> {
    let keyword = node.child_by_field_name("declaration_kind")?;
    match node_text(keyword, source) {
        "enum" => Some(ChunkType::Type),
        _ => None,
    }
}

/// Language of a `<script>` block from its `lang` attribute.
fn script_language(element: Node<'_>, source: &[u8]) -> Language {
    let lang = named_children(element)
        .into_iter()
        .find(|c| c.kind() == "start_tag")
        .and_then(|tag| {
            named_children(tag).into_iter().find_map(|attr| {
                if attr.kind() != "attribute" {
                    return None;
                }
                let parts = named_children(attr);
                let name = parts.first()?;
                if node_text(*name, source) != "lang" {
                    return None;
                }
                let value = parts.get(1)?;
                let value = named_children(*value).into_iter().next().unwrap_or(*value);
                Some(node_text(value, source).trim_matches(['"', '\'']).to_string())
            })
        });

    match lang.as_deref().map(Language::from_name) {
        Some(Language::TypeScript) => Language::TypeScript,
        Some(Language::Tsx) => Language::Tsx,
        _ => Language::JavaScript,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(source: &str, language: Language) -> Vec<Breakpoint> {
        let registry = GrammarRegistry::new();
        let grammar = registry.get_language(language).unwrap();
        let mut parser = grammar.parser().unwrap();
        let tree = parser.parse(source, None).unwrap();
        normalize(extract(tree.root_node(), source, language, &registry))
    }

    fn lines_and_types(points: &[Breakpoint]) -> Vec<(u32, Option<ChunkType>)> {
        points.iter().map(|p| (p.line, p.chunk_type)).collect()
    }

    #[test]
    fn export_wrapping_takes_the_declaration_type() {
        let src = "export class A {}\nexport function b() {}\nexport { A };\n";
        let found = points(src, Language::TypeScript);
        assert_eq!(
            lines_and_types(&found),
            vec![
                (1, Some(ChunkType::Class)),
                (2, Some(ChunkType::Function)),
                (3, Some(ChunkType::Export)),
            ]
        );
    }

    #[test]
    fn arrow_function_variable_is_function() {
        let src = "const add = (a: number, b: number) => a + b;\nconst limit = 10;\n";
        let found = points(src, Language::TypeScript);
        assert_eq!(found[0].chunk_type, Some(ChunkType::Function));
        assert_eq!(found[1].chunk_type, Some(ChunkType::Variable));
    }

    #[test]
    fn methods_stay_inside_their_class() {
        let src = "\
class Greeter {
  greet() {
    return 'hi';
  }
  wave() {
    return 'bye';
  }
}
";
        let found = points(src, Language::TypeScript);
        assert_eq!(lines_and_types(&found), vec![(1, Some(ChunkType::Class))]);
    }

    #[test]
    fn nested_function_within_depth_is_recorded() {
        let src = "\
function outer() {
  function inner() {
    return 1;
  }
  return inner();
}
";
        let found = points(src, Language::JavaScript);
        assert_eq!(
            lines_and_types(&found),
            vec![(1, Some(ChunkType::Function)), (2, Some(ChunkType::Function))]
        );
    }

    #[test]
    fn leading_comments_attach_to_declaration() {
        let src = "\
fn first() {}

/// Second.
#[inline]
fn second() {}
";
        let found = points(src, Language::Rust);
        assert_eq!(found[1].line, 3);
    }

    #[test]
    fn trailing_comment_does_not_steal_next_declaration() {
        let src = "fn a() {} // trailing\nfn b() {}\n";
        let found = points(src, Language::Rust);
        assert_eq!(lines_and_types(&found).len(), 2);
        assert_eq!(found[1].line, 2);
    }

    #[test]
    fn python_decorated_definition() {
        let src = "import os\n\n@cache\ndef load():\n    return 1\n";
        let found = points(src, Language::Python);
        assert_eq!(
            lines_and_types(&found),
            vec![(1, Some(ChunkType::Import)), (3, Some(ChunkType::Function))]
        );
    }

    #[test]
    fn decorated_method_body_is_walked_once() {
        let src = "\
@app.route('/')
def index():
    def render():
        return 1
    return render()
";
        let found = points(src, Language::Python);
        assert_eq!(
            lines_and_types(&found),
            vec![(1, Some(ChunkType::Function)), (3, Some(ChunkType::Function))]
        );
    }

    #[test]
    fn exported_function_body_is_walked_once() {
        let src = "\
export function outer() {
  function inner() {
    return 1;
  }
  return inner();
}
";
        let found = points(src, Language::TypeScript);
        assert_eq!(
            lines_and_types(&found),
            vec![(1, Some(ChunkType::Function)), (2, Some(ChunkType::Function))]
        );
    }

    #[test]
    fn go_struct_and_interface() {
        let src = "package main\n\ntype A struct{}\n\ntype B interface{}\n";
        let found = points(src, Language::Go);
        assert_eq!(found[1].chunk_type, Some(ChunkType::Class));
        assert_eq!(found[2].chunk_type, Some(ChunkType::Interface));
    }

    #[test]
    fn vue_script_is_parsed_in_its_language() {
        let src = "\
<template>
  <div>{{ msg }}</div>
</template>

<script lang=\"ts\">
import { ref } from 'vue';

export default {
  data() {
    return { msg: 'hi' };
  },
};
</script>

<style>
div { color: red; }
</style>
";
        let found = points(src, Language::Vue);
        let found = lines_and_types(&found);
        assert!(found.contains(&(1, Some(ChunkType::Template))));
        assert!(found.contains(&(5, Some(ChunkType::Script))));
        assert!(found.contains(&(6, Some(ChunkType::Import))));
        assert!(found.contains(&(8, Some(ChunkType::Component))));
        assert!(found.contains(&(9, Some(ChunkType::Data))));
        assert!(found.contains(&(15, Some(ChunkType::Css))));
    }

    #[test]
    fn normalize_collapses_mixed_import_export_runs() {
        let found = normalize(vec![
            Breakpoint::new(1, Some(ChunkType::Import)),
            Breakpoint::new(2, Some(ChunkType::Export)),
            Breakpoint::new(4, Some(ChunkType::Function)),
            Breakpoint::new(9, Some(ChunkType::Import)),
        ]);
        let lines: Vec<u32> = found.iter().map(|p| p.line).collect();
        assert_eq!(lines, vec![1, 4, 9]);
    }
}
