use std::sync::Arc;

use sift_chunker::{AstChunker, ChunkOutcome, Chunker, ChunkerSet, ParseMethod};
use sift_core::{ChunkType, ChunkerConfig};
use sift_grammar::{GrammarRegistry, Language};

fn chunk(path: &str, text: &str, language: Language) -> ChunkOutcome {
    AstChunker::new(Arc::new(GrammarRegistry::new())).chunk(path, text, language, 1500)
}

fn shape(outcome: &ChunkOutcome) -> Vec<(u32, u32, ChunkType)> {
    outcome
        .chunks
        .iter()
        .map(|c| (c.start_line, c.end_line, c.chunk_type))
        .collect()
}

const GREETER_TS: &str = "\
export class Greeter {
  private name: string;
  private count = 0;
  private loud = false;

  greet(): string {
    this.count += 1;
    return `Hello, ${this.name}`;
  }

  shout(): string {
    return this.greet().toUpperCase();
  }
}

export function makeGreeter(name: string): Greeter {
  const greeter = new Greeter();
  greeter.name = name;
  return greeter;
}
";

#[test]
fn exported_class_and_trailing_function_give_two_chunks() {
    assert_eq!(GREETER_TS.lines().count(), 20);
    let outcome = chunk("src/greeter.ts", GREETER_TS, Language::TypeScript);
    assert!(outcome.parse_success);
    assert_eq!(outcome.parse_method, ParseMethod::Ast);
    assert_eq!(
        shape(&outcome),
        vec![(1, 15, ChunkType::Class), (16, 20, ChunkType::Function)]
    );
}

#[test]
fn import_block_becomes_one_chunk() {
    let src = "\
import a from 'a';
import b from 'b';
import { c } from 'c';
import * as d from 'd';
import 'e';
function main() {
  return a + b;
}
";
    let outcome = chunk("src/main.ts", src, Language::TypeScript);
    assert_eq!(
        shape(&outcome),
        vec![(1, 5, ChunkType::Import), (6, 8, ChunkType::Function)]
    );
}

#[test]
fn consecutive_consts_merge_into_one_variable_chunk() {
    let src = "const a = 1;\n\nconst b = 2;\n\nconst c = 3;\n";
    let outcome = chunk("src/consts.ts", src, Language::TypeScript);
    assert_eq!(shape(&outcome), vec![(1, 5, ChunkType::Variable)]);
    assert_eq!(outcome.chunks[0].text, src.trim_end());
    assert_eq!(outcome.chunks[0].id, "src/consts.ts:1-5");
}

#[test]
fn preamble_is_attached_to_the_first_chunk() {
    let src = "// Utility helpers.\n// Shared by the CLI.\n\nfunction helper() {\n  return 1;\n}\n";
    let outcome = chunk("src/util.js", src, Language::JavaScript);
    assert_eq!(outcome.chunks.len(), 1);
    let first = &outcome.chunks[0];
    assert_eq!(first.start_line, 1);
    assert_eq!(first.chunk_type, ChunkType::Function);
    assert!(first.text.starts_with("// Utility helpers."));
}

#[test]
fn file_without_breakpoints_is_one_heuristic_chunk() {
    let src = "print('hi')\nprint('bye')\n";
    let outcome = chunk("run.py", src, Language::Python);
    assert!(outcome.parse_success);
    assert_eq!(shape(&outcome), vec![(1, 2, ChunkType::Block)]);
}

#[test]
fn rechunking_is_deterministic() {
    let first = chunk("src/greeter.ts", GREETER_TS, Language::TypeScript);
    let second = chunk("src/greeter.ts", GREETER_TS, Language::TypeScript);
    assert_eq!(shape(&first), shape(&second));
    let ids = |o: &ChunkOutcome| o.chunks.iter().map(|c| c.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn chunks_never_overlap_and_sequence_follows_lines() {
    let src = "\
use std::collections::HashMap;
use std::fmt;

const LIMIT: usize = 10;
const NAME: &str = \"sift\";

/// A thing.
pub struct Thing {
    map: HashMap<String, usize>,
}

impl Thing {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }
}

impl fmt::Display for Thing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, \"{}\", self.map.len())
    }
}

fn main() {
    fn nested() {}
    nested();
}
";
    let outcome = chunk("src/main.rs", src, Language::Rust);
    assert!(outcome.parse_success);
    let chunks = &outcome.chunks;
    assert!(chunks.len() >= 6);
    for pair in chunks.windows(2) {
        assert!(pair[0].end_line < pair[1].start_line);
        assert!(pair[0].sequence_index < pair[1].sequence_index);
    }
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.sequence_index as usize, i);
        assert!(c.start_line <= c.end_line);
        assert_eq!(c.id, format!("src/main.rs:{}-{}", c.start_line, c.end_line));
    }

    let types: Vec<ChunkType> = chunks.iter().map(|c| c.chunk_type).collect();
    assert_eq!(types[0], ChunkType::Import);
    assert_eq!(types[1], ChunkType::Variable);
    assert!(types.contains(&ChunkType::Class));
    // Doc comment travels with the struct.
    let thing = chunks.iter().find(|c| c.text.contains("pub struct Thing")).unwrap();
    assert_eq!(thing.start_line, 7);
}

#[test]
fn vue_single_file_component() {
    let src = "\
<template>
  <button @click=\"increment\">{{ count }}</button>
</template>

<script setup lang=\"ts\">
import { ref, computed, onMounted } from 'vue';

const count = ref(0);
const doubled = computed(() => count.value * 2);

onMounted(() => {
  console.log('ready');
});
</script>

<style scoped>
button { color: red; }
</style>
";
    let outcome = chunk("src/Counter.vue", src, Language::Vue);
    assert!(outcome.parse_success);
    let types: Vec<ChunkType> = outcome.chunks.iter().map(|c| c.chunk_type).collect();
    assert_eq!(
        types,
        vec![
            ChunkType::Template,
            ChunkType::Script,
            ChunkType::Import,
            ChunkType::Data,
            ChunkType::Computed,
            ChunkType::Lifecycle,
            ChunkType::Css,
        ]
    );
    assert!(outcome.chunks.iter().all(|c| c.language == "vue"));
}

#[test]
fn python_class_keeps_its_methods() {
    let src = "\
import os


class Store:
    def __init__(self):
        self.items = []

    def add(self, item):
        self.items.append(item)


def main():
    Store().add(os.getcwd())
";
    let outcome = chunk("store.py", src, Language::Python);
    assert_eq!(
        shape(&outcome),
        vec![
            (1, 3, ChunkType::Import),
            (4, 11, ChunkType::Class),
            (12, 13, ChunkType::Function),
        ]
    );
}

#[test]
fn token_budget_splits_large_chunks() {
    let body: String = (0..200).map(|i| format!("    total += {i};\n")).collect();
    let src = format!("function sum() {{\n    let total = 0;\n{body}    return total;\n}}\n");
    let chunker = AstChunker::new(Arc::new(GrammarRegistry::new()));
    let outcome = chunker.chunk("sum.js", &src, Language::JavaScript, 200);
    assert!(outcome.chunks.len() > 1);
    assert!(outcome
        .chunks
        .iter()
        .all(|c| sift_chunker::estimate_tokens(&c.text) <= 200));
    assert!(outcome
        .chunks
        .iter()
        .all(|c| c.chunk_type == ChunkType::Function));
}

#[test]
fn chunker_set_uses_configured_budget_and_degrades() {
    let config = ChunkerConfig {
        token_budget: 50,
        ..ChunkerConfig::default()
    };
    let set = ChunkerSet::new(Arc::new(GrammarRegistry::new()), &config);
    assert_eq!(set.token_budget(), 50);

    let outcome = set.chunk("notes.unknown", "alpha\nbeta\n", Language::Unknown);
    assert_eq!(outcome.parse_method, ParseMethod::Fallback);
    assert_eq!(outcome.chunks.len(), 1);
}
