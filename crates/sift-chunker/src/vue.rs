//! Component-aware types for declarations inside markup `<script>` blocks.
//!
//! Covers both the options API (`export default { data() {}, computed: {} }`)
//! and the composition API (`const x = computed(...)`, `onMounted(...)`).

use sift_core::ChunkType;
use tree_sitter::Node;

use crate::breakpoints::node_text;

const OPTION_HOOKS: &[&str] = &[
    "beforeCreate",
    "created",
    "beforeMount",
    "mounted",
    "beforeUpdate",
    "updated",
    "beforeUnmount",
    "unmounted",
    "beforeDestroy",
    "destroyed",
    "activated",
    "deactivated",
    "errorCaptured",
];

const COMPOSITION_HOOKS: &[&str] = &[
    "onBeforeMount",
    "onMounted",
    "onBeforeUpdate",
    "onUpdated",
    "onBeforeUnmount",
    "onUnmounted",
    "onActivated",
    "onDeactivated",
    "onErrorCaptured",
    "onMount",
    "onDestroy",
    "beforeUpdate",
    "afterUpdate",
];

/// `const total = computed(...)`, `const state = reactive(...)`.
pub fn declaration_type(node: Node<'_>, source: &[u8]) -> Option<ChunkType> {
    let mut cursor = node.walk();
    let declarators: Vec<_> = node.named_children(&mut cursor).collect();
    declarators.into_iter().find_map(|declarator| {
        let value = declarator.child_by_field_name("value")?;
        match callee(value, source)? {
            "computed" => Some(ChunkType::Computed),
            "ref" | "reactive" | "shallowRef" | "shallowReactive" | "toRefs" | "defineProps"
            | "withDefaults" => Some(ChunkType::Data),
            "watch" | "watchEffect" => Some(ChunkType::Watch),
            "defineComponent" => Some(ChunkType::Component),
            _ => None,
        }
    })
}

/// `export default {...}` and top-level hook calls.
pub fn statement_type(node: Node<'_>, source: &[u8]) -> Option<ChunkType> {
    match node.kind() {
        "export_statement" => {
            let value = node.child_by_field_name("value")?;
            match value.kind() {
                "object" => Some(ChunkType::Component),
                "call_expression" if callee(value, source) == Some("defineComponent") => {
                    Some(ChunkType::Component)
                }
                _ => None,
            }
        }
        "expression_statement" => {
            let mut cursor = node.walk();
            let call = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "call_expression")?;
            let name = callee(call, source)?;
            if COMPOSITION_HOOKS.contains(&name) {
                Some(ChunkType::Lifecycle)
            } else {
                match name {
                    "watch" | "watchEffect" => Some(ChunkType::Watch),
                    "defineProps" | "defineEmits" | "provide" => Some(ChunkType::Data),
                    _ => None,
                }
            }
        }
        _ => None,
    }
}

/// Members of an options-API component object.
pub fn option_type(node: Node<'_>, source: &[u8]) -> Option<ChunkType> {
    let key = match node.kind() {
        "method_definition" => node.child_by_field_name("name")?,
        "pair" => node.child_by_field_name("key")?,
        _ => return None,
    };
    let name = node_text(key, source).trim_matches(['"', '\'']);
    if OPTION_HOOKS.contains(&name) {
        return Some(ChunkType::Lifecycle);
    }
    match name {
        "data" | "props" | "setup" => Some(ChunkType::Data),
        "computed" => Some(ChunkType::Computed),
        "watch" => Some(ChunkType::Watch),
        "methods" => Some(ChunkType::Method),
        _ => None,
    }
}

fn callee<'s>(call: Node<'_>, source: &'s [u8]) -> Option<&'s str> {
    if call.kind() != "call_expression" {
        return None;
    }
    let function = call.child_by_field_name("function")?;
    Some(node_text(function, source))
}
