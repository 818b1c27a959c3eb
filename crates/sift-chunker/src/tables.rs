//! Per-language node-type tables driving breakpoint extraction.
//!
//! Adding a language means adding a table here, not a new chunker.

use sift_core::ChunkType;
use sift_grammar::Language;

/// Node kinds that matter to the breakpoint walk for one grammar.
#[derive(Debug)]
pub struct NodeTable {
    /// Kinds recorded at depth 0, with the chunk type they start.
    pub top_level: &'static [(&'static str, ChunkType)],
    /// Kinds that wrap a declaration (e.g. `export_statement`). The first
    /// named child found in `top_level` decides the type; otherwise the
    /// optional default applies, and `None` means "not interesting".
    pub wrappers: &'static [(&'static str, Option<ChunkType>)],
    /// Kinds whose children are treated as if they sat at the parent's depth
    /// (e.g. C include guards).
    pub transparent: &'static [&'static str],
    /// Function-like kinds recorded at depths 1-3.
    pub nested_functions: &'static [&'static str],
    /// Declarations that count as function-like when initialized with one of
    /// `function_values`.
    pub variable_kinds: &'static [&'static str],
    /// Expression kinds that make a variable function-like.
    pub function_values: &'static [&'static str],
    /// JSX-like kinds recorded at depths 1-3 when spanning at least 3 lines.
    pub jsx: &'static [&'static str],
    /// Kinds the walk never descends into, so members stay with their owner.
    pub atomic: &'static [&'static str],
    /// Sibling kinds that attach to the declaration that follows them.
    pub leading: &'static [&'static str],
}

impl NodeTable {
    pub fn top_type(&self, kind: &str) -> Option<ChunkType> {
        self.top_level
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, t)| *t)
    }

    pub fn wrapper_default(&self, kind: &str) -> Option<Option<ChunkType>> {
        self.wrappers
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, t)| *t)
    }

    pub fn is_transparent(&self, kind: &str) -> bool {
        self.transparent.contains(&kind)
    }

    pub fn is_nested_function(&self, kind: &str) -> bool {
        self.nested_functions.contains(&kind)
    }

    pub fn is_variable(&self, kind: &str) -> bool {
        self.variable_kinds.contains(&kind)
    }

    pub fn is_function_value(&self, kind: &str) -> bool {
        self.function_values.contains(&kind)
    }

    pub fn is_jsx(&self, kind: &str) -> bool {
        self.jsx.contains(&kind)
    }

    pub fn is_atomic(&self, kind: &str) -> bool {
        self.atomic.contains(&kind)
    }

    pub fn is_leading(&self, kind: &str) -> bool {
        self.leading.contains(&kind)
    }
}

/// Look up the table for a language. `None` for [`Language::Unknown`].
pub fn table_for(language: Language) -> Option<&'static NodeTable> {
    match language {
        Language::TypeScript => Some(&TYPESCRIPT),
        Language::Tsx => Some(&TSX),
        Language::JavaScript => Some(&JAVASCRIPT),
        Language::Python => Some(&PYTHON),
        Language::Rust => Some(&RUST),
        Language::Go => Some(&GO),
        Language::Java => Some(&JAVA),
        Language::C => Some(&C),
        Language::Cpp => Some(&CPP),
        Language::Ruby => Some(&RUBY),
        Language::Php => Some(&PHP),
        Language::Kotlin => Some(&KOTLIN),
        Language::Swift => Some(&SWIFT),
        Language::Html | Language::Vue | Language::Svelte => Some(&MARKUP),
        Language::Unknown => None,
    }
}

const JS_TOP: &[(&str, ChunkType)] = &[
    ("import_statement", ChunkType::Import),
    ("class_declaration", ChunkType::Class),
    ("abstract_class_declaration", ChunkType::Class),
    ("function_declaration", ChunkType::Function),
    ("generator_function_declaration", ChunkType::Function),
    ("function_signature", ChunkType::Function),
    ("interface_declaration", ChunkType::Interface),
    ("type_alias_declaration", ChunkType::Type),
    ("enum_declaration", ChunkType::Type),
    ("lexical_declaration", ChunkType::Variable),
    ("variable_declaration", ChunkType::Variable),
    ("internal_module", ChunkType::Namespace),
    ("module", ChunkType::Namespace),
];

const JS_WRAPPERS: &[(&str, Option<ChunkType>)] = &[
    ("export_statement", Some(ChunkType::Export)),
    ("ambient_declaration", Some(ChunkType::Type)),
    ("expression_statement", None),
];

const JS_NESTED: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
];

const JS_VARIABLES: &[&str] = &["lexical_declaration", "variable_declaration"];

const JS_FUNCTION_VALUES: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

const JSX_KINDS: &[&str] = &["jsx_element", "jsx_self_closing_element"];

const JS_ATOMIC: &[&str] = &["class_body", "interface_body", "object_type"];

const TYPESCRIPT: NodeTable = NodeTable {
    top_level: JS_TOP,
    wrappers: JS_WRAPPERS,
    transparent: &[],
    nested_functions: JS_NESTED,
    variable_kinds: JS_VARIABLES,
    function_values: JS_FUNCTION_VALUES,
    jsx: &[],
    atomic: JS_ATOMIC,
    leading: &["comment"],
};

const TSX: NodeTable = NodeTable {
    jsx: JSX_KINDS,
    ..TYPESCRIPT
};

const JAVASCRIPT: NodeTable = NodeTable {
    jsx: JSX_KINDS,
    ..TYPESCRIPT
};

const PYTHON: NodeTable = NodeTable {
    top_level: &[
        ("import_statement", ChunkType::Import),
        ("import_from_statement", ChunkType::Import),
        ("future_import_statement", ChunkType::Import),
        ("class_definition", ChunkType::Class),
        ("function_definition", ChunkType::Function),
        ("assignment", ChunkType::Variable),
    ],
    wrappers: &[("decorated_definition", None), ("expression_statement", None)],
    transparent: &[],
    nested_functions: &["function_definition"],
    variable_kinds: &["assignment"],
    function_values: &["lambda"],
    jsx: &[],
    atomic: &["class_definition"],
    leading: &["comment"],
};

const RUST: NodeTable = NodeTable {
    top_level: &[
        ("use_declaration", ChunkType::Import),
        ("extern_crate_declaration", ChunkType::Import),
        ("function_item", ChunkType::Function),
        ("function_signature_item", ChunkType::Function),
        ("struct_item", ChunkType::Class),
        ("union_item", ChunkType::Class),
        ("impl_item", ChunkType::Class),
        ("trait_item", ChunkType::Interface),
        ("enum_item", ChunkType::Type),
        ("type_item", ChunkType::Type),
        ("mod_item", ChunkType::Namespace),
        ("const_item", ChunkType::Variable),
        ("static_item", ChunkType::Variable),
        ("macro_definition", ChunkType::Function),
    ],
    wrappers: &[],
    transparent: &[],
    nested_functions: &["function_item"],
    variable_kinds: &[],
    function_values: &[],
    jsx: &[],
    atomic: &["impl_item", "trait_item"],
    leading: &["line_comment", "block_comment", "attribute_item"],
};

const GO: NodeTable = NodeTable {
    top_level: &[
        ("package_clause", ChunkType::Namespace),
        ("import_declaration", ChunkType::Import),
        ("function_declaration", ChunkType::Function),
        ("method_declaration", ChunkType::Method),
        ("type_declaration", ChunkType::Type),
        ("var_declaration", ChunkType::Variable),
        ("const_declaration", ChunkType::Variable),
    ],
    wrappers: &[],
    transparent: &[],
    nested_functions: &[],
    variable_kinds: &["short_var_declaration", "var_declaration"],
    function_values: &["func_literal"],
    jsx: &[],
    atomic: &[],
    leading: &["comment"],
};

const JAVA: NodeTable = NodeTable {
    top_level: &[
        ("package_declaration", ChunkType::Namespace),
        ("import_declaration", ChunkType::Import),
        ("class_declaration", ChunkType::Class),
        ("record_declaration", ChunkType::Class),
        ("interface_declaration", ChunkType::Interface),
        ("annotation_type_declaration", ChunkType::Interface),
        ("enum_declaration", ChunkType::Type),
    ],
    wrappers: &[],
    transparent: &[],
    nested_functions: &[],
    variable_kinds: &[],
    function_values: &[],
    jsx: &[],
    atomic: &["class_body", "interface_body", "enum_body"],
    leading: &["line_comment", "block_comment"],
};

const C_TOP: &[(&str, ChunkType)] = &[
    ("preproc_include", ChunkType::Import),
    ("function_definition", ChunkType::Function),
    ("struct_specifier", ChunkType::Class),
    ("union_specifier", ChunkType::Class),
    ("enum_specifier", ChunkType::Type),
    ("preproc_def", ChunkType::Variable),
    ("preproc_function_def", ChunkType::Function),
    ("class_specifier", ChunkType::Class),
    ("namespace_definition", ChunkType::Namespace),
    ("alias_declaration", ChunkType::Type),
    ("using_declaration", ChunkType::Import),
    ("concept_definition", ChunkType::Type),
];

const C: NodeTable = NodeTable {
    top_level: C_TOP,
    wrappers: &[
        ("declaration", Some(ChunkType::Variable)),
        ("type_definition", Some(ChunkType::Type)),
    ],
    transparent: &["preproc_ifdef", "preproc_if", "preproc_else"],
    nested_functions: &["function_definition"],
    variable_kinds: &[],
    function_values: &[],
    jsx: &[],
    atomic: &["field_declaration_list", "compound_statement"],
    leading: &["comment"],
};

const CPP: NodeTable = NodeTable {
    wrappers: &[
        ("declaration", Some(ChunkType::Variable)),
        ("type_definition", Some(ChunkType::Type)),
        ("template_declaration", None),
    ],
    transparent: &[
        "preproc_ifdef",
        "preproc_if",
        "preproc_else",
        "linkage_specification",
    ],
    ..C
};

const RUBY: NodeTable = NodeTable {
    top_level: &[
        ("class", ChunkType::Class),
        ("module", ChunkType::Namespace),
        ("method", ChunkType::Function),
        ("singleton_method", ChunkType::Method),
        ("assignment", ChunkType::Variable),
    ],
    wrappers: &[],
    transparent: &[],
    nested_functions: &["method", "singleton_method"],
    variable_kinds: &["assignment"],
    function_values: &["lambda"],
    jsx: &[],
    atomic: &["class"],
    leading: &["comment"],
};

const PHP: NodeTable = NodeTable {
    top_level: &[
        ("namespace_definition", ChunkType::Namespace),
        ("namespace_use_declaration", ChunkType::Import),
        ("class_declaration", ChunkType::Class),
        ("trait_declaration", ChunkType::Class),
        ("interface_declaration", ChunkType::Interface),
        ("enum_declaration", ChunkType::Type),
        ("function_definition", ChunkType::Function),
        ("const_declaration", ChunkType::Variable),
        ("include_expression", ChunkType::Import),
        ("include_once_expression", ChunkType::Import),
        ("require_expression", ChunkType::Import),
        ("require_once_expression", ChunkType::Import),
        ("assignment_expression", ChunkType::Variable),
    ],
    wrappers: &[("expression_statement", None)],
    transparent: &[],
    nested_functions: &["function_definition"],
    variable_kinds: &["assignment_expression"],
    function_values: &["anonymous_function", "arrow_function"],
    jsx: &[],
    atomic: &["declaration_list"],
    leading: &["comment"],
};

const KOTLIN: NodeTable = NodeTable {
    top_level: &[
        ("package_header", ChunkType::Namespace),
        ("import", ChunkType::Import),
        ("import_header", ChunkType::Import),
        ("import_list", ChunkType::Import),
        ("class_declaration", ChunkType::Class),
        ("object_declaration", ChunkType::Class),
        ("function_declaration", ChunkType::Function),
        ("property_declaration", ChunkType::Variable),
        ("type_alias", ChunkType::Type),
    ],
    wrappers: &[],
    transparent: &[],
    nested_functions: &["function_declaration"],
    variable_kinds: &["property_declaration"],
    function_values: &["lambda_literal", "anonymous_function"],
    jsx: &[],
    atomic: &["class_body", "enum_class_body"],
    leading: &["line_comment", "block_comment", "multiline_comment"],
};

const SWIFT: NodeTable = NodeTable {
    top_level: &[
        ("import_declaration", ChunkType::Import),
        ("class_declaration", ChunkType::Class),
        ("protocol_declaration", ChunkType::Interface),
        ("function_declaration", ChunkType::Function),
        ("property_declaration", ChunkType::Variable),
        ("typealias_declaration", ChunkType::Type),
    ],
    wrappers: &[],
    transparent: &[],
    nested_functions: &["function_declaration"],
    variable_kinds: &["property_declaration"],
    function_values: &["lambda_literal"],
    jsx: &[],
    atomic: &["class_body", "protocol_body", "enum_class_body"],
    leading: &["comment", "multiline_comment"],
};

const MARKUP: NodeTable = NodeTable {
    top_level: &[
        ("script_element", ChunkType::Script),
        ("style_element", ChunkType::Css),
        ("element", ChunkType::Template),
    ],
    wrappers: &[],
    transparent: &[],
    nested_functions: &[],
    variable_kinds: &[],
    function_values: &[],
    jsx: &[],
    atomic: &["script_element", "style_element", "element"],
    leading: &["comment"],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_language_has_a_table() {
        for lang in [
            Language::Rust,
            Language::Python,
            Language::TypeScript,
            Language::Tsx,
            Language::JavaScript,
            Language::Go,
            Language::Java,
            Language::C,
            Language::Cpp,
            Language::Ruby,
            Language::Php,
            Language::Kotlin,
            Language::Swift,
            Language::Vue,
        ] {
            assert!(table_for(lang).is_some(), "{lang} has no table");
        }
        assert!(table_for(Language::Unknown).is_none());
    }

    #[test]
    fn jsx_only_where_the_grammar_has_it() {
        assert!(table_for(Language::Tsx).unwrap().is_jsx("jsx_element"));
        assert!(!table_for(Language::TypeScript).unwrap().is_jsx("jsx_element"));
    }

    #[test]
    fn lookups() {
        let ts = table_for(Language::TypeScript).unwrap();
        assert_eq!(ts.top_type("import_statement"), Some(ChunkType::Import));
        assert_eq!(ts.wrapper_default("export_statement"), Some(Some(ChunkType::Export)));
        assert_eq!(ts.wrapper_default("expression_statement"), Some(None));
        assert!(ts.is_atomic("class_body"));
        assert!(ts.is_function_value("arrow_function"));
    }
}
