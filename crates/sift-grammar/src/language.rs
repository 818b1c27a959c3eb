use std::path::Path;

/// Programming or markup language detected from a file extension.
///
/// # Examples
///
/// ```
/// use sift_grammar::Language;
///
/// assert_eq!(Language::from_extension("rs"), Language::Rust);
/// assert_eq!(Language::from_extension("tsx"), Language::Tsx);
/// assert_eq!(Language::from_extension(".vue"), Language::Vue);
/// assert_eq!(Language::from_extension("txt"), Language::Unknown);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    Tsx,
    JavaScript,
    Go,
    Java,
    C,
    Cpp,
    Ruby,
    Php,
    Kotlin,
    Swift,
    Html,
    Vue,
    Svelte,
    Unknown,
}

impl Language {
    /// Detect language from a file extension (with or without the leading dot).
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
            "rb" => Language::Ruby,
            "php" => Language::Php,
            "kt" | "kts" => Language::Kotlin,
            "swift" => Language::Swift,
            "html" | "htm" => Language::Html,
            "vue" => Language::Vue,
            "svelte" => Language::Svelte,
            _ => Language::Unknown,
        }
    }

    /// Detect language from a path's extension.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use sift_grammar::Language;
    ///
    /// assert_eq!(Language::from_path(Path::new("src/App.vue")), Language::Vue);
    /// assert_eq!(Language::from_path(Path::new("Makefile")), Language::Unknown);
    /// ```
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Parse a language name as written in a `lang="..."` attribute or a
    /// stored chunk row.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "rust" => Language::Rust,
            "python" => Language::Python,
            "typescript" | "ts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "javascript" | "js" | "jsx" => Language::JavaScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" | "c++" => Language::Cpp,
            "ruby" => Language::Ruby,
            "php" => Language::Php,
            "kotlin" => Language::Kotlin,
            "swift" => Language::Swift,
            "html" => Language::Html,
            "vue" => Language::Vue,
            "svelte" => Language::Svelte,
            _ => Language::Unknown,
        }
    }

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::Html => "html",
            Language::Vue => "vue",
            Language::Svelte => "svelte",
            Language::Unknown => "unknown",
        }
    }

    /// Whether files of this language embed `<script>` sub-programs.
    pub fn is_markup(self) -> bool {
        matches!(self, Language::Html | Language::Vue | Language::Svelte)
    }

    /// Whether JSX syntax can appear in this language.
    pub fn allows_jsx(self) -> bool {
        matches!(self, Language::Tsx | Language::JavaScript)
    }

    /// Get the compiled tree-sitter grammar for this language.
    ///
    /// Markup languages share the HTML grammar. Returns `None` for
    /// [`Language::Unknown`].
    pub fn tree_sitter_language(self) -> Option<tree_sitter::Language> {
        match self {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Language::C => Some(tree_sitter_c::LANGUAGE.into()),
            Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
            Language::Ruby => Some(tree_sitter_ruby::LANGUAGE.into()),
            Language::Php => Some(tree_sitter_php::LANGUAGE_PHP.into()),
            Language::Kotlin => Some(tree_sitter_kotlin_ng::LANGUAGE.into()),
            Language::Swift => Some(tree_sitter_swift::LANGUAGE.into()),
            Language::Html | Language::Vue | Language::Svelte => {
                Some(tree_sitter_html::LANGUAGE.into())
            }
            Language::Unknown => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_detection_is_case_insensitive() {
        assert_eq!(Language::from_extension("PY"), Language::Python);
        assert_eq!(Language::from_extension(".Ts"), Language::TypeScript);
    }

    #[test]
    fn names_round_trip() {
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
            Language::Html,
            Language::Vue,
            Language::Svelte,
        ] {
            assert_eq!(Language::from_name(lang.name()), lang);
            assert!(lang.tree_sitter_language().is_some(), "{lang} has no grammar");
        }
    }

    #[test]
    fn unknown_has_no_grammar() {
        assert!(Language::Unknown.tree_sitter_language().is_none());
    }

    #[test]
    fn markup_languages_flagged() {
        assert!(Language::Vue.is_markup());
        assert!(Language::Svelte.is_markup());
        assert!(!Language::TypeScript.is_markup());
        assert!(Language::Tsx.allows_jsx());
        assert!(!Language::TypeScript.allows_jsx());
    }
}
