//! Lazily populated, single-flight grammar cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, warn};

use crate::language::Language;

/// A loaded parser grammar.
#[derive(Clone)]
pub struct Grammar {
    language: Language,
    inner: tree_sitter::Language,
}

impl Grammar {
    /// Wrap a compiled tree-sitter grammar.
    pub fn new(language: Language, inner: tree_sitter::Language) -> Self {
        Self { language, inner }
    }

    /// The language this grammar parses.
    pub fn language(&self) -> Language {
        self.language
    }

    /// The underlying tree-sitter grammar.
    pub fn ts_language(&self) -> &tree_sitter::Language {
        &self.inner
    }

    /// Create a parser bound to this grammar.
    ///
    /// Parsers carry per-parse state, so each parse gets its own.
    pub fn parser(&self) -> Option<tree_sitter::Parser> {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&self.inner).ok()?;
        Some(parser)
    }
}

impl std::fmt::Debug for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

type Loader = dyn Fn(Language) -> Result<tree_sitter::Language, String> + Send + Sync;
type Slot = Arc<OnceLock<Option<Grammar>>>;

/// Per-language grammar cache keyed by file extension.
///
/// The first request for a language loads its grammar; concurrent requests
/// for the same uncached language wait on that single load instead of
/// starting their own. A failed load is cached as "not found" until
/// [`reset`](Self::reset) or [`clear`](Self::clear).
///
/// # Examples
///
/// ```
/// use sift_grammar::GrammarRegistry;
///
/// let registry = GrammarRegistry::new();
/// assert!(registry.supports("ts"));
/// assert!(!registry.supports("txt"));
/// let grammar = registry.get("ts").unwrap();
/// assert_eq!(grammar.language().name(), "typescript");
/// ```
pub struct GrammarRegistry {
    slots: Mutex<HashMap<Language, Slot>>,
    loader: Box<Loader>,
    loads: AtomicUsize,
}

impl GrammarRegistry {
    /// Registry backed by the compiled-in tree-sitter grammars.
    pub fn new() -> Self {
        Self::with_loader(builtin_loader)
    }

    /// Registry with a custom loader, e.g. to simulate missing grammars.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn(Language) -> Result<tree_sitter::Language, String> + Send + Sync + 'static,
    {
        Self {
            slots: Mutex::new(HashMap::new()),
            loader: Box::new(loader),
            loads: AtomicUsize::new(0),
        }
    }

    /// Whether the extension maps to a language this registry can serve.
    ///
    /// Does not force a load; a language whose load already failed reports
    /// `false`.
    pub fn supports(&self, extension: &str) -> bool {
        self.supports_language(Language::from_extension(extension))
    }

    /// Language-keyed form of [`supports`](Self::supports).
    pub fn supports_language(&self, language: Language) -> bool {
        if language == Language::Unknown {
            return false;
        }
        let slots = self.lock_slots();
        match slots.get(&language).and_then(|slot| slot.get()) {
            Some(loaded) => loaded.is_some(),
            None => true,
        }
    }

    /// Get the grammar for a file extension, loading it on first access.
    ///
    /// Returns `None` for unknown extensions or when loading failed.
    pub fn get(&self, extension: &str) -> Option<Grammar> {
        self.get_language(Language::from_extension(extension))
    }

    /// Get the grammar for a language, loading it on first access.
    pub fn get_language(&self, language: Language) -> Option<Grammar> {
        if language == Language::Unknown {
            return None;
        }

        let slot = {
            let mut slots = self.lock_slots();
            Arc::clone(slots.entry(language).or_default())
        };

        slot.get_or_init(|| self.load(language)).clone()
    }

    /// Number of loads performed since creation or the last reset.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Drop every cached grammar, including cached failures.
    pub fn clear(&self) {
        self.lock_slots().clear();
    }

    /// Drop every cached grammar and zero the load counter.
    pub fn reset(&self) {
        self.clear();
        self.loads.store(0, Ordering::SeqCst);
    }

    fn load(&self, language: Language) -> Option<Grammar> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match (self.loader)(language) {
            Ok(inner) => {
                debug!(language = %language, "loaded grammar");
                Some(Grammar::new(language, inner))
            }
            Err(reason) => {
                warn!(language = %language, %reason, "grammar unavailable");
                None
            }
        }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<Language, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for GrammarRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GrammarRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammarRegistry")
            .field("loads", &self.loads())
            .finish_non_exhaustive()
    }
}

fn builtin_loader(language: Language) -> Result<tree_sitter::Language, String> {
    let ts = language
        .tree_sitter_language()
        .ok_or_else(|| format!("no grammar compiled in for {language}"))?;
    // Rejects grammars built against an incompatible ABI.
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&ts)
        .map_err(|e| format!("failed to set language: {e}"))?;
    Ok(ts)
}
