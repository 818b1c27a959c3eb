use std::path::PathBuf;

/// Errors that can occur across the sift crates.
///
/// Each variant maps to one failure domain. Library crates return this type
/// directly; the binary renders it as a `miette` diagnostic at the boundary.
///
/// Per-item failures (a chunk that could not be embedded, a file that could
/// not be parsed) are not reported through this type: they accumulate in run
/// summaries so multi-file jobs can finish partially.
///
/// # Examples
///
/// ```
/// use sift_core::SiftError;
///
/// let err = SiftError::SchemaMismatch { existing: 768, requested: 1024 };
/// assert!(err.to_string().contains("768"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum SiftError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration. Aborts a run immediately.
    #[error("configuration error: {0}")]
    Config(String),

    /// Grammar missing or unrecoverable syntax.
    #[error("parse error: {0}")]
    Parse(String),

    /// The embedding provider is unreachable or the model is not installed.
    #[error("embedding provider unavailable: {0}")]
    #[diagnostic(help("check that the provider is running and the model is pulled or enabled"))]
    ProviderUnavailable(String),

    /// An embedding request failed.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Vector dimensionality disagrees with the existing collection.
    #[error(
        "index was built with {existing}-dimensional vectors but {requested} were supplied"
    )]
    #[diagnostic(help("run `sift clear` (or `sift index --full`) to rebuild the index"))]
    SchemaMismatch {
        /// Dimensionality fixed by the first insert.
        existing: usize,
        /// Dimensionality of the rejected vectors.
        requested: usize,
    },

    /// Search attempted before any successful insert.
    #[error("index is not ready: nothing has been indexed yet")]
    #[diagnostic(help("run `sift index` first"))]
    IndexNotReady,

    /// SQLite failure.
    #[error("database error: {0}")]
    Database(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl SiftError {
    /// Whether this error must abort a whole indexing run rather than being
    /// recorded against a single file or chunk.
    ///
    /// # Examples
    ///
    /// ```
    /// use sift_core::SiftError;
    ///
    /// assert!(SiftError::Config("no model".into()).is_fatal());
    /// assert!(!SiftError::Parse("bad syntax".into()).is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SiftError::Config(_)
                | SiftError::ProviderUnavailable(_)
                | SiftError::SchemaMismatch { .. }
                | SiftError::Database(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SiftError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = SiftError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn schema_mismatch_names_both_dimensions() {
        let err = SiftError::SchemaMismatch {
            existing: 384,
            requested: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("384"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn not_ready_is_distinct_and_not_fatal() {
        let err = SiftError::IndexNotReady;
        assert!(err.to_string().contains("not ready"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = SiftError::FileNotFound(PathBuf::from("/tmp/missing.rs"));
        assert!(err.to_string().contains("/tmp/missing.rs"));
    }
}
