use std::path::Path;

use sift_chunker::FileInput;
use sift_core::SiftError;
use sift_grammar::Language;
use tracing::debug;

/// Files above this size (1 MB) are not indexed.
const MAX_FILE_SIZE: u64 = 1_048_576;

/// Bytes inspected for NUL when sniffing binary content.
const BINARY_CHECK_SIZE: usize = 8192;

/// Collect indexable source files under `root`.
///
/// Honors `.gitignore` and friends, skips hidden entries (including the
/// `.sift/` index directory), binaries, oversized files and extensions no
/// chunker understands. Paths are relative to `root`, `/`-separated and
/// sorted.
///
/// # Errors
///
/// Returns [`SiftError::FileNotFound`] if `root` is not a directory.
pub fn discover(root: &Path) -> Result<Vec<FileInput>, SiftError> {
    if !root.is_dir() {
        return Err(SiftError::FileNotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in ignore::WalkBuilder::new(root).build() {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();

        let language = Language::from_path(path);
        if language == Language::Unknown {
            continue;
        }
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() <= MAX_FILE_SIZE => {}
            _ => {
                debug!(path = %path.display(), "skipping oversized or unreadable file");
                continue;
            }
        }
        let Ok(text) = std::fs::read_to_string(path) else {
            continue;
        };
        if text.as_bytes()[..text.len().min(BINARY_CHECK_SIZE)].contains(&0) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        files.push(FileInput {
            path: relative.to_string_lossy().replace('\\', "/"),
            text,
            language,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(count = files.len(), root = %root.display(), "discovered source files");
    Ok(files)
}
