//! Path normalization and stable identifiers.
//!
//! Every component keys files by the same normalized absolute path, and
//! file ids are a pure function of that string.

use std::path::{Component, Path, PathBuf};

/// Normalize a path into an absolute, lexically clean form.
///
/// Relative paths are resolved against the current directory, `.` and `..`
/// components are folded without touching the filesystem.
///
/// Case is folded on Windows only. macOS volumes may be formatted
/// case-sensitive, and a lexical function cannot tell which kind it is
/// looking at, so paths there keep their case. On a case-insensitive
/// volume a rename that only changes case shows up as a move.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }

    if cfg!(windows) {
        PathBuf::from(out.to_string_lossy().to_lowercase())
    } else {
        out
    }
}

/// Normalized path rendered as the string stored in the index.
#[must_use]
pub fn normalize_str(path: &Path) -> String {
    normalize_path(path).to_string_lossy().into_owned()
}

/// Stable file id for a normalized path string.
#[must_use]
pub fn id_for_normalized(normalized: &str) -> String {
    let digest = blake3::hash(normalized.as_bytes()).to_hex();
    digest[..32].to_string()
}

/// Stable file id for any path (normalized first).
#[must_use]
pub fn file_id(path: &Path) -> String {
    id_for_normalized(&normalize_str(path))
}
