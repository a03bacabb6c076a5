//! Filename-pattern filtering with gitignore syntax.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::WatcherError;
use crate::Result;

/// Patterns always ignored: office lock files, temp files, hidden entries,
/// editor backups and swap files.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "~$*", "*.tmp", "*.temp", ".*", "*~", "*.swp", "*.swo", "*.swx", "*.bak", "*.part",
    "*.crdownload",
];

/// Decides which paths under a root are invisible to the sync core.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    root: PathBuf,
    gitignore: Gitignore,
}

impl IgnoreFilter {
    /// Build a filter from the default patterns plus `extra`.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Pattern` if any pattern is invalid.
    pub fn new(root: impl AsRef<Path>, extra: &[String]) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut builder = GitignoreBuilder::new(&root);

        let patterns = DEFAULT_IGNORE_PATTERNS
            .iter()
            .copied()
            .chain(extra.iter().map(String::as_str));
        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| WatcherError::Pattern(format!("{pattern}: {e}")))?;
        }

        let gitignore = builder
            .build()
            .map_err(|e| WatcherError::Pattern(format!("failed to build matcher: {e}")))?;

        Ok(Self { root, gitignore })
    }

    /// Root the filter is anchored at.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a single entry matches, ignoring its ancestors.
    ///
    /// Used during a walk, where ignored directories are already pruned.
    #[must_use]
    pub fn is_ignored_entry(&self, path: &Path, is_dir: bool) -> bool {
        self.gitignore.matched(path, is_dir).is_ignore()
    }

    /// Whether `path` or any directory between it and the root is ignored.
    #[must_use]
    pub fn is_ignored(&self, path: &Path) -> bool {
        if self.is_ignored_entry(path, false) {
            return true;
        }

        path.ancestors()
            .skip(1)
            .take_while(|ancestor| ancestor.starts_with(&self.root) && *ancestor != self.root)
            .any(|ancestor| self.is_ignored_entry(ancestor, true))
    }
}
