//! Data models for the relational index.
//!
//! This module defines the core data structures used for:
//! - File records and their derived document ids
//! - Typed file metadata
//! - Index statistics

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::paths;
use crate::Result;

/// Get current Unix timestamp.
pub(crate) fn now_unix() -> i64 {
    system_time_to_unix(SystemTime::now())
}

/// Convert a `SystemTime` to Unix seconds, clamping pre-epoch values to 0.
pub(crate) fn system_time_to_unix(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Coarse content category derived from a file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Text,
    Pdf,
    Word,
    Image,
    Video,
    Audio,
    Directory,
    Other,
}

/// Extension table for [`FileType::from_path`].
const TYPE_EXTENSIONS: &[(&str, FileType)] = &[
    ("txt", FileType::Text),
    ("md", FileType::Text),
    ("json", FileType::Text),
    ("csv", FileType::Text),
    ("pdf", FileType::Pdf),
    ("doc", FileType::Word),
    ("docx", FileType::Word),
    ("jpg", FileType::Image),
    ("jpeg", FileType::Image),
    ("png", FileType::Image),
    ("gif", FileType::Image),
    ("mp4", FileType::Video),
    ("avi", FileType::Video),
    ("mov", FileType::Video),
    ("mp3", FileType::Audio),
    ("wav", FileType::Audio),
];

impl FileType {
    /// Classify a file by extension (case-insensitive).
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| {
                let ext = ext.to_lowercase();
                TYPE_EXTENSIONS
                    .iter()
                    .find(|(e, _)| *e == ext)
                    .map(|(_, t)| *t)
            })
            .unwrap_or(Self::Other)
    }

    /// Column representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Pdf => "pdf",
            Self::Word => "word",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Directory => "directory",
            Self::Other => "other",
        }
    }

    /// Parse the column representation. Unknown values map to `Other`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "text" => Self::Text,
            "pdf" => Self::Pdf,
            "word" => Self::Word,
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "directory" => Self::Directory,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Typed key-value metadata attached to a file record.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Persisted metadata row for one filesystem entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Stable id derived from the normalized path.
    pub id: String,

    /// Normalized absolute path.
    pub path: String,

    /// Final path component.
    pub name: String,

    /// Whether the entry is a directory.
    pub is_directory: bool,

    /// Category derived from the extension.
    pub file_type: FileType,

    /// Size in bytes (0 for directories).
    pub size: i64,

    /// Creation time (Unix seconds).
    pub created_at: i64,

    /// Last modification time (Unix seconds).
    pub modified_at: i64,

    /// Content-derived metadata.
    pub metadata: Metadata,

    /// External document ids produced for this file's content, in order.
    pub document_ids: Vec<String>,
}

impl FileRecord {
    /// Create a record for `path` without touching the filesystem.
    ///
    /// Id, name and file type are derived from the normalized path;
    /// size and timestamps start at zero.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        let normalized = paths::normalize_path(path.as_ref());
        let path_str = normalized.to_string_lossy().into_owned();
        Self {
            id: paths::id_for_normalized(&path_str),
            name: file_name(&path_str),
            is_directory: false,
            file_type: FileType::from_path(&normalized),
            size: 0,
            created_at: 0,
            modified_at: 0,
            metadata: Metadata::new(),
            document_ids: Vec::new(),
            path: path_str,
        }
    }

    /// Build a record from the live filesystem entry at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the entry cannot be stat'ed (e.g. it vanished).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)?;
        let mut record = Self::new(path);

        record.is_directory = meta.is_dir();
        if record.is_directory {
            record.file_type = FileType::Directory;
        } else {
            record.size = i64::try_from(meta.len()).unwrap_or(i64::MAX);
        }
        record.modified_at = meta.modified().map(system_time_to_unix).unwrap_or(0);
        record.created_at = meta
            .created()
            .map(system_time_to_unix)
            .unwrap_or(record.modified_at);

        Ok(record)
    }

    /// Set the size in bytes.
    #[must_use]
    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    /// Set the modification time.
    #[must_use]
    pub fn with_modified_at(mut self, modified_at: i64) -> Self {
        self.modified_at = modified_at;
        self
    }

    /// Set the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Add one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the document ids.
    #[must_use]
    pub fn with_document_ids(mut self, ids: Vec<String>) -> Self {
        self.document_ids = ids;
        self
    }

    /// Change the path (and derived name) while keeping the id.
    pub fn relocate(&mut self, new_path: &str) {
        self.path = new_path.to_string();
        self.name = file_name(new_path);
    }
}

/// Last component of a path string.
pub(crate) fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Row counts across the index tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Rows in the file table.
    pub files: i64,
    /// Rows in the document mapping table.
    pub mappings: i64,
    /// Distinct document ids referenced.
    pub unique_documents: i64,
}
