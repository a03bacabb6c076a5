//! Collaborator contracts: content parsing and vector storage.
//!
//! The sync core never reads file content or computes embeddings itself.
//! It hands a [`FileRecord`] to a [`Parser`], passes the resulting
//! fragments to a [`VectorStore`], and records the returned document ids.
//! Both traits are synchronous; the engine calls them from blocking tasks.

mod memory;
mod text;

use serde::{Deserialize, Serialize};

use crate::storage::{FileRecord, Metadata};
use crate::Result;

pub use memory::MemoryVectorStore;
pub use text::TextParser;

/// One piece of a file's content, ready for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Id of the owning file record.
    pub file_id: String,
    /// Path of the owning file at parse time.
    pub path: String,
    /// Position within the file.
    pub index: usize,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Parser output for one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub fragments: Vec<Fragment>,
    /// Content-derived metadata stored on the file record.
    pub metadata: Metadata,
}

/// Turns a file into fragments.
pub trait Parser: Send + Sync {
    /// Parse the file behind `record`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. The error is
    /// confined to this file.
    fn parse(&self, record: &FileRecord) -> Result<ParsedDocument>;
}

/// External store of embedded fragments keyed by document id.
pub trait VectorStore: Send + Sync {
    /// Store fragments, returning one document id per fragment, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the batch.
    fn add(&self, fragments: &[Fragment]) -> Result<Vec<String>>;

    /// Remove documents. `Ok(false)` means the store reported failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn delete(&self, document_ids: &[String]) -> Result<bool>;

    /// Drop every document.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be cleared.
    fn clear(&self) -> Result<()>;

    /// Every stored document id, when the store can enumerate them.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    fn list_ids(&self) -> Result<Option<Vec<String>>> {
        Ok(None)
    }
}
