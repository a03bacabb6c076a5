//! In-process vector store.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use uuid::Uuid;

use super::{Fragment, VectorStore};
use crate::Result;

/// Keeps fragments in memory under random UUID document ids.
///
/// Stores no embeddings; it exists so the sync pipeline can run end to
/// end without an external service.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    documents: RwLock<BTreeMap<String, Fragment>>,
}

impl MemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    #[must_use]
    pub fn get(&self, document_id: &str) -> Option<Fragment> {
        self.documents.read().get(document_id).cloned()
    }

    #[must_use]
    pub fn contains(&self, document_id: &str) -> bool {
        self.documents.read().contains_key(document_id)
    }
}

impl VectorStore for MemoryVectorStore {
    fn add(&self, fragments: &[Fragment]) -> Result<Vec<String>> {
        let mut documents = self.documents.write();
        let ids = fragments
            .iter()
            .map(|fragment| {
                let id = Uuid::new_v4().to_string();
                documents.insert(id.clone(), fragment.clone());
                id
            })
            .collect();
        Ok(ids)
    }

    /// Returns `false` if any id was unknown; known ids are still removed.
    fn delete(&self, document_ids: &[String]) -> Result<bool> {
        let mut documents = self.documents.write();
        let mut all_found = true;
        for id in document_ids {
            all_found &= documents.remove(id).is_some();
        }
        Ok(all_found)
    }

    fn clear(&self) -> Result<()> {
        self.documents.write().clear();
        Ok(())
    }

    fn list_ids(&self) -> Result<Option<Vec<String>>> {
        Ok(Some(self.documents.read().keys().cloned().collect()))
    }
}
