//! Document store: the single owner of uploaded documents.
//!
//! Tracks every upload, where its bytes live, and its indexing status.
//! Records are kept in upload order; that order is also the tie-break
//! between documents when search results are merged.
//!
//! Storage and bookkeeping never diverge: a record is only added after the
//! blob was written and only removed after the blob was deleted.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use pagelens_core::engine::BlobStore;
use pagelens_core::models::{Document, DocumentStatus};
use pagelens_core::{Error, Result};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

pub struct DocumentStore {
    blobs: Arc<dyn BlobStore>,
    docs: RwLock<Vec<Document>>,
}

impl DocumentStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            docs: RwLock::new(Vec::new()),
        }
    }

    /// Persist `bytes` and record a new `unindexed` document.
    pub async fn add(&self, bytes: &[u8], original_name: &str) -> Result<Document> {
        let original_name = if original_name.trim().is_empty() {
            "document.pdf".to_string()
        } else {
            original_name.trim().to_string()
        };

        let location = self
            .blobs
            .put(&original_name, bytes)
            .await
            .map_err(Error::Storage)?;

        let document = Document {
            id: Uuid::new_v4().to_string(),
            original_name,
            location,
            status: DocumentStatus::Unindexed,
            page_count: None,
            content_hash: hex::encode(Sha256::digest(bytes)),
            uploaded_at: Utc::now(),
            last_error: None,
        };

        self.write().push(document.clone());
        info!(
            document_id = %document.id,
            name = %document.original_name,
            bytes = bytes.len(),
            "document stored"
        );
        Ok(document)
    }

    /// Delete the document's bytes, then its record.
    ///
    /// Callers are responsible for retiring the index first; see
    /// [`Session::delete`](crate::session::Session::delete).
    pub async fn remove(&self, id: &str) -> Result<Document> {
        let location = self
            .get(id)
            .ok_or_else(|| Error::UnknownDocument(id.to_string()))?
            .location;

        self.blobs
            .delete(&location)
            .await
            .map_err(Error::Storage)?;

        let mut docs = self.write();
        let pos = docs
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| Error::UnknownDocument(id.to_string()))?;
        let removed = docs.remove(pos);
        info!(document_id = %id, "document removed");
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.read().iter().find(|d| d.id == id).cloned()
    }

    /// All documents, in upload order.
    pub fn list(&self) -> Vec<Document> {
        self.read().clone()
    }

    /// Documents whose index is queryable, in upload order.
    pub fn indexed(&self) -> Vec<Document> {
        self.read().iter().filter(|d| d.is_indexed()).cloned().collect()
    }

    pub fn is_indexed(&self, id: &str) -> bool {
        self.read().iter().any(|d| d.id == id && d.is_indexed())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns false if the document no longer exists.
    pub(crate) fn mark_indexed(&self, id: &str, page_count: usize) -> bool {
        self.update(id, |d| {
            d.status = DocumentStatus::Indexed;
            d.page_count = Some(page_count);
            d.last_error = None;
        })
    }

    pub(crate) fn mark_failed(&self, id: &str, message: &str) -> bool {
        self.update(id, |d| {
            d.status = DocumentStatus::Failed;
            d.last_error = Some(message.to_string());
        })
    }

    pub(crate) fn mark_unindexed(&self, id: &str) -> bool {
        self.update(id, |d| {
            d.status = DocumentStatus::Unindexed;
        })
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut Document)) -> bool {
        match self.write().iter_mut().find(|d| d.id == id) {
            Some(doc) => {
                f(doc);
                true
            }
            None => false,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Document>> {
        self.docs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Document>> {
        self.docs.write().unwrap_or_else(PoisonError::into_inner)
    }
}
