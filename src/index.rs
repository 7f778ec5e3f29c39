//! Index manager: one retrieval index per document.
//!
//! Indexing renders a document's pages and hands them to the retrieval
//! engine under the document's id. Re-indexing replaces the previous index
//! in full. Retirement drops it.
//!
//! # Consistency
//!
//! - A document only becomes `indexed` after its index was built; a failed
//!   build marks it `failed`, which keeps it out of every search.
//! - Each document has an async read/write lock. Index builds and
//!   retirement hold it exclusively; searches hold it shared, so a search
//!   never observes a half-replaced index. Different documents index
//!   independently.
//! - Deletion holds the lock across retirement and record removal, so an
//!   index build queued behind it finds the document gone. A build that
//!   still finishes after its document vanished drops the new index.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::{bail, Context};
use pagelens_core::engine::{Rasterizer, RetrievalModel};
use pagelens_core::models::{Document, PageImage};
use pagelens_core::{Error, Result};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::PageCache;
use crate::documents::DocumentStore;
use crate::gateway::ModelGateway;

pub struct IndexManager {
    store: Arc<DocumentStore>,
    gateway: Arc<ModelGateway>,
    rasterizer: Arc<dyn Rasterizer>,
    cache: Arc<PageCache>,
    retain_content: bool,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl IndexManager {
    pub fn new(
        store: Arc<DocumentStore>,
        gateway: Arc<ModelGateway>,
        rasterizer: Arc<dyn Rasterizer>,
        cache: Arc<PageCache>,
        retain_content: bool,
    ) -> Self {
        Self {
            store,
            gateway,
            rasterizer,
            cache,
            retain_content,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The per-document lock shared by indexing, retirement and search.
    ///
    /// Ids the store does not know get a private lock that is never
    /// registered, so callers racing a delete cannot leak map entries.
    pub(crate) fn document_lock(&self, id: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(id) {
            return lock.clone();
        }
        if self.store.get(id).is_none() {
            return Arc::default();
        }
        locks.entry(id.to_string()).or_default().clone()
    }

    /// Drop the lock entry of a deleted document.
    fn forget(&self, id: &str) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Build (or rebuild) the index for document `id`.
    ///
    /// Returns the updated document on success. On failure the document is
    /// left `failed` and the error is returned as [`Error::Index`], or as
    /// [`Error::ModelLoad`] if the retrieval engine could not be loaded.
    pub async fn index(&self, id: &str) -> Result<Document> {
        let lock = self.document_lock(id);
        let _guard = lock.write().await;

        let document = self
            .store
            .get(id)
            .ok_or_else(|| Error::UnknownDocument(id.to_string()))?;

        let engine = match self.gateway.retrieval_engine().await {
            Ok(engine) => engine,
            Err(e) => {
                self.store.mark_failed(id, &e.to_string());
                return Err(e);
            }
        };

        let started = Instant::now();
        match self.build(engine.as_ref(), &document).await {
            Ok(pages) => {
                let page_count = pages.len();
                if !self.store.mark_indexed(id, page_count) {
                    warn!(document_id = %id, "document deleted during indexing; dropping new index");
                    if let Err(e) = engine.drop_index(id).await {
                        warn!(document_id = %id, error = %format!("{:#}", e), "failed to drop orphaned index");
                    }
                    return Err(Error::UnknownDocument(id.to_string()));
                }
                self.cache
                    .insert(id, &document.content_hash, Arc::new(pages));
                info!(
                    document_id = %id,
                    pages = page_count,
                    retain_content = self.retain_content,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "document indexed"
                );
                self.store
                    .get(id)
                    .ok_or_else(|| Error::UnknownDocument(id.to_string()))
            }
            Err(reason) => {
                self.cache.invalidate(id);
                let message = format!("{:#}", reason);
                self.store.mark_failed(id, &message);
                warn!(document_id = %id, error = %message, "indexing failed");
                Err(Error::Index {
                    document_id: id.to_string(),
                    reason,
                })
            }
        }
    }

    async fn build(
        &self,
        engine: &dyn RetrievalModel,
        document: &Document,
    ) -> anyhow::Result<Vec<PageImage>> {
        let pages = self
            .rasterizer
            .render(&document.location)
            .await
            .context("rendering pages")?;
        if pages.is_empty() {
            bail!("document has no pages");
        }
        debug!(document_id = %document.id, pages = pages.len(), "pages rendered");

        engine
            .build_index(&document.id, &pages, self.retain_content)
            .await
            .context("building page index")?;
        Ok(pages)
    }

    /// Retire the index and remove the document under one write lock.
    ///
    /// No index build can interleave between the two steps. If removal
    /// fails the document stays in the store, `unindexed`.
    pub async fn delete(&self, id: &str) -> Result<Document> {
        let lock = self.document_lock(id);
        let _guard = lock.write().await;

        if self.store.get(id).is_none() {
            return Err(Error::UnknownDocument(id.to_string()));
        }
        self.retire(id).await;
        let removed = self.store.remove(id).await?;
        self.forget(id);
        Ok(removed)
    }

    /// Remove the index for document `id`. Callers hold its write lock.
    ///
    /// The document becomes `unindexed` and is excluded from search even if
    /// the engine fails to drop the index.
    async fn retire(&self, id: &str) {
        self.store.mark_unindexed(id);
        self.cache.invalidate(id);

        // No engine loaded means nothing was ever indexed in this process.
        let Some(engine) = self.gateway.loaded_retrieval() else {
            debug!(document_id = %id, "retrieval engine not loaded; nothing to retire");
            return;
        };
        match engine.drop_index(id).await {
            Ok(()) => debug!(document_id = %id, "index retired"),
            Err(e) => warn!(
                document_id = %id,
                error = %format!("{:#}", e),
                "failed to drop index; document stays excluded from search"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pagelens_core::engine::memory::{InMemoryBlobStore, InMemoryRetrieval};
    use std::path::Path;

    use crate::generation::DisabledGenerationModel;

    struct OnePage;

    #[async_trait]
    impl Rasterizer for OnePage {
        async fn render(&self, _path: &Path) -> anyhow::Result<Vec<PageImage>> {
            Ok(vec![PageImage::png(b"png".to_vec()).with_text("annual report")])
        }
    }

    fn setup() -> (IndexManager, Arc<DocumentStore>, Arc<InMemoryRetrieval>) {
        let store = Arc::new(DocumentStore::new(Arc::new(InMemoryBlobStore::new())));
        let retrieval = Arc::new(InMemoryRetrieval::new());
        let gateway = Arc::new(ModelGateway::with_engines(
            retrieval.clone(),
            Arc::new(DisabledGenerationModel),
        ));
        let manager = IndexManager::new(
            store.clone(),
            gateway,
            Arc::new(OnePage),
            Arc::new(PageCache::disabled()),
            true,
        );
        (manager, store, retrieval)
    }

    fn tracked_locks(manager: &IndexManager) -> usize {
        manager.locks.lock().unwrap().len()
    }

    #[tokio::test]
    async fn delete_retires_index_and_releases_lock() {
        let (manager, store, retrieval) = setup();
        let doc = store.add(b"%PDF", "report.pdf").await.unwrap();

        manager.index(&doc.id).await.unwrap();
        assert!(retrieval.has_index(&doc.id));
        assert_eq!(tracked_locks(&manager), 1);

        let removed = manager.delete(&doc.id).await.unwrap();
        assert_eq!(removed.id, doc.id);
        assert!(store.get(&doc.id).is_none());
        assert!(!retrieval.has_index(&doc.id));
        assert_eq!(tracked_locks(&manager), 0);

        let err = manager.delete(&doc.id).await.unwrap_err();
        assert!(matches!(err, Error::UnknownDocument(_)));
    }

    #[tokio::test]
    async fn unknown_ids_do_not_register_locks() {
        let (manager, store, _) = setup();
        let doc = store.add(b"%PDF", "report.pdf").await.unwrap();
        manager.index(&doc.id).await.unwrap();
        manager.delete(&doc.id).await.unwrap();

        for _ in 0..3 {
            let err = manager.index(&doc.id).await.unwrap_err();
            assert!(matches!(err, Error::UnknownDocument(_)));
            drop(manager.document_lock("never-uploaded").read().await);
        }
        assert_eq!(tracked_locks(&manager), 0);
    }
}
