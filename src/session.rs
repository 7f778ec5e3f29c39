//! Session orchestrator: one entry point per user action.
//!
//! | Action | Steps |
//! |--------|-------|
//! | [`upload`](Session::upload) | store bytes → build index |
//! | [`reindex`](Session::reindex) | rebuild index |
//! | [`delete`](Session::delete) | retire index → remove document |
//! | [`query`](Session::query) | fan-out search → resolve top page → synthesize |
//! | [`page`](Session::page) | resolve one page image for display |
//!
//! A `Session` owns the shared document store, so every presentation
//! adapter (CLI, HTTP) sees the same corpus. It is `Send + Sync` and meant
//! to be shared behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pagelens_core::engine::{BlobStore, Rasterizer};
use pagelens_core::models::{Document, PageImage, QueryResult, SearchFailure};
use pagelens_core::{Error, Result};
use tracing::{info, instrument, warn};

use crate::blob::FsBlobStore;
use crate::cache::PageCache;
use crate::config::Config;
use crate::documents::DocumentStore;
use crate::gateway::ModelGateway;
use crate::index::IndexManager;
use crate::render::PopplerRasterizer;
use crate::search::RetrievalEngine;
use crate::synthesize::AnswerSynthesizer;

/// Result of an upload: the stored document plus the outcome of indexing.
///
/// The document exists even when indexing failed; it is then `failed` and
/// excluded from search until re-indexed.
#[derive(Debug)]
pub struct UploadOutcome {
    pub document: Document,
    pub indexed: Result<()>,
}

/// The answer to a query together with the ranking it was grounded on.
#[derive(Debug)]
pub struct QueryOutcome {
    /// Merged ranking, truncated to the display limit.
    pub results: Vec<QueryResult>,
    /// Documents whose search failed; their results are missing.
    pub failures: Vec<SearchFailure>,
    /// Image of the top-ranked page, when it could be resolved.
    pub top_page: Option<PageImage>,
    /// `None` when nothing matched.
    pub answer: Option<Result<String>>,
}

pub struct Session {
    store: Arc<DocumentStore>,
    indexes: Arc<IndexManager>,
    retrieval: RetrievalEngine,
    synthesizer: AnswerSynthesizer,
    gateway: Arc<ModelGateway>,
    top_k: usize,
    display_limit: usize,
}

impl Session {
    /// Wire a session from explicit collaborators.
    pub fn new(
        config: &Config,
        gateway: Arc<ModelGateway>,
        rasterizer: Arc<dyn Rasterizer>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let store = Arc::new(DocumentStore::new(blobs));
        let cache = Arc::new(PageCache::new(config.resolve.cache_pages));
        let indexes = Arc::new(IndexManager::new(
            store.clone(),
            gateway.clone(),
            rasterizer.clone(),
            cache.clone(),
            config.index.retain_content,
        ));
        let retrieval = RetrievalEngine::new(
            store.clone(),
            indexes.clone(),
            gateway.clone(),
            config.retrieval.parallel,
        );
        let synthesizer = AnswerSynthesizer::new(
            gateway.clone(),
            rasterizer,
            cache,
            config.generation.max_new_tokens,
            Duration::from_secs(config.generation.timeout_secs),
        );

        Self {
            store,
            indexes,
            retrieval,
            synthesizer,
            gateway,
            top_k: config.retrieval.top_k,
            display_limit: config.retrieval.display_limit,
        }
    }

    /// Wire a session with the configured Poppler rasterizer, on-disk blob
    /// storage, and config-driven model gateway.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.storage.dir).with_context(|| {
            format!(
                "Failed to create storage dir {}",
                config.storage.dir.display()
            )
        })?;
        Ok(Self::new(
            config,
            Arc::new(ModelGateway::from_config(config)),
            Arc::new(PopplerRasterizer::from_config(&config.rasterizer)),
            Arc::new(FsBlobStore::new(&config.storage.dir)),
        ))
    }

    pub fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    pub fn list(&self) -> Vec<Document> {
        self.store.list()
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.store.get(id)
    }

    /// Store an uploaded document and index it.
    ///
    /// Storage failures are returned as `Err`; indexing failures are
    /// reported in [`UploadOutcome::indexed`].
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn upload(&self, bytes: &[u8], name: &str) -> Result<UploadOutcome> {
        let document = self.store.add(bytes, name).await?;
        match self.indexes.index(&document.id).await {
            Ok(document) => Ok(UploadOutcome {
                document,
                indexed: Ok(()),
            }),
            Err(e) => {
                let document = self.store.get(&document.id).unwrap_or(document);
                Ok(UploadOutcome {
                    document,
                    indexed: Err(e),
                })
            }
        }
    }

    /// Rebuild the index of an existing document.
    pub async fn reindex(&self, id: &str) -> Result<Document> {
        self.indexes.index(id).await
    }

    /// Retire the document's index, then remove the document.
    ///
    /// The index goes first so there is never a moment where the store has
    /// forgotten a document that search can still return. Both steps run
    /// under the document's write lock, so a concurrent re-index cannot
    /// rebuild the index in between.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<Document> {
        self.indexes.delete(id).await
    }

    /// Search all indexed documents and answer from the top-ranked page.
    ///
    /// `top_k` overrides the configured per-document hit count.
    #[instrument(skip(self))]
    pub async fn query(&self, query: &str, top_k: Option<usize>) -> Result<QueryOutcome> {
        let outcome = self
            .retrieval
            .search(query, top_k.unwrap_or(self.top_k))
            .await?;
        if outcome.is_partial() {
            warn!(
                failed = outcome.failures.len(),
                "search returned partial results"
            );
        }

        let mut results = outcome.results;
        let (top_page, answer) = match results.first() {
            None => {
                info!("no results");
                (None, None)
            }
            Some(top) => match self.page(&top.document_id, top.page_number).await {
                Ok(page) => {
                    let answer = self.synthesizer.synthesize(query, &page).await;
                    (Some(page), Some(answer))
                }
                Err(e) => (None, Some(Err(e))),
            },
        };

        results.truncate(self.display_limit);
        Ok(QueryOutcome {
            results,
            failures: outcome.failures,
            top_page,
            answer,
        })
    }

    /// The image of one page of a stored document.
    pub async fn page(&self, id: &str, page_number: u32) -> Result<PageImage> {
        let document = self
            .store
            .get(id)
            .ok_or_else(|| Error::UnknownDocument(id.to_string()))?;
        self.synthesizer.resolve_page(&document, page_number).await
    }
}
