//! Fan-out search across every indexed document.
//!
//! The candidate set is read from the document store on every call, so
//! documents added, re-indexed, or deleted between queries are always
//! reflected. Each candidate is queried independently (concurrently when
//! `[retrieval] parallel = true`), and the per-document lists are merged
//! by `pagelens_core::search::merge_ranked` in candidate order, so the
//! outcome does not depend on which query finished first.
//!
//! A failing per-document query does not fail the search: that document's
//! results are left out and the failure is reported alongside the results
//! that did succeed.

use std::sync::Arc;

use pagelens_core::engine::RetrievalModel;
use pagelens_core::models::{Document, PageHit, SearchFailure, SearchOutcome};
use pagelens_core::search::{hits_to_results, merge_ranked};
use pagelens_core::Result;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::documents::DocumentStore;
use crate::gateway::ModelGateway;
use crate::index::IndexManager;

pub struct RetrievalEngine {
    store: Arc<DocumentStore>,
    indexes: Arc<IndexManager>,
    gateway: Arc<ModelGateway>,
    parallel: bool,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<DocumentStore>,
        indexes: Arc<IndexManager>,
        gateway: Arc<ModelGateway>,
        parallel: bool,
    ) -> Self {
        Self {
            store,
            indexes,
            gateway,
            parallel,
        }
    }

    /// Search every `indexed` document for `query`, `top_k` hits each.
    ///
    /// Returns the full merged ranking; callers truncate for display. An
    /// empty store, a blank query, or `top_k == 0` give an empty outcome.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<SearchOutcome> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(SearchOutcome::default());
        }

        let candidates = self.store.indexed();
        if candidates.is_empty() {
            debug!("no indexed documents; skipping search");
            return Ok(SearchOutcome::default());
        }

        let engine = self.gateway.retrieval_engine().await?;
        let per_document = if self.parallel {
            self.fan_out_parallel(&engine, &candidates, query, top_k).await
        } else {
            self.fan_out_sequential(&engine, &candidates, query, top_k).await
        };

        let mut lists = Vec::with_capacity(candidates.len());
        let mut failures = Vec::new();
        for (document, outcome) in candidates.iter().zip(per_document) {
            // Retired or re-indexed with failure while the fan-out ran.
            if !self.store.is_indexed(&document.id) {
                debug!(document_id = %document.id, "document left the index during search");
                continue;
            }
            match outcome {
                Ok(hits) => lists.push(hits_to_results(document, hits)),
                Err(e) => {
                    let message = format!("{:#}", e);
                    warn!(document_id = %document.id, error = %message, "document search failed");
                    failures.push(SearchFailure {
                        document_id: document.id.clone(),
                        message,
                    });
                }
            }
        }

        let results = merge_ranked(lists);
        debug!(
            documents = candidates.len(),
            results = results.len(),
            failures = failures.len(),
            "search complete"
        );
        Ok(SearchOutcome { results, failures })
    }

    async fn fan_out_sequential(
        &self,
        engine: &Arc<dyn RetrievalModel>,
        candidates: &[Document],
        query: &str,
        top_k: usize,
    ) -> Vec<anyhow::Result<Vec<PageHit>>> {
        let mut outcomes = Vec::with_capacity(candidates.len());
        for document in candidates {
            let lock = self.indexes.document_lock(&document.id);
            let outcome = query_document(
                engine.clone(),
                lock,
                document.id.clone(),
                query.to_string(),
                top_k,
            )
            .await;
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn fan_out_parallel(
        &self,
        engine: &Arc<dyn RetrievalModel>,
        candidates: &[Document],
        query: &str,
        top_k: usize,
    ) -> Vec<anyhow::Result<Vec<PageHit>>> {
        let mut tasks = JoinSet::new();
        for (slot, document) in candidates.iter().enumerate() {
            let engine = engine.clone();
            let lock = self.indexes.document_lock(&document.id);
            let id = document.id.clone();
            let query = query.to_string();
            tasks.spawn(async move { (slot, query_document(engine, lock, id, query, top_k).await) });
        }

        let mut slots: Vec<Option<anyhow::Result<Vec<PageHit>>>> =
            (0..candidates.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, outcome)) => slots[slot] = Some(outcome),
                Err(e) => warn!(error = %e, "search task aborted"),
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(anyhow::anyhow!("search task aborted"))))
            .collect()
    }
}

async fn query_document(
    engine: Arc<dyn RetrievalModel>,
    lock: Arc<RwLock<()>>,
    document_id: String,
    query: String,
    top_k: usize,
) -> anyhow::Result<Vec<PageHit>> {
    let _guard = lock.read().await;
    engine.query(&document_id, &query, top_k).await
}
