//! Rendered-page cache.
//!
//! Resolving a result's page normally re-renders the whole document. With
//! `[resolve] cache_pages = true` the pages rendered at index time are kept
//! per document and reused. Entries are keyed by document id and content
//! hash, replaced on re-index, and dropped on retirement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use pagelens_core::models::PageImage;

struct CachedPages {
    content_hash: String,
    pages: Arc<Vec<PageImage>>,
}

pub struct PageCache {
    enabled: bool,
    entries: Mutex<HashMap<String, CachedPages>>,
}

impl PageCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self, document_id: &str, content_hash: &str) -> Option<Arc<Vec<PageImage>>> {
        if !self.enabled {
            return None;
        }
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(document_id)
            .filter(|c| c.content_hash == content_hash)
            .map(|c| c.pages.clone())
    }

    /// Store `pages` for the document. No-op when the cache is disabled.
    pub fn insert(&self, document_id: &str, content_hash: &str, pages: Arc<Vec<PageImage>>) {
        if !self.enabled {
            return;
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                document_id.to_string(),
                CachedPages {
                    content_hash: content_hash.to_string(),
                    pages,
                },
            );
    }

    pub fn invalidate(&self, document_id: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(document_id);
    }
}
