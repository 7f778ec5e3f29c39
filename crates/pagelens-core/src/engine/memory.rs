//! In-memory engines for testing and offline use.
//!
//! [`InMemoryRetrieval`] scores pages by keyword overlap with their text
//! layer; pages without text never match. [`InMemoryBlobStore`] keeps
//! blobs in a `HashMap` under synthetic `mem://` locations.
//!
//! Both use `std::sync::RwLock` for thread safety and never hold a lock
//! across an await point.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{PageHit, PageImage};

use super::{BlobStore, RetrievalModel};

/// Maximum number of characters kept as retained page content.
const CONTENT_CHARS: usize = 240;

struct StoredPage {
    page_number: u32,
    text_lower: String,
    content: Option<String>,
}

/// Keyword-matching retrieval model.
///
/// The score of a page is the number of distinct query terms found in its
/// text. Ties keep page order.
pub struct InMemoryRetrieval {
    indexes: RwLock<HashMap<String, Vec<StoredPage>>>,
}

impl InMemoryRetrieval {
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
        }
    }

    pub fn has_index(&self, key: &str) -> bool {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Keys of all live indexes, sorted.
    pub fn index_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryRetrieval {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RetrievalModel for InMemoryRetrieval {
    fn model_name(&self) -> &str {
        "memory"
    }

    async fn build_index(
        &self,
        key: &str,
        pages: &[PageImage],
        retain_content: bool,
    ) -> Result<()> {
        let stored: Vec<StoredPage> = pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                let text = page.text.as_deref().unwrap_or_default();
                StoredPage {
                    page_number: i as u32 + 1,
                    text_lower: text.to_lowercase(),
                    content: (retain_content && !text.is_empty())
                        .then(|| text.chars().take(CONTENT_CHARS).collect()),
                }
            })
            .collect();

        // Built off-lock, swapped in whole.
        self.indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), stored);
        Ok(())
    }

    async fn query(&self, key: &str, text: &str, top_k: usize) -> Result<Vec<PageHit>> {
        let query_lower = text.to_lowercase();
        let mut terms: Vec<&str> = query_lower.split_whitespace().collect();
        terms.sort_unstable();
        terms.dedup();

        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        let pages = indexes
            .get(key)
            .ok_or_else(|| anyhow!("no index named '{}'", key))?;

        let mut hits: Vec<PageHit> = pages
            .iter()
            .filter_map(|page| {
                let matches = terms
                    .iter()
                    .filter(|t| page.text_lower.contains(**t))
                    .count();
                (matches > 0).then(|| PageHit {
                    page_number: page.page_number,
                    score: Some(matches as f64),
                    content: page.content.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score_or_default().total_cmp(&a.score_or_default()));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn drop_index(&self, key: &str) -> Result<()> {
        self.indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Blob store backed by a `HashMap`.
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<PathBuf, Vec<u8>>>,
    next_id: AtomicU64,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, location: &Path) -> bool {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(location)
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let location = PathBuf::from(format!("mem://{}/{}", id, name));
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        if blobs.contains_key(&location) {
            bail!("blob already exists at {}", location.display());
        }
        blobs.insert(location.clone(), bytes.to_vec());
        Ok(location)
    }

    async fn get(&self, location: &Path) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
            .cloned()
            .ok_or_else(|| anyhow!("no blob at {}", location.display()))
    }

    async fn delete(&self, location: &Path) -> Result<()> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(location)
            .map(|_| ())
            .ok_or_else(|| anyhow!("no blob at {}", location.display()))
    }
}
