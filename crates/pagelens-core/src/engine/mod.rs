//! Collaborator traits consumed by the pipeline.
//!
//! The pipeline never rasterizes, embeds, generates, or touches disk
//! itself. It talks to four collaborators through the traits below, which
//! lets the application plug in Poppler, HTTP model services, and a
//! directory-backed blob store, and lets tests plug in stubs.
//!
//! All traits are async (via `async-trait`) and must be `Send + Sync` so
//! one instance can be shared across concurrent sessions.
//!
//! | Trait | Contract |
//! |-------|----------|
//! | [`Rasterizer`] | path → ordered page images |
//! | [`RetrievalModel`] | build / query / drop a per-key page index |
//! | [`GenerationModel`] | one image + prompt → raw output sequence |
//! | [`BlobStore`] | put / get / delete opaque bytes |

pub mod memory;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{GeneratedSequence, GenerationRequest, PageHit, PageImage};

/// Renders a stored document into page images.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render every page of the document at `path`, in page order.
    ///
    /// Page `n` (1-based) is element `n - 1` of the returned vector.
    /// Must fail, rather than return a truncated list, when the file is
    /// unreadable or not a valid document.
    async fn render(&self, path: &Path) -> Result<Vec<PageImage>>;
}

/// A multimodal retrieval model holding one index per key.
#[async_trait]
pub trait RetrievalModel: Send + Sync {
    /// Returns the model identifier (e.g. `"vidore/colpali"`).
    fn model_name(&self) -> &str;

    /// Build the index for `key` from `pages`, replacing any existing index
    /// for that key in full.
    ///
    /// When `retain_content` is false the index does not keep page content
    /// and later hits carry no `content`.
    async fn build_index(&self, key: &str, pages: &[PageImage], retain_content: bool)
        -> Result<()>;

    /// Return up to `top_k` hits from the index for `key`, best first.
    async fn query(&self, key: &str, text: &str, top_k: usize) -> Result<Vec<PageHit>>;

    /// Remove the index for `key`. Removing a missing index succeeds.
    async fn drop_index(&self, key: &str) -> Result<()>;
}

/// A vision-language model that answers a prompt about one image.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    /// Returns the model identifier (e.g. `"Qwen/Qwen2-VL-7B-Instruct"`).
    fn model_name(&self) -> &str;

    /// Run one generation. The returned sequence may start with an echo of
    /// the prompt; callers strip it with [`crate::answer::continuation`].
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedSequence>;
}

/// Opaque byte storage addressed by location.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at a fresh location derived from `name`.
    ///
    /// Never overwrites existing data: every call yields a new location.
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<PathBuf>;

    async fn get(&self, location: &Path) -> Result<Vec<u8>>;

    async fn delete(&self, location: &Path) -> Result<()>;
}
