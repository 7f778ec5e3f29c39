//! Answer synthesis grounded in one retrieved page.
//!
//! Resolving a [`QueryResult`](pagelens_core::models::QueryResult) to an
//! image re-renders the source document (or reads the page cache) and picks
//! the page by its 1-based number. A page number the document no longer
//! has is a [`Error::StaleReference`], kept distinct from generation
//! failures so the caller can suggest re-indexing instead of retrying.
//!
//! Generation sends exactly one image and the query text, caps output at
//! `max_new_tokens`, and bounds the whole call by `timeout`. Only the newly
//! generated continuation is returned. Failures are not retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use pagelens_core::answer::continuation;
use pagelens_core::engine::Rasterizer;
use pagelens_core::models::{Document, GenerationRequest, PageImage};
use pagelens_core::{Error, Result};
use tracing::{debug, info};

use crate::cache::PageCache;
use crate::gateway::ModelGateway;

pub struct AnswerSynthesizer {
    gateway: Arc<ModelGateway>,
    rasterizer: Arc<dyn Rasterizer>,
    cache: Arc<PageCache>,
    max_new_tokens: usize,
    timeout: Duration,
}

/// Page `page_number` (1-based) of `pages`, if it exists.
pub fn page_at(pages: &[PageImage], page_number: u32) -> Option<&PageImage> {
    (page_number as usize)
        .checked_sub(1)
        .and_then(|i| pages.get(i))
}

impl AnswerSynthesizer {
    pub fn new(
        gateway: Arc<ModelGateway>,
        rasterizer: Arc<dyn Rasterizer>,
        cache: Arc<PageCache>,
        max_new_tokens: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            rasterizer,
            cache,
            max_new_tokens,
            timeout,
        }
    }

    /// The image of page `page_number` of `document`.
    pub async fn resolve_page(&self, document: &Document, page_number: u32) -> Result<PageImage> {
        let pages = match self.cache.get(&document.id, &document.content_hash) {
            Some(pages) => pages,
            None => {
                let rendered = self
                    .rasterizer
                    .render(&document.location)
                    .await
                    .map_err(|reason| Error::Render {
                        document_id: document.id.clone(),
                        reason,
                    })?;
                let rendered = Arc::new(rendered);
                self.cache
                    .insert(&document.id, &document.content_hash, rendered.clone());
                rendered
            }
        };

        page_at(&pages, page_number)
            .cloned()
            .ok_or_else(|| Error::StaleReference {
                document_id: document.id.clone(),
                page_number,
                page_count: pages.len(),
            })
    }

    /// Answer `query` from `page`, returning only the generated text.
    pub async fn synthesize(&self, query: &str, page: &PageImage) -> Result<String> {
        let engine = self.gateway.generation_engine().await?;
        let request = GenerationRequest {
            image: page.clone(),
            prompt: query.to_string(),
            max_new_tokens: self.max_new_tokens,
        };

        let started = Instant::now();
        let sequence = tokio::time::timeout(self.timeout, engine.generate(&request))
            .await
            .map_err(|_| {
                Error::Synthesis(anyhow!(
                    "generation timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .with_context(|| format!("{} generation failed", engine.model_name()))
            .map_err(Error::Synthesis)?;

        debug!(
            tokens = sequence.tokens.len(),
            prompt_len = sequence.prompt_len,
            "generation returned"
        );
        let answer = continuation(&sequence, &request.prompt);
        info!(
            model = engine.model_name(),
            chars = answer.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "answer synthesized"
        );
        Ok(answer)
    }
}
