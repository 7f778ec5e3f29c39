#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use async_trait::async_trait;
use pagelens::config::Config;
use pagelens::gateway::ModelGateway;
use pagelens::session::Session;
use pagelens_core::engine::memory::{InMemoryBlobStore, InMemoryRetrieval};
use pagelens_core::engine::{BlobStore, GenerationModel, Rasterizer};
use pagelens_core::models::{GeneratedSequence, GenerationRequest, PageImage};

// ============ Stub collaborators ============

/// Renders an in-memory "PDF" whose bytes are page texts separated by form
/// feeds. Bytes starting with `BROKEN` fail to render.
pub struct TextRasterizer {
    blobs: Arc<InMemoryBlobStore>,
    overrides: Mutex<HashMap<PathBuf, String>>,
    renders: AtomicUsize,
}

impl TextRasterizer {
    pub fn new(blobs: Arc<InMemoryBlobStore>) -> Self {
        Self {
            blobs,
            overrides: Mutex::new(HashMap::new()),
            renders: AtomicUsize::new(0),
        }
    }

    /// Make the document at `location` render as `text` from now on.
    pub fn replace(&self, location: &Path, text: &str) {
        self.overrides
            .lock()
            .unwrap()
            .insert(location.to_path_buf(), text.to_string());
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Rasterizer for TextRasterizer {
    async fn render(&self, path: &Path) -> anyhow::Result<Vec<PageImage>> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        let replaced = self.overrides.lock().unwrap().get(path).cloned();
        let text = match replaced {
            Some(text) => text,
            None => String::from_utf8(self.blobs.get(path).await?)?,
        };
        if text.starts_with("BROKEN") {
            bail!("not a valid PDF");
        }
        Ok(text
            .split('\x0c')
            .map(|page| PageImage::png(page.as_bytes().to_vec()).with_text(page))
            .collect())
    }
}

/// Returns the prompt followed by an answer naming the page text, the way
/// decoder-only VLMs return the whole sequence.
pub struct EchoGeneration;

#[async_trait]
impl GenerationModel for EchoGeneration {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GeneratedSequence> {
        let mut tokens: Vec<String> = request
            .prompt
            .split_inclusive(' ')
            .map(String::from)
            .collect();
        let prompt_len = tokens.len();
        let page = request.image.text.clone().unwrap_or_default();
        tokens.push(" Found on page: ".to_string());
        tokens.push(page);
        Ok(GeneratedSequence {
            tokens,
            prompt_len,
            echoes_prompt: false,
        })
    }
}

pub struct Harness {
    pub session: Session,
    pub rasterizer: Arc<TextRasterizer>,
    pub retrieval: Arc<InMemoryRetrieval>,
}

pub fn harness_with(config: Config) -> Harness {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let rasterizer = Arc::new(TextRasterizer::new(blobs.clone()));
    let retrieval = Arc::new(InMemoryRetrieval::new());
    let gateway = Arc::new(ModelGateway::with_engines(
        retrieval.clone(),
        Arc::new(EchoGeneration),
    ));
    let session = Session::new(&config, gateway, rasterizer.clone(), blobs);
    Harness {
        session,
        rasterizer,
        retrieval,
    }
}

pub fn harness() -> Harness {
    harness_with(Config::default())
}

/// Bytes of a stub document with one page per entry.
pub fn pdf(pages: &[&str]) -> Vec<u8> {
    pages.join("\x0c").into_bytes()
}
