//! Core data models used throughout PageLens.
//!
//! These types represent the uploaded documents, the rendered pages that
//! flow into the retrieval index, and the ranked results and generation
//! payloads that flow out of a query.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score assigned to a retrieval hit that carries no usable score.
///
/// Missing and `NaN` scores rank below every real score instead of
/// failing the query.
pub const MISSING_SCORE: f64 = f64::MIN;

/// Indexing state of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Uploaded (or retired) and not currently searchable.
    Unindexed,
    /// Index built successfully; part of every search fan-out.
    Indexed,
    /// Last index build failed; excluded from search until re-indexed.
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Unindexed => "unindexed",
            DocumentStatus::Indexed => "indexed",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded document tracked by the document store.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Stable identifier, also used as the retrieval index key.
    pub id: String,
    /// File name as supplied by the uploader.
    pub original_name: String,
    /// Where the blob store put the bytes.
    #[serde(skip)]
    pub location: PathBuf,
    pub status: DocumentStatus,
    /// Number of rendered pages, known once the document is indexed.
    pub page_count: Option<usize>,
    /// Hex SHA-256 of the uploaded bytes.
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
    /// Message of the most recent indexing failure.
    pub last_error: Option<String>,
}

impl Document {
    pub fn is_indexed(&self) -> bool {
        self.status == DocumentStatus::Indexed
    }
}

/// A single rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    /// Encoded image bytes (PNG for the Poppler rasterizer).
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`, e.g. `"image/png"`.
    pub media_type: String,
    /// Text layer extracted from the page, when the rasterizer provides one.
    pub text: Option<String>,
}

impl PageImage {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            media_type: "image/png".to_string(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// One ranked page as reported by a retrieval model.
///
/// Only the page number is mandatory. Services that omit the score or the
/// stored page content are tolerated; see [`PageHit::score_or_default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageHit {
    /// 1-based page number within the indexed document.
    #[serde(alias = "page_num")]
    pub page_number: u32,
    #[serde(default)]
    pub score: Option<f64>,
    /// Page content retained inside the index, if the index keeps it.
    #[serde(default)]
    pub content: Option<String>,
}

impl PageHit {
    pub fn new(page_number: u32, score: f64) -> Self {
        Self {
            page_number,
            score: Some(score),
            content: None,
        }
    }

    /// The hit's score, or [`MISSING_SCORE`] when absent or `NaN`.
    pub fn score_or_default(&self) -> f64 {
        match self.score {
            Some(s) if !s.is_nan() => s,
            _ => MISSING_SCORE,
        }
    }
}

/// A page-level search result scoped to one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub document_id: String,
    /// Original file name of the document, for display.
    pub document_name: String,
    /// 1-based page number.
    pub page_number: u32,
    /// Relevance score, higher is more relevant.
    pub score: f64,
    /// Retained page content; empty when the index does not keep content.
    pub snippet: String,
}

/// A per-document search that failed during fan-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchFailure {
    pub document_id: String,
    pub message: String,
}

/// Merged output of one fan-out search.
///
/// `failures` lists the documents whose search failed; their results are
/// absent from `results` but every other document's results are present.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<QueryResult>,
    pub failures: Vec<SearchFailure>,
}

impl SearchOutcome {
    /// True when at least one document could not be searched.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Input to a generation model: exactly one image plus the prompt text.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image: PageImage,
    pub prompt: String,
    /// Upper bound on newly generated tokens.
    pub max_new_tokens: usize,
}

/// Raw output of a generation model.
///
/// `tokens` holds the decoded pieces of the full output sequence. Models
/// that echo their input report how many leading pieces belong to the
/// prompt in `prompt_len`; models that only return the completion report 0.
/// Endpoints that repeat the question as text but cannot say how many pieces
/// it spans set `echoes_prompt` instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedSequence {
    pub tokens: Vec<String>,
    pub prompt_len: usize,
    pub echoes_prompt: bool,
}

impl GeneratedSequence {
    pub fn completion(text: impl Into<String>) -> Self {
        Self {
            tokens: vec![text.into()],
            ..Self::default()
        }
    }

    /// Output of an endpoint that echoes the prompt text before answering.
    pub fn echoed(text: impl Into<String>) -> Self {
        Self {
            tokens: vec![text.into()],
            prompt_len: 0,
            echoes_prompt: true,
        }
    }
}
