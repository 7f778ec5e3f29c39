//! Cross-document ranking.
//!
//! A fan-out search produces one ranked hit list per document. This module
//! turns those lists into [`QueryResult`]s and merges them into a single
//! ranking. The caller gathers the per-document lists; this module only
//! defines how they are combined.
//!
//! # Merge Algorithm
//!
//! 1. Convert each document's hits into results (missing scores become
//!    [`MISSING_SCORE`](crate::models::MISSING_SCORE), missing content an
//!    empty snippet).
//! 2. Concatenate the lists in candidate-document order.
//! 3. Stable-sort by score, descending.
//!
//! Equal scores therefore keep document order first and each document's
//! own rank second, so the same inputs always give the same output no
//! matter how the per-document searches were scheduled.

use crate::models::{Document, PageHit, QueryResult};

/// Convert one document's hits into query results, preserving hit order.
pub fn hits_to_results(document: &Document, hits: Vec<PageHit>) -> Vec<QueryResult> {
    hits.into_iter()
        .map(|hit| QueryResult {
            document_id: document.id.clone(),
            document_name: document.original_name.clone(),
            page_number: hit.page_number,
            score: hit.score_or_default(),
            snippet: hit.content.unwrap_or_default(),
        })
        .collect()
}

/// Merge per-document result lists into one ranking, best first.
///
/// `per_document` must be in candidate-document order; that order is the
/// tie-break between documents.
pub fn merge_ranked(per_document: Vec<Vec<QueryResult>>) -> Vec<QueryResult> {
    let mut pool: Vec<QueryResult> = per_document.into_iter().flatten().collect();
    // `sort_by` is stable.
    pool.sort_by(|a, b| b.score.total_cmp(&a.score));
    pool
}
