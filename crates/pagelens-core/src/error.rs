//! Typed errors for the retrieval-and-synthesis pipeline.
//!
//! Collaborators (rasterizer, model services, blob storage) report failures
//! as [`anyhow::Error`]. The pipeline wraps them into an [`Error`] variant
//! that tells the caller what went wrong and what to do about it: a
//! [`StaleReference`](Error::StaleReference) asks for a re-index, a
//! [`Synthesis`](Error::Synthesis) failure is left to the caller to retry.
//!
//! Per-document search failures are not errors; they are reported as
//! [`SearchFailure`](crate::models::SearchFailure) values next to the
//! results that did succeed.

/// Errors surfaced by pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Blob storage could not add or remove a document's bytes.
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    /// Rendering or index building failed; the document is marked `failed`.
    #[error("indexing document {document_id} failed: {reason:#}")]
    Index {
        document_id: String,
        reason: anyhow::Error,
    },

    /// A result points at a page the document no longer has.
    #[error(
        "page {page_number} of document {document_id} is out of range \
         (the document now renders {page_count} pages); re-index the document"
    )]
    StaleReference {
        document_id: String,
        page_number: u32,
        page_count: usize,
    },

    /// The generation engine failed or timed out.
    #[error("answer synthesis failed: {0:#}")]
    Synthesis(anyhow::Error),

    /// An engine could not be constructed by the model gateway.
    #[error("failed to load the {engine} engine: {reason:#}")]
    ModelLoad {
        engine: &'static str,
        reason: anyhow::Error,
    },

    /// A document could not be rasterized while resolving a page.
    #[error("could not render document {document_id}: {reason:#}")]
    Render {
        document_id: String,
        reason: anyhow::Error,
    },

    #[error("unknown document: {0}")]
    UnknownDocument(String),
}

impl Error {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Storage(_) => "storage_error",
            Error::Index { .. } => "index_error",
            Error::StaleReference { .. } => "stale_reference",
            Error::Synthesis(_) => "synthesis_error",
            Error::ModelLoad { .. } => "model_load_error",
            Error::Render { .. } => "render_error",
            Error::UnknownDocument(_) => "not_found",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_reference_message_suggests_reindex() {
        let err = Error::StaleReference {
            document_id: "doc-1".into(),
            page_number: 7,
            page_count: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("page 7"));
        assert!(msg.contains("re-index"));
        assert_eq!(err.code(), "stale_reference");
    }

    #[test]
    fn wrapped_reason_keeps_context_chain() {
        let reason = anyhow::anyhow!("disk full").context("writing blob");
        let err = Error::Storage(reason);
        assert_eq!(err.to_string(), "storage error: writing blob: disk full");
    }
}
