//! # PageLens Core
//!
//! Shared, I/O-free logic for PageLens: the document and query data model,
//! the typed pipeline error taxonomy, the collaborator traits (rasterizer,
//! retrieval model, generation model, blob store), in-memory engines, and
//! the cross-document ranking and answer-extraction algorithms.
//!
//! This crate contains no tokio, filesystem, or network code. Concrete
//! adapters (Poppler, HTTP model services, disk storage) live in the
//! `pagelens` application crate.

pub mod answer;
pub mod engine;
pub mod error;
pub mod models;
pub mod search;

pub use error::{Error, Result};
