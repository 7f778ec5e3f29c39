//! # PageLens
//!
//! Visual retrieval and answer synthesis over PDF pages.
//!
//! Uploaded PDFs are rendered page by page and indexed by a multimodal
//! retrieval model, one index per document. A question is searched across
//! every indexed document, the per-document rankings are merged into one,
//! and a vision-language model answers from the top-ranked page image.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────────┐
//! │ Document │──▶│ Index Manager │──▶│  Retrieval    │
//! │  Store   │   │ render+index  │   │  model (http) │
//! └────┬─────┘   └───────────────┘   └──────┬────────┘
//!      │                                    │ fan-out + merge
//!      │         ┌───────────────┐   ┌──────▼────────┐
//!      └────────▶│  Synthesizer  │◀──│   Retrieval   │
//!                │ top page → VLM│   │    Engine     │
//!                └──────┬────────┘   └───────────────┘
//!                       ▼
//!               ┌──────────────┐
//!               │ CLI  /  HTTP │
//!               └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`gateway`] | Lazily loaded, shared model engines |
//! | [`blob`] | Directory-backed document storage |
//! | [`documents`] | Uploaded documents and their indexing status |
//! | [`index`] | Per-document index build, rebuild and retirement |
//! | [`search`] | Fan-out search and cross-document merge |
//! | [`synthesize`] | Page resolution and answer generation |
//! | [`cache`] | Optional rendered-page cache |
//! | [`session`] | One entry point per user action |
//! | [`render`] | Poppler rasterizer |
//! | [`retriever`] | Retrieval engines (in-memory, HTTP service) |
//! | [`generation`] | Generation engines (OpenAI, Ollama) |
//! | [`server`] | JSON HTTP API |

pub mod blob;
pub mod cache;
pub mod config;
pub mod documents;
pub mod gateway;
pub mod generation;
pub mod index;
pub mod render;
pub mod retriever;
pub mod search;
pub mod server;
pub mod session;
pub mod synthesize;

pub use pagelens_core;
