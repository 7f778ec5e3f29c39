//! Retrieval engine construction and the HTTP retrieval-service client.
//!
//! [`create_retrieval`] picks the engine named by `[retriever] provider`:
//! - **`memory`**: [`InMemoryRetrieval`], keyword scoring over the text
//!   layer of each page. Offline, no model weights.
//! - **`http`**: [`HttpRetrievalModel`], a client for a late-interaction
//!   multimodal retrieval service (e.g. a ColPali server) that owns the
//!   model and its indexes.
//!
//! # Service API
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | `GET` | `/health` | | 2xx |
//! | `POST` | `/index` | `{key, model, retain_content, overwrite, pages}` | 2xx |
//! | `POST` | `/search` | `{key, query, k}` | `{"results": [hit]}` or `[hit]` |
//! | `DELETE` | `/index/{key}` | | 2xx, or 404 when absent |
//!
//! A hit is `{"page_num" | "page_number": n, "score"?: f, "content"?: s}`.
//! Page images travel base64-encoded.
//!
//! # Retry Strategy
//!
//! Same policy as every outbound call in this crate:
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - backoff 1s, 2s, 4s, … capped at 2^5 seconds, up to `max_retries`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pagelens_core::engine::memory::InMemoryRetrieval;
use pagelens_core::engine::RetrievalModel;
use pagelens_core::models::{PageHit, PageImage};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::RetrieverConfig;

/// Build the retrieval engine selected by `config.provider`.
pub async fn create_retrieval(config: &RetrieverConfig) -> Result<Arc<dyn RetrievalModel>> {
    match config.provider.as_str() {
        "memory" => Ok(Arc::new(InMemoryRetrieval::new())),
        "http" => Ok(Arc::new(HttpRetrievalModel::connect(config).await?)),
        other => bail!("Unknown retriever provider: '{}'", other),
    }
}

pub struct HttpRetrievalModel {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl HttpRetrievalModel {
    /// Create a client and check that the service answers `GET /health`.
    pub async fn connect(config: &RetrieverConfig) -> Result<Self> {
        let model = Self::new(config)?;
        model
            .send(Method::GET, "/health", None, false)
            .await
            .with_context(|| format!("Retrieval service at {} is not reachable", model.url))?;
        info!(url = %model.url, model = %model.model, "retrieval service reachable");
        Ok(model)
    }

    /// Create a client without contacting the service.
    pub fn new(config: &RetrieverConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("retriever.url required for the http provider"))?
            .trim_end_matches('/')
            .to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    /// Send one request with retry/backoff, returning the final response.
    ///
    /// A 404 is returned as a response only when `not_found_ok` is set;
    /// otherwise it is an error like any other client error.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        not_found_ok: bool,
    ) -> Result<reqwest::Response> {
        let endpoint = format!("{}{}", self.url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, delay_secs = delay.as_secs(), %endpoint, "retrying");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.request(method.clone(), &endpoint);
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() || (not_found_ok && status == StatusCode::NOT_FOUND) {
                        return Ok(response);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_err = Some(anyhow!("Retrieval service error {}: {}", status, body_text));
                        continue;
                    }
                    bail!("Retrieval service error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow!(
                        "Retrieval service connection error (is it running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Retrieval request failed after retries")))
    }
}

#[async_trait]
impl RetrievalModel for HttpRetrievalModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn build_index(&self, key: &str, pages: &[PageImage], retain_content: bool) -> Result<()> {
        let body = json!({
            "key": key,
            "model": self.model,
            "retain_content": retain_content,
            "overwrite": true,
            "pages": pages
                .iter()
                .enumerate()
                .map(|(i, page)| json!({
                    "page_num": i + 1,
                    "media_type": page.media_type,
                    "image": BASE64.encode(&page.bytes),
                    "text": page.text,
                }))
                .collect::<Vec<_>>(),
        });

        self.send(Method::POST, "/index", Some(&body), false).await?;
        debug!(key, pages = pages.len(), "remote index built");
        Ok(())
    }

    async fn query(&self, key: &str, text: &str, top_k: usize) -> Result<Vec<PageHit>> {
        let body = json!({ "key": key, "query": text, "k": top_k });
        let response = self.send(Method::POST, "/search", Some(&body), true).await?;
        if response.status() == StatusCode::NOT_FOUND {
            bail!("no index named '{}' on the retrieval service", key);
        }
        let json: Value = response.json().await?;
        let mut hits = parse_search_response(&json)?;
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn drop_index(&self, key: &str) -> Result<()> {
        let response = self
            .send(Method::DELETE, &format!("/index/{}", key), None, true)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!(key, "retrieval service had no index to drop");
        }
        Ok(())
    }
}

/// Parse a `/search` response into hits, accepting either a `results`
/// array or a bare top-level array.
fn parse_search_response(json: &Value) -> Result<Vec<PageHit>> {
    let items = json
        .get("results")
        .unwrap_or(json)
        .as_array()
        .ok_or_else(|| anyhow!("Invalid search response: expected a results array"))?;

    items
        .iter()
        .map(|item| {
            serde_json::from_value::<PageHit>(item.clone())
                .context("Invalid search response: malformed hit")
        })
        .collect()
}
