//! Generation engines: one page image plus a question in, answer text out.
//!
//! - **[`DisabledGenerationModel`]**: always errors; the default, so search
//!   works without any vision-language model configured.
//! - **[`OpenAiGenerationModel`]**: OpenAI-compatible `chat/completions`
//!   with the page attached as a base64 data URI. Requires `OPENAI_API_KEY`.
//! - **[`OllamaGenerationModel`]**: a local Ollama `/api/chat` with the
//!   page in `images` (e.g. `qwen2.5vl`).
//!
//! Generation is not retried: a failed answer is reported and the caller
//! decides whether to ask again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pagelens_core::engine::GenerationModel;
use pagelens_core::models::{GeneratedSequence, GenerationRequest};
use serde_json::{json, Value};

use crate::config::GenerationConfig;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Build the generation engine selected by `config.provider`.
pub fn create_generation(config: &GenerationConfig) -> Result<Arc<dyn GenerationModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerationModel)),
        "openai" => Ok(Arc::new(OpenAiGenerationModel::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerationModel::new(config)?)),
        other => bail!("Unknown generation provider: '{}'", other),
    }
}

fn http_client(config: &GenerationConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

// ============ Disabled ============

pub struct DisabledGenerationModel;

#[async_trait]
impl GenerationModel for DisabledGenerationModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedSequence> {
        bail!("answer generation is disabled; set [generation] provider in the config")
    }
}

// ============ OpenAI ============

pub struct OpenAiGenerationModel {
    client: reqwest::Client,
    model: String,
    url: String,
    api_key: String,
}

impl OpenAiGenerationModel {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .as_deref()
            .unwrap_or(OPENAI_DEFAULT_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: http_client(config)?,
            model,
            url,
            api_key,
        })
    }
}

#[async_trait]
impl GenerationModel for OpenAiGenerationModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedSequence> {
        let data_uri = format!(
            "data:{};base64,{}",
            request.image.media_type,
            BASE64.encode(&request.image.bytes)
        );
        let body = json!({
            "model": self.model,
            "max_tokens": request.max_new_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": data_uri } },
                    { "type": "text", "text": request.prompt },
                ],
            }],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }
        let json: Value = response.json().await?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &Value) -> Result<GeneratedSequence> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))?;
    Ok(GeneratedSequence::completion(content))
}

// ============ Ollama ============

pub struct OllamaGenerationModel {
    client: reqwest::Client,
    model: String,
    url: String,
}

impl OllamaGenerationModel {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("generation.model required for Ollama provider"))?;
        let url = config
            .url
            .as_deref()
            .unwrap_or(OLLAMA_DEFAULT_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: http_client(config)?,
            model,
            url,
        })
    }
}

#[async_trait]
impl GenerationModel for OllamaGenerationModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedSequence> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": [{
                "role": "user",
                "content": request.prompt,
                "images": [BASE64.encode(&request.image.bytes)],
            }],
            "options": { "num_predict": request.max_new_tokens },
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }
        let json: Value = response.json().await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &Value) -> Result<GeneratedSequence> {
    let content = json
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))?;
    Ok(GeneratedSequence::completion(content))
}
