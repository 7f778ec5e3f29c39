//! TOML configuration.
//!
//! Every section is optional; omitted keys fall back to the defaults
//! below, so an empty file is a valid configuration (offline in-memory
//! retrieval, generation disabled).
//!
//! ```toml
//! [storage]
//! dir = "./data/uploads"
//!
//! [index]
//! retain_content = false
//!
//! [retrieval]
//! top_k = 3
//! display_limit = 5
//!
//! [retriever]
//! provider = "http"
//! url = "http://127.0.0.1:8765"
//! model = "vidore/colpali"
//!
//! [generation]
//! provider = "ollama"
//! model = "qwen2.5vl:7b"
//! max_new_tokens = 50
//!
//! [rasterizer]
//! dpi = 200
//!
//! [resolve]
//! cache_pages = false
//!
//! [server]
//! bind = "127.0.0.1:7860"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub retriever: RetrieverConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub rasterizer: RasterizerConfig,
    #[serde(default)]
    pub resolve: ResolveConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Where uploaded documents are kept.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IndexConfig {
    /// Keep page content inside the index so results carry snippets.
    #[serde(default)]
    pub retain_content: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Hits requested from each document's index.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Results returned to the presentation layer per query.
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,
    /// Query documents concurrently.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            display_limit: default_display_limit(),
            parallel: true,
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_display_limit() -> usize {
    5
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrieverConfig {
    /// `"memory"` or `"http"`.
    #[serde(default = "default_retriever_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_retriever_model")]
    pub model: String,
    #[serde(default = "default_retriever_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            provider: default_retriever_provider(),
            url: None,
            model: default_retriever_model(),
            timeout_secs: default_retriever_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_retriever_provider() -> String {
    "memory".to_string()
}
fn default_retriever_model() -> String {
    "vidore/colpali".to_string()
}
fn default_retriever_timeout_secs() -> u64 {
    300
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `"disabled"`, `"openai"`, or `"ollama"`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            max_new_tokens: default_max_new_tokens(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_max_new_tokens() -> usize {
    50
}
fn default_generation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RasterizerConfig {
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm: PathBuf,
    #[serde(default = "default_pdftotext")]
    pub pdftotext: PathBuf,
    /// Extract each page's text layer alongside the image.
    #[serde(default = "default_true")]
    pub extract_text: bool,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            pdftoppm: default_pdftoppm(),
            pdftotext: default_pdftotext(),
            extract_text: true,
            dpi: default_dpi(),
        }
    }
}

fn default_pdftoppm() -> PathBuf {
    PathBuf::from("pdftoppm")
}
fn default_pdftotext() -> PathBuf {
    PathBuf::from("pdftotext")
}
fn default_dpi() -> u32 {
    200
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ResolveConfig {
    /// Reuse pages rendered at index time instead of re-rendering the
    /// document for every answer.
    #[serde(default)]
    pub cache_pages: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7860".to_string()
}
fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

impl Config {
    /// Check value ranges and provider names.
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.display_limit == 0 {
            bail!("retrieval.display_limit must be >= 1");
        }

        match self.retriever.provider.as_str() {
            "memory" => {}
            "http" => {
                if self.retriever.url.is_none() {
                    bail!("retriever.url must be set when provider is 'http'");
                }
            }
            other => bail!(
                "Unknown retriever provider: '{}'. Must be memory or http.",
                other
            ),
        }

        match self.generation.provider.as_str() {
            "disabled" => {}
            "openai" | "ollama" => {
                if self.generation.model.is_none() {
                    bail!(
                        "generation.model must be specified when provider is '{}'",
                        self.generation.provider
                    );
                }
            }
            other => bail!(
                "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if self.generation.max_new_tokens == 0 {
            bail!("generation.max_new_tokens must be >= 1");
        }
        if self.generation.timeout_secs == 0 {
            bail!("generation.timeout_secs must be >= 1");
        }

        if !(36..=1200).contains(&self.rasterizer.dpi) {
            bail!("rasterizer.dpi must be in [36, 1200]");
        }

        if self.server.max_upload_bytes == 0 {
            bail!("server.max_upload_bytes must be > 0");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.retrieval.top_k, 3);
        assert_eq!(cfg.retrieval.display_limit, 5);
        assert!(cfg.retrieval.parallel);
        assert!(!cfg.index.retain_content);
        assert_eq!(cfg.retriever.provider, "memory");
        assert_eq!(cfg.generation.max_new_tokens, 50);
        assert!(!cfg.generation.is_enabled());
        assert_eq!(cfg.rasterizer.dpi, 200);
        assert!(!cfg.resolve.cache_pages);
    }

    #[test]
    fn full_file_parses() {
        let cfg = parse_config(
            r#"
[storage]
dir = "/tmp/pagelens"

[index]
retain_content = true

[retrieval]
top_k = 4
display_limit = 2
parallel = false

[retriever]
provider = "http"
url = "http://127.0.0.1:8765"

[generation]
provider = "ollama"
model = "qwen2.5vl:7b"
max_new_tokens = 64

[resolve]
cache_pages = true

[server]
bind = "0.0.0.0:9000"
"#,
        )
        .unwrap();
        assert_eq!(cfg.storage.dir, PathBuf::from("/tmp/pagelens"));
        assert!(cfg.index.retain_content);
        assert_eq!(cfg.retrieval.top_k, 4);
        assert!(!cfg.retrieval.parallel);
        assert_eq!(cfg.retriever.model, "vidore/colpali");
        assert_eq!(cfg.generation.model.as_deref(), Some("qwen2.5vl:7b"));
        assert!(cfg.resolve.cache_pages);
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn rejects_zero_top_k() {
        let err = parse_config("[retrieval]\ntop_k = 0\n").unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn http_retriever_requires_url() {
        let err = parse_config("[retriever]\nprovider = \"http\"\n").unwrap_err();
        assert!(err.to_string().contains("retriever.url"));
    }

    #[test]
    fn generation_provider_requires_model() {
        let err = parse_config("[generation]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("generation.model"));
    }

    #[test]
    fn unknown_providers_rejected() {
        assert!(parse_config("[generation]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[retriever]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn dpi_out_of_range_rejected() {
        assert!(parse_config("[rasterizer]\ndpi = 5\n").is_err());
    }
}
