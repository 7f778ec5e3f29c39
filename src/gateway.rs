//! Model gateway: lazily constructed, shared engine handles.
//!
//! Loading a retrieval or generation model can take a long time (weights,
//! device placement, remote health checks), so each engine is constructed
//! at most once per [`ModelGateway`] and the handle is shared afterwards.
//! The application keeps one gateway per process behind an `Arc`.
//!
//! Concurrent first calls are serialized by `tokio::sync::OnceCell`: one
//! caller runs the loader, the others wait and receive the same handle.
//! A failed load is returned to the caller that triggered it and is not
//! retried by the gateway.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use pagelens_core::engine::{GenerationModel, RetrievalModel};
use pagelens_core::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{Config, GenerationConfig, RetrieverConfig};
use crate::{generation, retriever};

/// Constructs engines on behalf of the gateway.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load_retrieval(&self) -> Result<Arc<dyn RetrievalModel>>;
    async fn load_generation(&self) -> Result<Arc<dyn GenerationModel>>;
}

/// Builds engines from the `[retriever]` and `[generation]` config sections.
pub struct ConfigLoader {
    retriever: RetrieverConfig,
    generation: GenerationConfig,
}

impl ConfigLoader {
    pub fn new(config: &Config) -> Self {
        Self {
            retriever: config.retriever.clone(),
            generation: config.generation.clone(),
        }
    }
}

#[async_trait]
impl EngineLoader for ConfigLoader {
    async fn load_retrieval(&self) -> Result<Arc<dyn RetrievalModel>> {
        retriever::create_retrieval(&self.retriever).await
    }

    async fn load_generation(&self) -> Result<Arc<dyn GenerationModel>> {
        generation::create_generation(&self.generation)
    }
}

pub struct ModelGateway {
    loader: Box<dyn EngineLoader>,
    retrieval: OnceCell<Arc<dyn RetrievalModel>>,
    generation: OnceCell<Arc<dyn GenerationModel>>,
}

impl ModelGateway {
    pub fn new(loader: impl EngineLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            retrieval: OnceCell::new(),
            generation: OnceCell::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ConfigLoader::new(config))
    }

    /// A gateway whose engines are already constructed.
    pub fn with_engines(
        retrieval: Arc<dyn RetrievalModel>,
        generation: Arc<dyn GenerationModel>,
    ) -> Self {
        Self {
            loader: Box::new(PreloadedLoader),
            retrieval: OnceCell::new_with(Some(retrieval)),
            generation: OnceCell::new_with(Some(generation)),
        }
    }

    /// The shared retrieval engine, constructing it on first use.
    pub async fn retrieval_engine(&self) -> Result<Arc<dyn RetrievalModel>, Error> {
        self.retrieval
            .get_or_try_init(|| async {
                let started = Instant::now();
                info!("loading retrieval engine");
                let engine = self.loader.load_retrieval().await.map_err(|reason| {
                    warn!(error = %format!("{:#}", reason), "retrieval engine failed to load");
                    Error::ModelLoad {
                        engine: "retrieval",
                        reason,
                    }
                })?;
                info!(
                    model = engine.model_name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "retrieval engine ready"
                );
                Ok::<_, Error>(engine)
            })
            .await
            .cloned()
    }

    /// The shared generation engine, constructing it on first use.
    pub async fn generation_engine(&self) -> Result<Arc<dyn GenerationModel>, Error> {
        self.generation
            .get_or_try_init(|| async {
                let started = Instant::now();
                info!("loading generation engine");
                let engine = self.loader.load_generation().await.map_err(|reason| {
                    warn!(error = %format!("{:#}", reason), "generation engine failed to load");
                    Error::ModelLoad {
                        engine: "generation",
                        reason,
                    }
                })?;
                info!(
                    model = engine.model_name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "generation engine ready"
                );
                Ok::<_, Error>(engine)
            })
            .await
            .cloned()
    }

    /// The retrieval engine if it has already been constructed.
    pub fn loaded_retrieval(&self) -> Option<Arc<dyn RetrievalModel>> {
        self.retrieval.get().cloned()
    }

    /// Construct both engines now instead of on first use.
    pub async fn warm_up(&self) -> Result<(), Error> {
        self.retrieval_engine().await?;
        self.generation_engine().await?;
        Ok(())
    }
}

/// Loader for gateways built with [`ModelGateway::with_engines`]; never
/// called because both cells start populated.
struct PreloadedLoader;

#[async_trait]
impl EngineLoader for PreloadedLoader {
    async fn load_retrieval(&self) -> Result<Arc<dyn RetrievalModel>> {
        anyhow::bail!("retrieval engine was not preloaded")
    }

    async fn load_generation(&self) -> Result<Arc<dyn GenerationModel>> {
        anyhow::bail!("generation engine was not preloaded")
    }
}
