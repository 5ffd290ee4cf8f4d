//! In-process embedding via fastembed.
//!
//! The ONNX model is downloaded and loaded on the first `embed` call, then
//! kept for the lifetime of the provider. Inference runs on the blocking
//! pool; the session is guarded by a mutex because fastembed needs `&mut`.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::info;

use super::{l2_normalize, normalize_input, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::ProviderError;

const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

/// Embedding provider backed by a lazily loaded local model.
pub struct LocalProvider {
    model_name: String,
    model: fastembed::EmbeddingModel,
    engine: OnceCell<Arc<Mutex<fastembed::TextEmbedding>>>,
}

impl LocalProvider {
    /// # Errors
    ///
    /// Returns [`ProviderError::Local`] for model names fastembed does not ship.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let model = config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            model,
            engine: OnceCell::new(),
        })
    }

    async fn engine(&self) -> Result<Arc<Mutex<fastembed::TextEmbedding>>, ProviderError> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                let model = self.model.clone();
                let name = self.model_name.clone();
                info!(model = %name, "loading local embedding model");
                let loaded = tokio::task::spawn_blocking(move || {
                    fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(model).with_show_download_progress(false),
                    )
                })
                .await
                .map_err(|e| ProviderError::Local(e.to_string()))?
                .map_err(|e| {
                    ProviderError::Local(format!("failed to load model '{}': {}", name, e))
                })?;
                Ok::<_, ProviderError>(Arc::new(Mutex::new(loaded)))
            })
            .await?;
        Ok(engine.clone())
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let engine = self.engine().await?;
        let input = vec![normalize_input(text)];

        let mut output = tokio::task::spawn_blocking(move || {
            let mut session = engine
                .lock()
                .map_err(|_| ProviderError::Local("embedding session poisoned".to_string()))?;
            session
                .embed(input, None)
                .map_err(|e| ProviderError::Local(e.to_string()))
        })
        .await
        .map_err(|e| ProviderError::Local(e.to_string()))??;

        let vector = output
            .pop()
            .filter(|v| !v.is_empty())
            .ok_or(ProviderError::EmptyResponse("local model"))?;
        Ok(l2_normalize(vector))
    }
}

fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel, ProviderError> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        other => Err(ProviderError::Local(format!(
            "unknown local embedding model '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-base",
            other
        ))),
    }
}
