//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and its two backends:
//! - **[`OpenAiProvider`]**: calls an OpenAI-compatible `POST /embeddings` endpoint.
//! - **`LocalProvider`**: runs a sentence-embedding model in-process via
//!   fastembed (feature `local-embeddings`); no network calls after the model
//!   is downloaded.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`l2_normalize`]: scale a vector to unit length
//!
//! # Provider Selection
//!
//! [`create_provider`] resolves the configured [`ProviderKind`] once, at
//! startup. The returned handle is shared by every request; dispatch never
//! happens per call.
//!
//! ```rust,no_run
//! # use grounded_chat::config::EmbeddingConfig;
//! # use grounded_chat::embedding::create_provider;
//! # async fn example() -> anyhow::Result<()> {
//! let provider = create_provider(&EmbeddingConfig::default())?;
//! let vector = provider.embed("What is a vector store?").await?;
//! assert!(!vector.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! # Input Normalization
//!
//! Every provider embeds `normalize_input(text)`: whitespace runs collapse
//! to a single space and the result is trimmed. Ingestion and retrieval thus
//! see identical text for identical content.

#[cfg(feature = "local-embeddings")]
mod local;

#[cfg(feature = "local-embeddings")]
pub use local::LocalProvider;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::error::ProviderError;

const PROVIDER: &str = "embedding provider";

/// An embedding backend.
///
/// Implementations are `Send + Sync` and shared behind an `Arc` across all
/// concurrent requests. Any lazy initialization happens at most once.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed one text. Input is normalized by the provider.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_input(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============ OpenAI Provider ============

/// Embedding provider for OpenAI-compatible HTTP APIs.
///
/// Sends `{model, input}` to `{base_url}/embeddings` with bearer auth and
/// returns the first embedding of the response.
pub struct OpenAiProvider {
    client: reqwest::Client,
    model: String,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiProvider {
    pub const DEFAULT_MODEL: &'static str = "text-embedding-3-small";

    /// # Errors
    ///
    /// Returns [`ProviderError::MissingCredential`] when no API key is configured.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ProviderError::MissingCredential("OPENAI_API_KEY"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER,
                source,
            })?;

        Ok(Self {
            client,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": normalize_input(text),
        });

        let http = |source| ProviderError::Http {
            provider: PROVIDER,
            source,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(http)?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or(ProviderError::EmptyResponse(PROVIDER))?;

        debug!(model = %self.model, dims = vector.len(), "embedded text");
        Ok(vector)
    }
}

/// Create the configured [`EmbeddingProvider`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"local"` (alias `"supabase"`) | `LocalProvider` (needs feature `local-embeddings`) |
/// | `"openai"` | [`OpenAiProvider`] |
///
/// The local model itself is not loaded here; it loads on first use.
///
/// # Errors
///
/// Returns an error if the remote provider has no API key or the local
/// provider is not compiled in / names an unknown model.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    match config.provider {
        ProviderKind::Openai => Ok(Arc::new(OpenAiProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        ProviderKind::Local => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        ProviderKind::Local => Err(ProviderError::Unavailable(
            ProviderKind::Local.as_str().to_string(),
        )),
    }
}

/// Scale a vector to unit L2 norm. Zero vectors are returned unchanged.
pub fn l2_normalize(mut vec: Vec<f32>) -> Vec<f32> {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
    vec
}

/// Cosine of the angle between `a` and `b`.
///
/// Mismatched lengths, empty input and zero vectors all score `0.0`, so a
/// vector from a different model never ranks as a match.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, sq_a, sq_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, sq_a, sq_b), (x, y)| {
            (dot + x * y, sq_a + x * x, sq_b + y * y)
        });

    let magnitude = (sq_a * sq_b).sqrt();
    if magnitude < f32::EPSILON {
        0.0
    } else {
        dot / magnitude
    }
}
