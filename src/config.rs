//! Configuration loading.
//!
//! Settings come from an optional TOML file and are then overlaid with
//! environment variables, so a deployment can run from the environment
//! alone. Credentials are only ever read from the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_overlap() -> usize {
    100
}

/// The closed set of embedding backends.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// In-process model (fastembed).
    #[default]
    #[serde(alias = "supabase")]
    Local,
    /// OpenAI-compatible `/embeddings` HTTP API.
    Openai,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "local" | "supabase" => Some(Self::Local),
            "openai" => Some(Self::Openai),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Openai => "openai",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Model name; each provider falls back to its own default.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            base_url: default_embedding_base_url(),
            timeout_secs: default_embedding_timeout(),
            api_key: None,
        }
    }
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_timeout() -> u64 {
    30
}

impl EmbeddingConfig {
    /// True when the selected provider needs a credential that is absent.
    pub fn missing_credential(&self) -> bool {
        self.provider == ProviderKind::Openai && self.api_key.is_none()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_match_function")]
    pub match_function: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
    #[serde(skip)]
    pub key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            match_function: default_match_function(),
            table: default_table(),
            timeout_secs: default_store_timeout(),
            key: None,
        }
    }
}

fn default_match_function() -> String {
    "match_documents".to_string()
}
fn default_table() -> String {
    "documents".to_string()
}
fn default_store_timeout() -> u64 {
    30
}

impl StoreConfig {
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.key.is_some()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default = "default_match_count")]
    pub match_count: usize,
    #[serde(default = "default_answer_language")]
    pub answer_language: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            match_count: default_match_count(),
            answer_language: default_answer_language(),
        }
    }
}

fn default_match_threshold() -> f64 {
    0.78
}
fn default_match_count() -> usize {
    8
}
fn default_answer_language() -> String {
    "French".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default = "default_title")]
    pub title: String,
    /// Upper bound on connect + response headers.
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
    /// Upper bound on the gap between two streamed chunks.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_completion_model(),
            base_url: default_completion_base_url(),
            referer: None,
            title: default_title(),
            timeout_secs: default_completion_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            api_key: None,
        }
    }
}

fn default_completion_model() -> String {
    "openai/gpt-4o-mini".to_string()
}
fn default_completion_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
pub(crate) fn default_title() -> String {
    "grounded-chat".to_string()
}
fn default_completion_timeout() -> u64 {
    60
}
fn default_idle_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_history: default_max_history(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_max_history() -> usize {
    20
}

/// Load configuration from an optional TOML file plus the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Overlay values from an environment lookup. Blank values count as unset
    /// and numbers that do not parse keep the current value.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENROUTER_API_KEY") {
            self.completion.api_key = Some(v);
        }
        if let Some(v) = get("OPENROUTER_MODEL") {
            self.completion.model = v;
        }
        if let Some(v) = get("OPENROUTER_BASE_URL") {
            self.completion.base_url = v;
        }
        if let Some(v) = get("OPENROUTER_HTTP_REFERRER") {
            self.completion.referer = Some(v);
        }
        if let Some(v) = get("OPENROUTER_X_TITLE") {
            self.completion.title = v;
        }

        if let Some(kind) = get("EMBEDDINGS_PROVIDER").and_then(|v| ProviderKind::parse(&v)) {
            self.embedding.provider = kind;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.embedding.api_key = Some(v);
        }
        let model_var = match self.embedding.provider {
            ProviderKind::Openai => "OPENAI_EMBEDDING_MODEL",
            ProviderKind::Local => "LOCAL_EMBEDDING_MODEL",
        };
        if let Some(v) = get(model_var) {
            self.embedding.model = Some(v);
        }

        if let Some(v) = get("SUPABASE_URL").or_else(|| get("NEXT_PUBLIC_SUPABASE_URL")) {
            self.store.url = Some(v);
        }
        if let Some(v) = get("SUPABASE_SERVICE_ROLE").or_else(|| get("SUPABASE_ANON_KEY")) {
            self.store.key = Some(v);
        }

        if let Some(v) = get("RAG_MATCH_THRESHOLD").and_then(|v| v.trim().parse().ok()) {
            self.retrieval.match_threshold = v;
        }
        if let Some(v) = get("RAG_MATCH_COUNT").and_then(|v| v.trim().parse().ok()) {
            self.retrieval.match_count = v;
        }

        if let Some(v) = get("SERVER_BIND") {
            self.server.bind = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.retrieval.match_count == 0 {
            anyhow::bail!("retrieval.match_count must be >= 1");
        }
        if !(-1.0..=1.0).contains(&self.retrieval.match_threshold) {
            anyhow::bail!("retrieval.match_threshold must be in [-1.0, 1.0]");
        }
        Ok(())
    }
}
