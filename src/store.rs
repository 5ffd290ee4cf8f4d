//! Vector store access.
//!
//! The [`VectorStore`] trait covers the two operations the service needs:
//! nearest-neighbor search and record insertion. Two backends:
//!
//! - [`SupabaseStore`]: PostgREST API of a Supabase project. Search calls
//!   the `match_documents` RPC, inserts go to the `documents` table.
//! - [`MemoryStore`]: brute-force cosine search over records held in memory.
//!   Used by tests and by local runs without a provisioned database.

use async_trait::async_trait;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

use crate::config::StoreConfig;
use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::models::{NewRecord, RetrievedSource};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Rows with similarity `>= threshold`, best first, at most `count`.
    async fn match_documents(
        &self,
        query: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<RetrievedSource>, StoreError>;

    /// Persist one record. Identity is assigned by the store.
    async fn insert(&self, record: &NewRecord) -> Result<(), StoreError>;
}

// ============ Supabase ============

/// PostgREST client for a Supabase project.
pub struct SupabaseStore {
    client: reqwest::Client,
    rest_url: String,
    key: String,
    match_function: String,
    table: String,
}

impl SupabaseStore {
    /// # Errors
    ///
    /// Returns [`StoreError::NotConfigured`] when the URL or key is absent.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let url = config
            .url
            .as_deref()
            .ok_or(StoreError::NotConfigured("SUPABASE_URL"))?;
        let key = config
            .key
            .clone()
            .ok_or(StoreError::NotConfigured("SUPABASE_SERVICE_ROLE"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            key,
            match_function: config.match_function.clone(),
            table: config.table.clone(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/{}", self.rest_url, path))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl VectorStore for SupabaseStore {
    async fn match_documents(
        &self,
        query: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<RetrievedSource>, StoreError> {
        let body = serde_json::json!({
            "query_embedding": query,
            "match_threshold": threshold,
            "match_count": count,
        });

        let response = self
            .post(&format!("rpc/{}", self.match_function))
            .json(&body)
            .send()
            .await?;
        let rows: Vec<RetrievedSource> = check_status(response).await?.json().await?;

        debug!(rows = rows.len(), threshold, count, "match_documents");
        Ok(rows)
    }

    async fn insert(&self, record: &NewRecord) -> Result<(), StoreError> {
        let response = self
            .post(&self.table)
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

// ============ In-memory ============

struct StoredRecord {
    id: i64,
    content: String,
    embedding: Vec<f32>,
}

/// In-memory store with brute-force cosine search.
///
/// All records must share one dimensionality; an insert or query with a
/// different vector length is rejected.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Contents of all stored records in insertion order.
    pub fn contents(&self) -> Vec<String> {
        self.records
            .read()
            .map(|r| r.iter().map(|rec| rec.content.clone()).collect())
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Rejected("memory store lock poisoned".to_string())
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn match_documents(
        &self,
        query: &[f32],
        threshold: f64,
        count: usize,
    ) -> Result<Vec<RetrievedSource>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        if let Some(first) = records.first() {
            if first.embedding.len() != query.len() {
                return Err(StoreError::Rejected(format!(
                    "query has {} dimensions, store holds {}",
                    query.len(),
                    first.embedding.len()
                )));
            }
        }

        let mut scored: Vec<RetrievedSource> = records
            .iter()
            .map(|rec| RetrievedSource {
                id: rec.id,
                document_id: None,
                content: rec.content.clone(),
                similarity: Some(f64::from(cosine_similarity(query, &rec.embedding))),
            })
            .filter(|src| src.similarity.unwrap_or(0.0) >= threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(count);
        Ok(scored)
    }

    async fn insert(&self, record: &NewRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        if let Some(first) = records.first() {
            if first.embedding.len() != record.embedding.len() {
                return Err(StoreError::Rejected(format!(
                    "record has {} dimensions, store holds {}",
                    record.embedding.len(),
                    first.embedding.len()
                )));
            }
        }
        let id = records.len() as i64 + 1;
        records.push(StoredRecord {
            id,
            content: record.content.clone(),
            embedding: record.embedding.clone(),
        });
        Ok(())
    }
}
