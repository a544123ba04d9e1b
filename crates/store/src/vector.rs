//! Per-user semantic index over note embeddings.
//!
//! Two implementations:
//! - [`ChromaIndex`] talks to a Chroma server, one collection per user
//! - [`InMemoryVectorIndex`] ranks by cosine similarity in process

use async_trait::async_trait;
use filvyn_core::error::StoreError;
use filvyn_core::{Cid, UserId};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    async fn upsert(&self, user: &UserId, id: &Cid, embedding: Vec<f32>) -> Result<(), StoreError>;

    /// The `k` nearest ids with a similarity score, best first.
    async fn query(&self, user: &UserId, embedding: &[f32], k: usize) -> Result<Vec<(Cid, f32)>, StoreError>;

    async fn delete_all(&self, user: &UserId) -> Result<(), StoreError>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Brute-force cosine ranking, one Vec per user.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    users: RwLock<HashMap<UserId, Vec<(Cid, Vec<f32>)>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, user: &UserId, id: &Cid, embedding: Vec<f32>) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let entries = users.entry(user.clone()).or_default();
        match entries.iter_mut().find(|(cid, _)| cid == id) {
            Some(entry) => entry.1 = embedding,
            None => entries.push((id.clone(), embedding)),
        }
        Ok(())
    }

    async fn query(&self, user: &UserId, embedding: &[f32], k: usize) -> Result<Vec<(Cid, f32)>, StoreError> {
        let users = self.users.read().await;
        let Some(entries) = users.get(user) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(Cid, f32)> = entries
            .iter()
            .map(|(cid, e)| (cid.clone(), cosine_similarity(e, embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_all(&self, user: &UserId) -> Result<(), StoreError> {
        self.users.write().await.remove(user);
        Ok(())
    }
}

/// Chroma REST (v1) client. Collection ids are cached per user after the
/// first get-or-create.
pub struct ChromaIndex {
    base_url: String,
    client: reqwest::Client,
    collections: RwLock<HashMap<UserId, String>>,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

fn vector_err(e: reqwest::Error) -> StoreError {
    StoreError::Vector(e.to_string())
}

impl ChromaIndex {
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| StoreError::Vector(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            collections: RwLock::new(HashMap::new()),
        })
    }

    fn collection_name(user: &UserId) -> String {
        format!("user_{user}")
    }

    async fn ensure_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response, StoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Vector(format!("{what} failed ({status}): {body}")))
    }

    /// Collection id for a user, creating the collection if needed.
    async fn collection(&self, user: &UserId) -> Result<String, StoreError> {
        if let Some(id) = self.collections.read().await.get(user) {
            return Ok(id.clone());
        }

        let response = self
            .client
            .post(format!("{}/api/v1/collections", self.base_url))
            .json(&serde_json::json!({
                "name": Self::collection_name(user),
                "metadata": { "userId": user.as_str() },
                "get_or_create": true,
            }))
            .send()
            .await
            .map_err(vector_err)?;
        let collection: CollectionResponse = Self::ensure_success(response, "Collection create")
            .await?
            .json()
            .await
            .map_err(vector_err)?;

        debug!(user_id = %user, collection = %collection.id, "Chroma collection ready");
        self.collections
            .write()
            .await
            .insert(user.clone(), collection.id.clone());
        Ok(collection.id)
    }

    /// Collection id for a user without creating it.
    async fn existing_collection(&self, user: &UserId) -> Result<Option<String>, StoreError> {
        if let Some(id) = self.collections.read().await.get(user) {
            return Ok(Some(id.clone()));
        }

        let response = self
            .client
            .get(format!("{}/api/v1/collections/{}", self.base_url, Self::collection_name(user)))
            .send()
            .await
            .map_err(vector_err)?;
        if !response.status().is_success() {
            debug!(user_id = %user, status = %response.status(), "No Chroma collection for user");
            return Ok(None);
        }
        let collection: CollectionResponse = response.json().await.map_err(vector_err)?;
        self.collections
            .write()
            .await
            .insert(user.clone(), collection.id.clone());
        Ok(Some(collection.id))
    }
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    fn name(&self) -> &str {
        "chroma"
    }

    async fn upsert(&self, user: &UserId, id: &Cid, embedding: Vec<f32>) -> Result<(), StoreError> {
        let collection = self.collection(user).await?;
        let response = self
            .client
            .post(format!("{}/api/v1/collections/{}/upsert", self.base_url, collection))
            .json(&serde_json::json!({
                "ids": [id.as_str()],
                "embeddings": [embedding],
            }))
            .send()
            .await
            .map_err(vector_err)?;
        Self::ensure_success(response, "Upsert").await?;
        Ok(())
    }

    async fn query(&self, user: &UserId, embedding: &[f32], k: usize) -> Result<Vec<(Cid, f32)>, StoreError> {
        let Some(collection) = self.existing_collection(user).await? else {
            return Ok(Vec::new());
        };

        let response = self
            .client
            .post(format!("{}/api/v1/collections/{}/query", self.base_url, collection))
            .json(&serde_json::json!({
                "query_embeddings": [embedding],
                "n_results": k,
                "include": ["distances"],
            }))
            .send()
            .await
            .map_err(vector_err)?;
        let parsed: QueryResponse = Self::ensure_success(response, "Query")
            .await?
            .json()
            .await
            .map_err(vector_err)?;

        // One query embedding, so only the first row matters
        let ids = parsed.ids.into_iter().next().unwrap_or_default();
        let distances = parsed
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        Ok(ids
            .into_iter()
            .zip(distances)
            .map(|(id, distance)| (Cid::new(id), 1.0 - distance))
            .collect())
    }

    async fn delete_all(&self, user: &UserId) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(format!("{}/api/v1/collections/{}", self.base_url, Self::collection_name(user)))
            .send()
            .await
            .map_err(vector_err)?;
        self.collections.write().await.remove(user);

        // A user who never saved anything has no collection to drop
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::ensure_success(response, "Collection delete").await.map(|_| ())
    }
}
