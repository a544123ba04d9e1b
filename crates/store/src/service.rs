//! The note store: piece storage, metadata index, semantic index and cache
//! composed behind one API.

use chrono::Utc;
use filvyn_core::error::StoreError;
use filvyn_core::event::{DomainEvent, EventBus};
use filvyn_core::provider::{EmbeddingRequest, Provider};
use filvyn_core::{Cid, Note, NoteMetaWithCid, ScoredNote, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, NoteCache};
use crate::meta::MetaIndex;
use crate::pdp::ContentStore;
use crate::pool::{run_bounded, DEFAULT_CONCURRENCY};
use crate::vector::VectorIndex;

/// Results returned by `search_similar` when the caller has no preference.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

pub struct NoteStore {
    content: Arc<dyn ContentStore>,
    meta: Arc<dyn MetaIndex>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Provider>,
    embedding_model: String,
    cache: NoteCache,
    concurrency: usize,
    event_bus: Option<Arc<EventBus>>,
}

impl NoteStore {
    pub fn new(
        content: Arc<dyn ContentStore>,
        meta: Arc<dyn MetaIndex>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Provider>,
    ) -> Self {
        Self {
            content,
            meta,
            vectors,
            embedder,
            embedding_model: "text-embedding-ada-002".into(),
            cache: NoteCache::default(),
            concurrency: DEFAULT_CONCURRENCY,
            event_bus: None,
        }
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_cache(mut self, cache: NoteCache) -> Self {
        self.cache = cache;
        self
    }

    /// Maximum concurrent piece fetches when hydrating many notes.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let response = self
            .embedder
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: vec![text.to_string()],
            })
            .await
            .map_err(|e| StoreError::Embedding(e.to_string()))?;
        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Embedding("Provider returned no embedding".into()))
    }

    /// Persist a note and index it.
    ///
    /// The piece upload and the metadata write must both succeed. Indexing
    /// for semantic search is best-effort: a failure there is logged and the
    /// note is still saved.
    pub async fn add_note(&self, user: &UserId, note: Note) -> Result<NoteMetaWithCid, StoreError> {
        let payload = serde_json::to_vec(&note)
            .map_err(|e| StoreError::Protocol(format!("Failed to encode note: {e}")))?;

        let cid = self.content.put(&payload).await.inspect_err(|e| {
            warn!(user_id = %user, error = %e, "Failed to store note payload");
        })?;

        let meta = note.meta();
        self.meta.insert(user, &cid, meta.clone()).await?;

        match self.embed(&note.content).await {
            Ok(embedding) => {
                if let Err(e) = self.vectors.upsert(user, &cid, embedding).await {
                    warn!(user_id = %user, cid = %cid, error = %e, "Note saved but not indexed for search");
                }
            }
            Err(e) => {
                warn!(user_id = %user, cid = %cid, error = %e, "Note saved but not embedded");
            }
        }

        self.cache.put(user, cid.clone(), note);
        info!(user_id = %user, cid = %cid, "Note saved");

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::NoteSaved {
                user_id: user.to_string(),
                cid: cid.to_string(),
                timestamp: Utc::now(),
            });
        }

        Ok(meta.with_cid(cid))
    }

    /// Cache-aside read of a note the user owns. CIDs missing from the
    /// user's meta index, fetch failures and decode failures all read as
    /// "not found".
    pub async fn get_note(&self, user: &UserId, cid: &Cid) -> Option<Note> {
        if let Some(note) = self.cache.get(user, cid) {
            debug!(user_id = %user, cid = %cid, "Note cache hit");
            return Some(note);
        }

        match self.meta.load(user).await {
            Ok(owned) if owned.contains_key(cid) => {}
            Ok(_) => {
                debug!(user_id = %user, cid = %cid, "CID not in user's index");
                return None;
            }
            Err(e) => {
                warn!(user_id = %user, cid = %cid, error = %e, "Failed to read note index");
                return None;
            }
        }

        let bytes = match self.content.get(cid).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(user_id = %user, cid = %cid, "Note not found in piece store");
                return None;
            }
            Err(e) => {
                warn!(user_id = %user, cid = %cid, error = %e, "Failed to fetch note");
                return None;
            }
        };

        match serde_json::from_slice::<Note>(&bytes) {
            Ok(note) => {
                self.cache.put(user, cid.clone(), note.clone());
                Some(note)
            }
            Err(e) => {
                let err = StoreError::CorruptNote {
                    cid: cid.to_string(),
                    reason: e.to_string(),
                };
                warn!(user_id = %user, error = %err, "Discarding unreadable note");
                None
            }
        }
    }

    /// Every note the user owns, fetched with bounded concurrency.
    /// Notes that can't be fetched are left out.
    pub async fn user_notes(&self, user: &UserId) -> Result<Vec<Note>, StoreError> {
        let cids: Vec<Cid> = self.meta.load(user).await?.into_keys().collect();
        let notes = run_bounded(self.concurrency, cids, |cid| async move {
            self.get_note(user, &cid).await
        })
        .await;
        Ok(notes.into_iter().flatten().collect())
    }

    /// Metadata of the user's notes, oldest first, optionally filtered by
    /// an exact tag.
    pub async fn list_notes(&self, user: &UserId, tag: Option<&str>) -> Result<Vec<NoteMetaWithCid>, StoreError> {
        let mut notes: Vec<NoteMetaWithCid> = self
            .meta
            .load(user)
            .await?
            .into_iter()
            .filter(|(_, meta)| tag.is_none_or(|t| meta.has_tag(t)))
            .map(|(cid, meta)| meta.with_cid(cid))
            .collect();
        notes.sort_by(|a, b| a.meta.created_at.cmp(&b.meta.created_at));
        Ok(notes)
    }

    /// Notes semantically closest to `query`. Any failure yields an empty list.
    pub async fn search_similar(&self, user: &UserId, query: &str, limit: usize) -> Vec<ScoredNote> {
        let hits = match self.search_hits(user, query, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(user_id = %user, error = %e, "Semantic search failed");
                return Vec::new();
            }
        };

        let notes = run_bounded(self.concurrency, hits, |(cid, score)| async move {
            self.get_note(user, &cid)
                .await
                .map(|note| ScoredNote { note, score })
        })
        .await;
        notes.into_iter().flatten().collect()
    }

    async fn search_hits(&self, user: &UserId, query: &str, limit: usize) -> Result<Vec<(Cid, f32)>, StoreError> {
        let embedding = self.embed(query).await?;
        self.vectors.query(user, &embedding, limit).await
    }

    /// Drop one user's cached notes, or everyone's.
    pub fn clear_cache(&self, user: Option<&UserId>) {
        self.cache.clear(user);
    }

    /// Drop the user's cache and semantic index. Stored pieces and the
    /// metadata index are kept.
    pub async fn clear_user_data(&self, user: &UserId) -> Result<(), StoreError> {
        self.cache.clear(Some(user));
        self.vectors.delete_all(user).await
    }

    pub fn cache_stats(&self, user: &UserId) -> Option<CacheStats> {
        self.cache.stats(user)
    }
}
