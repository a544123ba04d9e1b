//! Durable per-user note metadata index.
//!
//! The index is the authority on which CIDs a user owns. Note bodies live
//! in the piece store; this only keeps title, tags and creation time.
//!
//! Storage format (`db.json`):
//!
//! ```json
//! { "store": { "<user>": { "<cid>": { "title": "…", "tags": [], "createdAt": "…" } } } }
//! ```

use async_trait::async_trait;
use filvyn_core::error::StoreError;
use filvyn_core::{Cid, NoteMeta, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

pub type UserNotes = BTreeMap<Cid, NoteMeta>;

#[async_trait]
pub trait MetaIndex: Send + Sync {
    /// All of a user's notes. Unknown users have none.
    async fn load(&self, user: &UserId) -> Result<UserNotes, StoreError>;

    async fn insert(&self, user: &UserId, cid: &Cid, meta: NoteMeta) -> Result<(), StoreError>;

    /// Forget a user entirely; returns how many entries were dropped.
    async fn remove_user(&self, user: &UserId) -> Result<usize, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    store: BTreeMap<UserId, UserNotes>,
}

/// A single JSON file rewritten whole on every change.
///
/// Writes go to a sibling temp file that is then renamed over the
/// original, so a crash leaves either the old or the new document.
pub struct JsonMetaIndex {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonMetaIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Document, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::default()),
            Err(e) => {
                return Err(StoreError::Index(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Document::default());
        }
        serde_json::from_slice(&raw).map_err(|e| {
            StoreError::Index(format!("Corrupt index at {}: {e}", self.path.display()))
        })
    }

    async fn write(&self, doc: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Index(format!("Failed to create index directory: {e}"))
            })?;
        }

        let json = serde_json::to_vec_pretty(doc)
            .map_err(|e| StoreError::Index(format!("Failed to serialize index: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| StoreError::Index(format!("Failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Index(format!("Failed to replace {}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), users = doc.store.len(), "Index written");
        Ok(())
    }
}

#[async_trait]
impl MetaIndex for JsonMetaIndex {
    async fn load(&self, user: &UserId) -> Result<UserNotes, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read().await?;
        Ok(doc.store.remove(user).unwrap_or_default())
    }

    async fn insert(&self, user: &UserId, cid: &Cid, meta: NoteMeta) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read().await?;
        doc.store
            .entry(user.clone())
            .or_default()
            .insert(cid.clone(), meta);
        self.write(&doc).await
    }

    async fn remove_user(&self, user: &UserId) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read().await?;
        let Some(removed) = doc.store.remove(user) else {
            return Ok(0);
        };
        self.write(&doc).await?;
        Ok(removed.len())
    }
}
