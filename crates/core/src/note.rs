//! Note domain types.
//!
//! A note's identity is its content identifier (CID), assigned by the
//! content-addressed store on write. Callers never pick one.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Opaque per-user identifier handed over by the chat front end.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content identifier: a hash-derived handle, immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(pub String);

impl Cid {
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully materialized note. Its JSON form is the stored payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// RFC 3339 creation timestamp
    pub created_at: String,
}

impl Note {
    /// Create a note stamped with the current time.
    pub fn new(title: impl Into<String>, content: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            tags,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// The note without its content.
    pub fn meta(&self) -> NoteMeta {
        NoteMeta {
            title: self.title.clone(),
            tags: self.tags.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// What the durable per-user index keeps for each CID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteMeta {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: String,
}

impl NoteMeta {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn with_cid(self, cid: Cid) -> NoteMetaWithCid {
        NoteMetaWithCid { cid, meta: self }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteMetaWithCid {
    pub cid: Cid,
    #[serde(flatten)]
    pub meta: NoteMeta,
}

/// A note returned by semantic search, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNote {
    #[serde(flatten)]
    pub note: Note,
    pub score: f32,
}
