//! In-process piece server: useful for testing and offline sessions.
//!
//! Behaves like a PDP server with eventual CID assignment: an uploaded
//! piece only becomes findable after a configurable number of lookups.

use async_trait::async_trait;
use filvyn_core::error::StoreError;
use filvyn_core::Cid;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::pdp::{CheckOutcome, PieceApi, PieceDigest};

#[derive(Default)]
struct Pieces {
    /// hash → (cid, bytes) for assigned pieces
    stored: HashMap<String, (Cid, Vec<u8>)>,
    /// hash → (bytes, lookups seen) for uploaded but unassigned pieces
    pending: HashMap<String, (Vec<u8>, u32)>,
}

/// A [`PieceApi`] that keeps pieces in a HashMap.
#[derive(Default)]
pub struct MemoryPieceApi {
    pieces: Mutex<Pieces>,
    misses_before_assign: u32,
    fail_finds: bool,
    checks: AtomicU32,
    uploads: AtomicU32,
    finds: AtomicU32,
}

impl MemoryPieceApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer "not yet assigned" to the first `misses` lookups of each piece.
    pub fn assign_after(mut self, misses: u32) -> Self {
        self.misses_before_assign = misses;
        self
    }

    /// Make every lookup fail with a transport error.
    pub fn failing_finds(mut self) -> Self {
        self.fail_finds = true;
        self
    }

    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn finds(&self) -> u32 {
        self.finds.load(Ordering::SeqCst)
    }

    /// Number of assigned pieces.
    pub fn len(&self) -> usize {
        self.lock().stored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pieces> {
        self.pieces.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cid_for(digest: &PieceDigest) -> Cid {
        Cid::new(format!("baga6ea4sea{}", &digest.hash[..16]))
    }
}

#[async_trait]
impl PieceApi for MemoryPieceApi {
    async fn check(&self, digest: &PieceDigest) -> Result<CheckOutcome, StoreError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        match self.lock().stored.get(&digest.hash) {
            Some((cid, _)) => Ok(CheckOutcome::Exists(cid.clone())),
            None => Ok(CheckOutcome::UploadRequired {
                location: format!("/pdp/piece/upload/{}", digest.hash),
            }),
        }
    }

    async fn upload(&self, location: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let hash = location
            .rsplit('/')
            .next()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| StoreError::Protocol(format!("Bad upload location: {location}")))?;
        self.lock()
            .pending
            .insert(hash.to_string(), (bytes.to_vec(), 0));
        Ok(())
    }

    async fn find(&self, digest: &PieceDigest) -> Result<Option<Cid>, StoreError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        if self.fail_finds {
            return Err(StoreError::Transport("connection reset".into()));
        }

        let mut pieces = self.lock();
        if let Some((cid, _)) = pieces.stored.get(&digest.hash) {
            return Ok(Some(cid.clone()));
        }
        let Some((_, seen)) = pieces.pending.get_mut(&digest.hash) else {
            return Ok(None);
        };
        if *seen < self.misses_before_assign {
            *seen += 1;
            return Ok(None);
        }

        let Some((bytes, _)) = pieces.pending.remove(&digest.hash) else {
            return Ok(None);
        };
        let cid = Self::cid_for(digest);
        pieces
            .stored
            .insert(digest.hash.clone(), (cid.clone(), bytes));
        Ok(Some(cid))
    }

    async fn fetch(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .lock()
            .stored
            .values()
            .find(|(c, _)| c == cid)
            .map(|(_, bytes)| bytes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn piece_assigned_after_misses() {
        let api = MemoryPieceApi::new().assign_after(2);
        let digest = PieceDigest::of(b"abc");

        let CheckOutcome::UploadRequired { location } = api.check(&digest).await.unwrap() else {
            panic!("fresh piece should need an upload");
        };
        api.upload(&location, b"abc").await.unwrap();

        assert_eq!(api.find(&digest).await.unwrap(), None);
        assert_eq!(api.find(&digest).await.unwrap(), None);
        let cid = api.find(&digest).await.unwrap().unwrap();

        assert_eq!(api.fetch(&cid).await.unwrap(), Some(b"abc".to_vec()));
        assert_eq!(api.check(&digest).await.unwrap(), CheckOutcome::Exists(cid));
        assert_eq!(api.len(), 1);
    }

    #[tokio::test]
    async fn find_before_upload_is_none() {
        let api = MemoryPieceApi::new();
        assert_eq!(api.find(&PieceDigest::of(b"x")).await.unwrap(), None);
        assert!(api.is_empty());
    }
}
