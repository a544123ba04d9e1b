//! Per-user in-memory note cache with lazy TTL expiry and LRU eviction.
//!
//! Each user's map sits behind its own `std::sync::Mutex`; no lock is ever
//! held across an `.await`, so eviction plus insert is atomic per user.

use chrono::{DateTime, Utc};
use filvyn_core::{Cid, Note, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MAX_SIZE: usize = 100;

/// Time source for cache bookkeeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub note: Note,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Entries currently held, including expired ones not yet replaced
    pub size: usize,
    /// When the user's cache last received a note
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug)]
struct UserCache {
    notes: HashMap<Cid, CacheEntry>,
    last_updated: DateTime<Utc>,
}

pub struct NoteCache {
    users: Mutex<HashMap<UserId, Arc<Mutex<UserCache>>>>,
    max_age: Duration,
    max_size: usize,
    clock: Arc<dyn Clock>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl NoteCache {
    pub fn new(max_age: Duration, max_size: usize) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            max_age,
            max_size: max_size.max(1),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn user(&self, user: &UserId) -> Option<Arc<Mutex<UserCache>>> {
        lock(&self.users).get(user).cloned()
    }

    fn user_or_insert(&self, user: &UserId) -> Arc<Mutex<UserCache>> {
        let now = self.clock.now();
        lock(&self.users)
            .entry(user.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(UserCache {
                    notes: HashMap::new(),
                    last_updated: now,
                }))
            })
            .clone()
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        // A clock that went backwards counts as fresh
        (now - entry.last_accessed)
            .to_std()
            .map_or(true, |age| age < self.max_age)
    }

    /// Look up a note. A hit refreshes the entry's access time; an expired
    /// entry is a miss and stays in place until it is replaced or evicted.
    pub fn get(&self, user: &UserId, cid: &Cid) -> Option<Note> {
        let user_cache = self.user(user)?;
        let mut guard = lock(&user_cache);
        let now = self.clock.now();
        let entry = guard.notes.get_mut(cid)?;
        if !self.is_fresh(entry, now) {
            tracing::trace!(user_id = %user, cid = %cid, "Cache entry expired");
            return None;
        }
        entry.last_accessed = now;
        Some(entry.note.clone())
    }

    /// Insert or replace a note, evicting the least recently accessed entry
    /// first when a new CID would exceed the per-user capacity.
    pub fn put(&self, user: &UserId, cid: Cid, note: Note) {
        let user_cache = self.user_or_insert(user);
        let mut guard = lock(&user_cache);
        let now = self.clock.now();

        if guard.notes.len() >= self.max_size && !guard.notes.contains_key(&cid) {
            let oldest = guard
                .notes
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(cid, _)| cid.clone());
            if let Some(oldest) = oldest {
                tracing::debug!(user_id = %user, cid = %oldest, "Evicting least recently used note");
                guard.notes.remove(&oldest);
            }
        }

        guard.notes.insert(
            cid,
            CacheEntry {
                note,
                last_accessed: now,
            },
        );
        guard.last_updated = now;
    }

    /// Drop one user's cache, or every user's when `user` is `None`.
    pub fn clear(&self, user: Option<&UserId>) {
        let mut users = lock(&self.users);
        match user {
            Some(user) => {
                users.remove(user);
            }
            None => users.clear(),
        }
    }

    pub fn stats(&self, user: &UserId) -> Option<CacheStats> {
        let user_cache = self.user(user)?;
        let guard = lock(&user_cache);
        Some(CacheStats {
            size: guard.notes.len(),
            last_updated: guard.last_updated,
        })
    }
}

impl Default for NoteCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE, DEFAULT_MAX_SIZE)
    }
}
