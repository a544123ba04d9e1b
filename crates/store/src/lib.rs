//! Note storage for Filvyn.
//!
//! Note bodies go to a content-addressed PDP piece server, which assigns
//! each payload a CID some time after upload. Around it:
//! - `cache` keeps recently used notes per user (TTL + LRU)
//! - `meta` is the durable index of which CIDs a user owns
//! - `vector` answers "which notes are about X"
//! - `pool` bounds fan-out when many notes are hydrated at once
//!
//! `NoteStore` composes them.

pub mod cache;
pub mod memory;
pub mod meta;
pub mod pdp;
pub mod pool;
pub mod service;
pub mod vector;

pub use cache::{CacheStats, Clock, NoteCache, SystemClock};
pub use memory::MemoryPieceApi;
pub use meta::{JsonMetaIndex, MetaIndex};
pub use pdp::{CheckOutcome, ContentStore, HttpPieceApi, PieceApi, PieceClient, PieceDigest};
pub use pool::run_bounded;
pub use service::{NoteStore, DEFAULT_SEARCH_LIMIT};
pub use vector::{ChromaIndex, InMemoryVectorIndex, VectorIndex};
