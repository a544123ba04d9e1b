pub mod chat;
pub mod init;
pub mod notes;
pub mod piece;
pub mod status;

use filvyn_config::{AppConfig, VectorBackend};
use filvyn_core::provider::Provider;
use filvyn_store::{ChromaIndex, HttpPieceApi, InMemoryVectorIndex, JsonMetaIndex, NoteCache, NoteStore, PieceClient, VectorIndex};
use std::sync::Arc;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load().map_err(|e| format!("Failed to load config: {e}").into())
}

/// The piece store client described by `config`.
pub fn piece_client(config: &AppConfig) -> Result<PieceClient<HttpPieceApi>, Box<dyn std::error::Error>> {
    let api = HttpPieceApi::from_config(config)?;
    Ok(PieceClient::from_config(api, &config.pdp))
}

/// Assemble the full note store: pieces, index, vectors and cache.
pub fn note_store(config: &AppConfig, embedder: Arc<dyn Provider>) -> Result<NoteStore, Box<dyn std::error::Error>> {
    let vectors: Arc<dyn VectorIndex> = match config.vector.backend {
        VectorBackend::Chroma => Arc::new(ChromaIndex::new(config.vector.url.clone())?),
        VectorBackend::Memory => Arc::new(InMemoryVectorIndex::new()),
    };
    let cache = NoteCache::new(config.cache.max_age(), config.cache.max_size);

    Ok(NoteStore::new(
        Arc::new(piece_client(config)?),
        Arc::new(JsonMetaIndex::new(config.index_path())),
        vectors,
        embedder,
    )
    .with_embedding_model(config.provider.embedding_model.clone())
    .with_cache(cache)
    .with_concurrency(config.cache.max_concurrent_requests))
}
