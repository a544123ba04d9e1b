//! Content-addressed piece storage over the PDP protocol.
//!
//! A write is a two-phase exchange: announce the payload's digest, upload
//! the bytes if the server doesn't already have them, then poll until the
//! server has assigned the piece CID. The CID is not part of the upload
//! response, so resolution is a bounded retry loop with a fixed delay.
//!
//! [`PieceApi`] is the wire transport, [`PieceClient`] is the protocol, and
//! [`ContentStore`] is what the rest of the crate programs against.

use async_trait::async_trait;
use filvyn_config::{AppConfig, PdpConfig};
use filvyn_core::error::StoreError;
use filvyn_core::Cid;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_RETRIEVAL_DELAY: Duration = Duration::from_millis(2000);
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// Hash name the PDP server expects in digests.
const HASH_NAME: &str = "sha2-256";

/// SHA-256 digest and size of a payload, the key the server indexes pieces by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceDigest {
    /// Lowercase hex SHA-256
    pub hash: String,
    pub size: u64,
}

impl PieceDigest {
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            hash: hex::encode(Sha256::digest(bytes)),
            size: bytes.len() as u64,
        }
    }
}

/// Server answer to a write intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The piece is already stored under this CID
    Exists(Cid),
    /// Upload the bytes to this server-relative path
    UploadRequired { location: String },
}

/// Wire transport for the piece server.
#[async_trait]
pub trait PieceApi: Send + Sync {
    /// Announce a payload by digest.
    async fn check(&self, digest: &PieceDigest) -> Result<CheckOutcome, StoreError>;

    /// Send the raw bytes to an upload target returned by `check`.
    async fn upload(&self, location: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Look up the CID assigned to a digest; `None` while not yet assigned.
    async fn find(&self, digest: &PieceDigest) -> Result<Option<Cid>, StoreError>;

    /// Read a piece; `None` if the server doesn't know the CID.
    async fn fetch(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Immutable blob storage keyed by server-assigned CIDs.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(&self, bytes: &[u8]) -> Result<Cid, StoreError>;
    async fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError>;
}

/// The PDP write/resolve/read protocol on top of a [`PieceApi`].
pub struct PieceClient<A> {
    api: A,
    retrieval_delay: Duration,
    max_retries: u32,
}

impl<A: PieceApi> PieceClient<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            retrieval_delay: DEFAULT_RETRIEVAL_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn from_config(api: A, config: &PdpConfig) -> Self {
        Self::new(api)
            .with_retrieval_delay(config.retrieval_delay())
            .with_max_retries(config.max_retries)
    }

    /// Wait before each CID lookup.
    pub fn with_retrieval_delay(mut self, delay: Duration) -> Self {
        self.retrieval_delay = delay;
        self
    }

    /// Total CID lookups before giving up (at least one).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    async fn resolve(&self, digest: &PieceDigest) -> Result<Cid, StoreError> {
        for attempt in 1..=self.max_retries {
            tokio::time::sleep(self.retrieval_delay).await;
            match self.api.find(digest).await {
                Ok(Some(cid)) => {
                    info!(cid = %cid, attempt, "Piece CID resolved");
                    return Ok(cid);
                }
                Ok(None) => {
                    debug!(hash = %digest.hash, attempt, "Piece CID not assigned yet");
                }
                Err(e) => {
                    warn!(hash = %digest.hash, attempt, error = %e, "Piece CID lookup failed");
                }
            }
        }

        warn!(hash = %digest.hash, attempts = self.max_retries, "Giving up on piece CID");
        Err(StoreError::CidUnresolved {
            hash: digest.hash.clone(),
            attempts: self.max_retries,
        })
    }
}

#[async_trait]
impl<A: PieceApi> ContentStore for PieceClient<A> {
    async fn put(&self, bytes: &[u8]) -> Result<Cid, StoreError> {
        let digest = PieceDigest::of(bytes);
        info!(size = digest.size, hash = %digest.hash, "Initiating piece upload");

        match self.api.check(&digest).await? {
            CheckOutcome::Exists(cid) => {
                info!(cid = %cid, "Piece already stored");
                Ok(cid)
            }
            CheckOutcome::UploadRequired { location } => {
                self.api.upload(&location, bytes).await?;
                self.resolve(&digest).await
            }
        }
    }

    async fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError> {
        debug!(cid = %cid, "Retrieving piece");
        self.api.fetch(cid).await
    }
}

/// reqwest transport against a PDP REST server.
pub struct HttpPieceApi {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct CheckResponse {
    #[serde(rename = "pieceCID")]
    piece_cid: Option<String>,
}

#[derive(Deserialize)]
struct FindResponse {
    piece_cid: Option<String>,
}

impl HttpPieceApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StoreError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    /// Build from the `[pdp]` section; the bearer token is required.
    pub fn from_config(config: &AppConfig) -> filvyn_core::Result<Self> {
        let token = config.require_pdp_token()?;
        Ok(Self::new(&config.pdp.url, token)?)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

/// 5xx is the server's problem and may clear up; anything else unexpected
/// means we and the server disagree about the protocol.
fn unexpected(what: &str, status: reqwest::StatusCode) -> StoreError {
    if status.is_server_error() {
        StoreError::Transport(format!("{what}: server returned {status}"))
    } else {
        StoreError::Protocol(format!("{what}: unexpected status {status}"))
    }
}

#[async_trait]
impl PieceApi for HttpPieceApi {
    async fn check(&self, digest: &PieceDigest) -> Result<CheckOutcome, StoreError> {
        let body = serde_json::json!({
            "check": { "name": HASH_NAME, "hash": digest.hash, "size": digest.size }
        });
        let response = self
            .client
            .post(format!("{}/pdp/piece", self.base_url))
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        match response.status().as_u16() {
            200 => {
                let parsed: CheckResponse = response.json().await.map_err(|e| {
                    StoreError::Protocol(format!("Malformed check response: {e}"))
                })?;
                parsed
                    .piece_cid
                    .map(|cid| CheckOutcome::Exists(Cid::new(cid)))
                    .ok_or_else(|| StoreError::Protocol("Check response without pieceCID".into()))
            }
            201 => response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|location| CheckOutcome::UploadRequired {
                    location: location.to_string(),
                })
                .ok_or_else(|| StoreError::Protocol("Server did not return an upload location".into())),
            _ => Err(unexpected("Piece check", response.status())),
        }
    }

    async fn upload(&self, location: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let response = self
            .client
            .put(format!("{}{}", self.base_url, location))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(transport)?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            Ok(())
        } else {
            // Any success other than 204 is still a protocol mismatch
            Err(StoreError::Protocol(format!(
                "Piece upload: expected 204, got {}",
                response.status()
            )))
        }
    }

    async fn find(&self, digest: &PieceDigest) -> Result<Option<Cid>, StoreError> {
        let size = digest.size.to_string();
        let response = self
            .client
            .get(format!("{}/pdp/piece", self.base_url))
            .query(&[
                ("size", size.as_str()),
                ("name", HASH_NAME),
                ("hash", digest.hash.as_str()),
            ])
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Ok(None);
        }
        let parsed: FindResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "Unreadable piece lookup response");
                return Ok(None);
            }
        };
        Ok(parsed.piece_cid.filter(|c| !c.is_empty()).map(Cid::new))
    }

    async fn fetch(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError> {
        let response = self
            .client
            .get(format!("{}/piece/{}", self.base_url, cid))
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            reqwest::StatusCode::OK => {
                let bytes = response.bytes().await.map_err(transport)?;
                Ok(Some(bytes.to_vec()))
            }
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => Err(unexpected("Piece read", status)),
        }
    }
}
