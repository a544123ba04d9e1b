//! Configuration loading, validation, and management for Filvyn.
//!
//! Loads configuration from `~/.filvyn/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.filvyn/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM backend used for chat and embeddings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// PDP piece server
    #[serde(default)]
    pub pdp: PdpConfig,

    /// Note cache and fan-out limits
    #[serde(default)]
    pub cache: CacheConfig,

    /// Semantic search index
    #[serde(default)]
    pub vector: VectorConfig,

    /// Agent behaviour
    #[serde(default)]
    pub agent: AgentConfig,

    /// Where the durable note index lives
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    AppConfig::config_dir().join("data")
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_chat_model() -> String {
    "gpt-4".into()
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PdpConfig {
    #[serde(default = "default_pdp_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Wait before each CID lookup after an upload
    #[serde(default = "default_retrieval_delay_ms")]
    pub retrieval_delay_ms: u64,

    /// Total CID lookups before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_pdp_url() -> String {
    "https://caliberation-pdp.infrafolio.com".into()
}
fn default_retrieval_delay_ms() -> u64 {
    2000
}
fn default_max_retries() -> u32 {
    4
}

impl PdpConfig {
    pub fn retrieval_delay(&self) -> Duration {
        Duration::from_millis(self.retrieval_delay_ms)
    }
}

impl Default for PdpConfig {
    fn default() -> Self {
        Self {
            url: default_pdp_url(),
            token: None,
            retrieval_delay_ms: default_retrieval_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl std::fmt::Debug for PdpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdpConfig")
            .field("url", &self.url)
            .field("token", &redact(&self.token))
            .field("retrieval_delay_ms", &self.retrieval_delay_ms)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Entries per user
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Concurrent piece fetches when hydrating many notes
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_max_age_secs() -> u64 {
    3600
}
fn default_max_size() -> usize {
    100
}
fn default_max_concurrent_requests() -> usize {
    15
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
            max_size: default_max_size(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Chroma,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default = "default_vector_backend")]
    pub backend: VectorBackend,

    #[serde(default = "default_chroma_url")]
    pub url: String,
}

fn default_vector_backend() -> VectorBackend {
    VectorBackend::Chroma
}
fn default_chroma_url() -> String {
    "http://localhost:8000".into()
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            url: default_chroma_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Assistant persona name used in the system prompt
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Model calls per user message before the turn is abandoned
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Non-system messages kept per user
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_agent_name() -> String {
    "Filvyn".into()
}
fn default_max_turns() -> u32 {
    16
}
fn default_max_history() -> usize {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            max_turns: default_max_turns(),
            max_history: default_max_history(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location with environment overrides.
    ///
    /// Priority: env vars > config file > defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// API key and PDP token from the environment only fill gaps; endpoints
    /// and model names from the environment always win.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = lookup("FILVYN_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.provider.api_url = url;
        }
        if let Some(model) = lookup("FILVYN_MODEL").or_else(|| lookup("OPENAI_MODEL")) {
            self.provider.chat_model = model;
        }
        if let Some(url) = lookup("PDP_URL") {
            self.pdp.url = url;
        }
        if self.pdp.token.is_none() {
            self.pdp.token = lookup("PDP_TOKEN");
        }
        if let Some(url) = lookup("CHROMA_URL") {
            self.vector.url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".filvyn")
    }

    /// Path of the JSON note index under `data_dir`.
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("db").join("db.json")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.pdp.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "pdp.max_retries must be at least 1".into(),
            ));
        }
        if self.cache.max_size == 0 {
            return Err(ConfigError::ValidationError(
                "cache.max_size must be at least 1".into(),
            ));
        }
        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The LLM API key, required to build a provider.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        non_empty(&self.provider.api_key)
            .ok_or(ConfigError::MissingSecret("provider.api_key (or OPENAI_API_KEY)"))
    }

    /// The PDP bearer token, required to build the piece client.
    pub fn require_pdp_token(&self) -> Result<&str, ConfigError> {
        non_empty(&self.pdp.token).ok_or(ConfigError::MissingSecret("pdp.token (or PDP_TOKEN)"))
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.trim().is_empty())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            pdp: PdpConfig::default(),
            cache: CacheConfig::default(),
            vector: VectorConfig::default(),
            agent: AgentConfig::default(),
            data_dir: default_data_dir(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required secret: {0}")]
    MissingSecret(&'static str),
}

impl From<ConfigError> for filvyn_core::Error {
    fn from(e: ConfigError) -> Self {
        filvyn_core::Error::Config {
            message: e.to_string(),
        }
    }
}
