#[cfg(test)]
mod tests;

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::RagError;
use crate::chunking::ChunkingConfig;
use crate::embeddings::EmbeddingProfile;

/// Runtime configuration assembled from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub generation: GenerationConfig,
    pub embeddings: EmbeddingsConfig,
    pub chunking: ChunkingConfig,
    pub retrieval_top_k: usize,
    pub data_dir: PathBuf,
    pub provider_timeout: Option<Duration>,
    pub bind_addr: SocketAddr,
}

/// Connection settings for the chat completion provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub base_url: Url,
    pub model: String,
    pub api_key: String,
}

/// Connection settings for the embedding provider.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingsConfig {
    pub base_url: Url,
    pub model: String,
    pub api_key: Option<String>,
    pub normalize: bool,
    pub batch_size: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for {0}: {1}")]
    InvalidVar(&'static str, String),
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid retrieval depth: {0} (must be at least 1)")]
    InvalidTopK(usize),
    #[error("Invalid chunk size: {0} (must be at least 1)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid bind address: {0}")]
    InvalidBindAddr(String),
}

impl From<ConfigError> for RagError {
    #[inline]
    fn from(err: ConfigError) -> Self {
        RagError::Config(err.to_string())
    }
}

impl Config {
    /// Read configuration from process environment variables.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read configuration from an arbitrary variable source.
    ///
    /// `OPENROUTER_API_KEY` is the only required variable; everything else
    /// falls back to a default. Blank values count as unset.
    #[inline]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENROUTER_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingVar("OPENROUTER_API_KEY"))?;

        let generation = GenerationConfig {
            base_url: url_or(&lookup, "GENERATION_BASE_URL", "https://openrouter.ai/api/v1")?,
            model: text_or(&lookup, "GENERATION_MODEL", "openai/gpt-oss-20b:free"),
            api_key,
        };

        let embeddings = EmbeddingsConfig {
            base_url: url_or(&lookup, "EMBEDDINGS_BASE_URL", "http://localhost:11434/v1")?,
            model: text_or(&lookup, "EMBEDDINGS_MODEL", "BAAI/bge-small-en-v1.5"),
            api_key: lookup("EMBEDDINGS_API_KEY").filter(|v| !v.trim().is_empty()),
            normalize: bool_or(&lookup, "EMBEDDINGS_NORMALIZE", true)?,
            batch_size: parse_or(&lookup, "EMBEDDINGS_BATCH_SIZE", 32)?,
        };

        let chunking = ChunkingConfig {
            chunk_size: parse_or(&lookup, "CHUNK_SIZE", 1000)?,
            overlap: parse_or(&lookup, "CHUNK_OVERLAP", 200)?,
        };

        let provider_timeout = match parse_or(&lookup, "PROVIDER_TIMEOUT_SECS", 0u64)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let bind_raw = text_or(&lookup, "BIND_ADDR", "127.0.0.1:8000");
        let bind_addr = bind_raw
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_raw))?;

        let config = Self {
            generation,
            embeddings,
            chunking,
            retrieval_top_k: parse_or(&lookup, "RETRIEVAL_TOP_K", 4)?,
            data_dir: PathBuf::from(text_or(&lookup, "DATA_DIR", "./data")),
            provider_timeout,
            bind_addr,
        };

        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.generation.validate()?;
        self.embeddings.validate()?;
        self.validate_chunking()?;

        if self.retrieval_top_k == 0 {
            return Err(ConfigError::InvalidTopK(self.retrieval_top_k));
        }

        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if config.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.overlap >= config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap,
                config.chunk_size,
            ));
        }

        Ok(())
    }

    /// Path of the persisted vector index.
    #[inline]
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.json")
    }

    /// Directory where uploaded documents are stored.
    #[inline]
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// The embedding-space identity every persisted index must match.
    #[inline]
    pub fn embedding_profile(&self) -> EmbeddingProfile {
        EmbeddingProfile {
            model: self.embeddings.model.clone(),
            normalize: self.embeddings.normalize,
        }
    }
}

impl GenerationConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingVar("OPENROUTER_API_KEY"));
        }

        Ok(())
    }
}

impl EmbeddingsConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }
}

fn text_or<F>(lookup: &F, name: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn url_or<F>(lookup: &F, name: &str, default: &str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = text_or(lookup, name, default);
    Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl(raw))
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar(name, raw)),
        None => Ok(default),
    }
}

fn bool_or<F>(lookup: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidVar(name, raw)),
        },
        None => Ok(default),
    }
}
