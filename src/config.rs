//! Configuration for ragchat

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Settings for the external generation process
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Executable to launch for every attempt
    pub program: String,

    /// Arguments passed to the executable
    pub args: Vec<String>,

    /// Hard deadline for a single attempt
    pub timeout: Duration,

    /// Total number of attempts (1 = no retry)
    pub max_retries: u32,

    /// Pause between a failed attempt and the next one
    pub retry_backoff: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            program: "ollama".to_string(),
            args: vec!["run".to_string(), "phi".to_string()],
            timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// Configuration for the chat backend
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for all storage
    pub data_dir: PathBuf,

    /// fastembed model name, e.g. `all-MiniLM-L6-v2`
    pub embedding_model: String,

    /// Embedding dimensions (384 for all-MiniLM-L6-v2)
    pub embedding_dimensions: usize,

    /// Name of the passage collection in the vector database
    pub collection: String,

    /// Number of nearest neighbours fetched per query
    pub top_k: usize,

    /// Generation process settings
    pub generation: GenerationConfig,

    /// Optional cap on transcript size, in tokens. `None` keeps transcripts unbounded.
    pub max_transcript_tokens: Option<u32>,

    /// Lifetime of issued bearer tokens
    pub token_ttl: Duration,

    /// Origin allowed by CORS
    pub cors_origin: String,

    /// HTTP server port
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ragchat");

        Self {
            data_dir,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dimensions: 384, // MiniLM-L6-v2 outputs 384-dim vectors
            collection: "railway_faq".to_string(),
            top_k: 3,
            generation: GenerationConfig::default(),
            max_transcript_tokens: None,
            token_ttl: Duration::from_secs(2 * 60 * 60),
            cors_origin: "http://localhost:3000".to_string(),
            server_port: 5000,
        }
    }
}

impl Config {
    /// Create a new config with a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Build a config from defaults overridden by `RAGCHAT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from defaults overridden by whatever `lookup` returns
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup("RAGCHAT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("RAGCHAT_PORT") {
            config.server_port = parse_var("RAGCHAT_PORT", &port)?;
        }
        if let Some(model) = lookup("RAGCHAT_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(dims) = lookup("RAGCHAT_EMBEDDING_DIMENSIONS") {
            config.embedding_dimensions = parse_var("RAGCHAT_EMBEDDING_DIMENSIONS", &dims)?;
        }
        if let Some(collection) = lookup("RAGCHAT_COLLECTION") {
            config.collection = collection;
        }
        if let Some(k) = lookup("RAGCHAT_TOP_K") {
            config.top_k = parse_var("RAGCHAT_TOP_K", &k)?;
            if config.top_k == 0 {
                return Err(Error::config("RAGCHAT_TOP_K must be at least 1"));
            }
        }
        if let Some(command) = lookup("RAGCHAT_MODEL_COMMAND") {
            let mut parts = command.split_whitespace().map(str::to_string);
            config.generation.program = parts
                .next()
                .ok_or_else(|| Error::config("RAGCHAT_MODEL_COMMAND is empty"))?;
            config.generation.args = parts.collect();
        }
        if let Some(secs) = lookup("RAGCHAT_MODEL_TIMEOUT_SECS") {
            let secs: u64 = parse_var("RAGCHAT_MODEL_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(Error::config("RAGCHAT_MODEL_TIMEOUT_SECS must be greater than 0"));
            }
            config.generation.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = lookup("RAGCHAT_MODEL_MAX_RETRIES") {
            config.generation.max_retries = parse_var("RAGCHAT_MODEL_MAX_RETRIES", &retries)?;
            if config.generation.max_retries == 0 {
                return Err(Error::config("RAGCHAT_MODEL_MAX_RETRIES must be at least 1"));
            }
        }
        if let Some(tokens) = lookup("RAGCHAT_MAX_TRANSCRIPT_TOKENS") {
            config.max_transcript_tokens =
                Some(parse_var("RAGCHAT_MAX_TRANSCRIPT_TOKENS", &tokens)?);
        }
        if let Some(origin) = lookup("RAGCHAT_CORS_ORIGIN") {
            config.cors_origin = origin;
        }
        if let Some(secs) = lookup("RAGCHAT_TOKEN_TTL_SECS") {
            config.token_ttl = Duration::from_secs(parse_var("RAGCHAT_TOKEN_TTL_SECS", &secs)?);
        }

        Ok(config)
    }

    /// Get the path to the SQLite account database
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("users.db")
    }

    /// Get the path to the vector database
    pub fn vector_db_path(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.vector_db_path())?;
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("{key}={value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.collection, "railway_faq");
        assert_eq!(config.generation.program, "ollama");
        assert_eq!(config.generation.args, vec!["run", "phi"]);
        assert_eq!(config.generation.timeout, Duration::from_secs(60));
        assert_eq!(config.generation.max_retries, 2);
        assert_eq!(config.generation.retry_backoff, Duration::from_secs(2));
        assert!(config.max_transcript_tokens.is_none());
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("RAGCHAT_DATA_DIR", "/tmp/ragchat-test"),
            ("RAGCHAT_PORT", "8080"),
            ("RAGCHAT_TOP_K", "5"),
            ("RAGCHAT_MODEL_COMMAND", "llama-cli --model tiny.gguf"),
            ("RAGCHAT_MODEL_TIMEOUT_SECS", "10"),
            ("RAGCHAT_MAX_TRANSCRIPT_TOKENS", "2048"),
            ("RAGCHAT_EMBEDDING_MODEL", "bge-base-en-v1.5"),
            ("RAGCHAT_EMBEDDING_DIMENSIONS", "768"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/ragchat-test"));
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.generation.program, "llama-cli");
        assert_eq!(config.generation.args, vec!["--model", "tiny.gguf"]);
        assert_eq!(config.generation.timeout, Duration::from_secs(10));
        assert_eq!(config.max_transcript_tokens, Some(2048));
        assert_eq!(config.embedding_model, "bge-base-en-v1.5");
        assert_eq!(config.embedding_dimensions, 768);
        assert_eq!(config.sqlite_path(), PathBuf::from("/tmp/ragchat-test/users.db"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("RAGCHAT_PORT", "not-a-port")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("RAGCHAT_MODEL_COMMAND", "   ")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("RAGCHAT_MODEL_MAX_RETRIES", "0")])),
            Err(Error::Config(_))
        ));
    }
}
