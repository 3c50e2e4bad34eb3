//! Error types for ragchat

use std::time::Duration;

use thiserror::Error;

/// Result type alias for ragchat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ragchat
#[derive(Error, Debug)]
pub enum Error {
    #[error("Empty message received")]
    EmptyMessage,

    #[error("Model timed out after {}s", .0.as_secs())]
    GenerationTimeout(Duration),

    #[error("Model error: {0}")]
    GenerationLaunch(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector database error: {0}")]
    VectorDb(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("User already exists")]
    UserExists,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token is missing!")]
    MissingToken,

    #[error("Token has expired!")]
    ExpiredToken,

    #[error("Invalid token!")]
    InvalidToken,
}

impl Error {
    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    pub fn generation_launch(msg: impl Into<String>) -> Self {
        Self::GenerationLaunch(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn vector_db(msg: impl Into<String>) -> Self {
        Self::VectorDb(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// HTTP status code this error maps to at the request boundary
    pub fn status_code(&self) -> u16 {
        match self {
            Error::EmptyMessage | Error::InvalidInput(_) | Error::UserExists => 400,
            Error::InvalidCredentials | Error::ExpiredToken | Error::InvalidToken => 401,
            Error::MissingToken => 403,
            _ => 500,
        }
    }

    /// Whether the error was caused by the caller rather than the server
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}
