//! Error types for docdex

use thiserror::Error;

/// Result type alias using DocdexError
pub type Result<T> = std::result::Result<T, DocdexError>;

/// Error type alias for convenience
pub type Error = DocdexError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Main error type for docdex
#[derive(Debug, Error)]
pub enum DocdexError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid slice: {0}")]
    InvalidSlice(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Crawl error: {0}")]
    Crawl(String),

    #[error("Chunk error: {0}")]
    Chunk(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("GitHub token rejected (401); check github.token in config.yml")]
    TokenInvalid,

    #[error("GitHub rate limit exhausted; add a github.token to config.yml to raise the limit")]
    RateLimited,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl DocdexError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SourceNotFound(_) | Self::DocumentNotFound(_) => exit_codes::NOT_FOUND,
            Self::InvalidUrl(_) | Self::InvalidSlice(_) | Self::Config(_) => {
                exit_codes::INVALID_INPUT
            }
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}
