//! Unified error type for the portfolio engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid parameters: {0}")]
    Validation(String),

    #[error("Strategy not found: {0}")]
    UnknownStrategy(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
