use thiserror::Error;

use crate::config::ConfigError;
use crate::hooks::{HookError, Stage};

#[derive(Error, Debug)]
pub enum FreshetError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Plugin \"{plugin}\" failed at {stage}: {source}")]
    Hook {
        plugin: String,
        stage: Stage,
        #[source]
        source: HookError,
    },

    #[error("Cache I/O error: {0}")]
    CacheIo(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Render error: {0}")]
    Render(String),

    #[error("No feed could be processed")]
    NoFeedsProcessed,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FreshetError>;
