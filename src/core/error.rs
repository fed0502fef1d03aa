// Error handling for gwfetch

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GwError>;

#[derive(Error, Debug)]
pub enum GwError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid segment: {0}")]
    InvalidSegment(String),

    #[error("Invalid manifest line {line}: {reason}")]
    InvalidManifest { line: usize, reason: String },

    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("Invalid channel name: {0}")]
    InvalidChannel(String),

    #[error("Invalid frame file name: {0}")]
    InvalidFrameName(String),

    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
