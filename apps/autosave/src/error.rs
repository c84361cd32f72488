use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("draft cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("draft cache is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AutosaveError {
    #[error("auto-save worker has stopped")]
    Closed,

    #[error("save failed: {0}")]
    Save(String),
}
