use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("no history for track: {0}")]
    NotFound(String),
    #[error("invalid track id: {0}")]
    InvalidTrackId(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed history: {0}")]
    Malformed(String),
}
