use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing timestamp")]
    MissingTimestamp,
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("missing coordinates")]
    MissingCoordinates,
    #[error("invalid coordinates: lon={lon}, lat={lat}")]
    InvalidCoordinates { lon: f64, lat: f64 },
    #[error("field not in field order: {0}")]
    UndeclaredField(String),
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("field is not a finite number: {0}")]
    InvalidField(String),
}
