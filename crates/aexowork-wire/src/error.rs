use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("json error: {0}")]
    Json(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("payload decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for WireError {
    fn from(e: serde_json::Error) -> Self {
        WireError::Json(e.to_string())
    }
}
