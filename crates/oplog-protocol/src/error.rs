use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid record {id}: {reason}")]
    InvalidRecord { id: i64, reason: String },
}
