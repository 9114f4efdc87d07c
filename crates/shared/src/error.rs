use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("row for user {id} is missing its rank")]
    MissingRank { id: i64 },
}
