use thiserror::Error;

/// Persistence failures surfaced by the case store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("unknown case kind in storage: {0}")]
    UnknownKind(String),
}
