use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("Invalid date value: {0}")]
    InvalidDate(String),

    #[error("Invalid number value: {0}")]
    InvalidNumber(String),

    #[error("Invalid comparison operator: {0}")]
    InvalidOperator(String),

    #[error("Unknown meta type: {0}")]
    UnknownType(String),

    #[error("Owner of kind '{0}' has not been persisted yet")]
    UnsavedOwner(String),

    #[error("Field '{0}' cannot be assigned through the attribute path")]
    ReadOnlyField(String),

    #[error("Unknown owner kind: {0}")]
    UnknownOwnerKind(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Corrupt meta row: {0}")]
    Corrupt(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, MetaError>;
