use shale_query::{FilterParseError, PipelineParseError, UpdateParseError};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("duplicate key: {collection}.id = {id}")]
    DuplicateKey { collection: String, id: String },

    #[error(transparent)]
    Filter(#[from] FilterParseError),

    #[error(transparent)]
    Update(#[from] UpdateParseError),

    #[error(transparent)]
    Pipeline(#[from] PipelineParseError),

    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("a transaction is already in progress")]
    TransactionInProgress,

    #[error("session has ended")]
    SessionEnded,

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("global store: {0}")]
    GlobalStore(&'static str),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
