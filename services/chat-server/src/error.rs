use crate::cache::CacheError;
use thiserror::Error;

/// Server-wide error type.
///
/// `UserVisible` carries a message safe to show to the caller and maps to the
/// 400 envelope; everything else is logged and collapses to the generic 500.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("invalid frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("{0}")]
    UserVisible(String),

    #[error("config error: {0}")]
    Config(String),
}

impl ChatError {
    pub fn user_visible(message: impl Into<String>) -> Self {
        ChatError::UserVisible(message.into())
    }
}

impl From<redis::RedisError> for ChatError {
    fn from(err: redis::RedisError) -> Self {
        ChatError::Cache(CacheError::from(err))
    }
}
