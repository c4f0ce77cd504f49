use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Conversation {0} is already processing a message")]
    Busy(String),

    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StudioError>;
