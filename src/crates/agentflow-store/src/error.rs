use thiserror::Error;

/// Errors surfaced by [`crate::traits::SignalStore`] implementations and the
/// [`crate::player::Player`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("recording {0} not found")]
    RecordingNotFound(String),

    #[error("recording {0} is finalized and accepts no further signals")]
    Finalized(String),

    #[error("checkpoint {0:?} not found in recording {1}")]
    CheckpointNotFound(String, String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
