//! Error types for provider implementations.

use thiserror::Error;

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("provider error: {0}")]
    Other(String),
}

impl From<ProviderError> for agentflow_core::CoreError {
    fn from(err: ProviderError) -> Self {
        agentflow_core::CoreError::Provider(err.to_string())
    }
}
