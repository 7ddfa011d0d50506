use thiserror::Error;

/// The error taxonomy for the execution engine. Every fallible engine
/// operation returns [`Result`].
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("binding error: {0}")]
    Binding(String),

    #[error("node {node_id} failed: {source}")]
    Node {
        node_id: String,
        #[source]
        source: Box<CoreError>,
    },

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("session {0} is already running")]
    SessionAlreadyRunning(String),

    #[error(transparent)]
    Store(#[from] agentflow_store::StoreError),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout after {duration_ms}ms during {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn binding(msg: impl Into<String>) -> Self {
        Self::Binding(msg.into())
    }

    pub fn node(node_id: impl Into<String>, source: CoreError) -> Self {
        Self::Node {
            node_id: node_id.into(),
            source: Box::new(source),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }
}
