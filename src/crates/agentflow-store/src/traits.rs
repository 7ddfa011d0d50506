//! The [`SignalStore`] trait: the persistence seam for recordings.
//!
//! Modeled after checkpoint-saver abstractions in graph execution engines —
//! a store is append-only per recording until `finalize` is called, at which
//! point it becomes read-only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::signal::Signal;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOptions {
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub harness_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub name: String,
    pub index: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub harness_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub signal_count: usize,
    pub duration_ms: Option<u64>,
    pub finalized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub metadata: RecordingMetadata,
    pub signals: Vec<Signal>,
    pub checkpoints: Vec<Checkpoint>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadSignalsQuery {
    pub from_index: Option<usize>,
    pub to_index: Option<usize>,
    pub patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub harness_type: Option<String>,
    pub tags: Vec<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Persistence seam for recordings. Implementations must honor:
///
/// - `append`/`append_batch` on an unknown id fail with
///   [`crate::error::StoreError::RecordingNotFound`]; on a finalized
///   recording they fail with [`crate::error::StoreError::Finalized`].
/// - `list` returns newest-first by `created_at`.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn create(&self, opts: CreateOptions) -> Result<String>;

    async fn append(&self, id: &str, signal: Signal) -> Result<()>;

    async fn append_batch(&self, id: &str, signals: Vec<Signal>) -> Result<()> {
        for signal in signals {
            self.append(id, signal).await?;
        }
        Ok(())
    }

    async fn checkpoint(&self, id: &str, name: &str) -> Result<()>;

    async fn finalize(&self, id: &str, duration_ms: Option<u64>) -> Result<()>;

    async fn load(&self, id: &str) -> Result<Option<Recording>>;

    async fn load_signals(&self, id: &str, query: LoadSignalsQuery) -> Result<Vec<Signal>>;

    async fn list(&self, filter: ListFilter) -> Result<Vec<RecordingMetadata>>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn exists(&self, id: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;
}
