//! File-backed [`SignalStore`]: one NDJSON file per recording plus a
//! sidecar `<id>.meta.json`. Simple enough to audit by hand, durable across
//! process restarts, not meant to scale past local development use.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::pattern::matches_any;
use crate::signal::Signal;
use crate::traits::{
    Checkpoint, CreateOptions, ListFilter, LoadSignalsQuery, Recording, RecordingMetadata,
    SignalStore,
};

pub struct FileStore {
    root: PathBuf,
    // Serializes writes per recording id so NDJSON lines never interleave.
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn signals_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.ndjson"))
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.meta.json"))
    }

    async fn read_meta(&self, id: &str) -> Result<RecordingMetadata> {
        let bytes = fs::read(self.meta_path(id))
            .await
            .map_err(|_| StoreError::RecordingNotFound(id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_meta(&self, meta: &RecordingMetadata) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(meta)?;
        fs::write(self.meta_path(&meta.id), bytes).await?;
        Ok(())
    }

    async fn read_signals(&self, id: &str) -> Result<Vec<Signal>> {
        let path = self.signals_path(id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(path).await?;
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(StoreError::from))
            .collect()
    }

    fn checkpoints_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.checkpoints.json"))
    }

    async fn read_checkpoints(&self, id: &str) -> Result<Vec<Checkpoint>> {
        let path = self.checkpoints_path(id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_checkpoints(&self, id: &str, checkpoints: &[Checkpoint]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(checkpoints)?;
        fs::write(self.checkpoints_path(id), bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl SignalStore for FileStore {
    async fn create(&self, opts: CreateOptions) -> Result<String> {
        fs::create_dir_all(&self.root).await?;
        let id = Uuid::new_v4().to_string();
        tracing::debug!(recording_id = %id, root = %self.root.display(), "creating recording");
        let meta = RecordingMetadata {
            id: id.clone(),
            name: opts.name,
            tags: opts.tags,
            harness_type: opts.harness_type,
            created_at: Utc::now(),
            signal_count: 0,
            duration_ms: None,
            finalized: false,
        };
        self.write_meta(&meta).await?;
        fs::write(self.signals_path(&id), b"").await?;
        self.locks
            .lock()
            .unwrap()
            .insert(id.clone(), Arc::new(AsyncMutex::new(())));
        Ok(id)
    }

    async fn append(&self, id: &str, signal: Signal) -> Result<()> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut meta = self.read_meta(id).await?;
        if meta.finalized {
            return Err(StoreError::Finalized(id.to_string()));
        }
        let line = serde_json::to_string(&signal)?;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(self.signals_path(id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        meta.signal_count += 1;
        self.write_meta(&meta).await?;
        Ok(())
    }

    async fn checkpoint(&self, id: &str, name: &str) -> Result<()> {
        let meta = self.read_meta(id).await?;
        let mut checkpoints = self.read_checkpoints(id).await?;
        checkpoints.push(Checkpoint {
            name: name.to_string(),
            index: meta.signal_count,
            timestamp: Utc::now(),
        });
        self.write_checkpoints(id, &checkpoints).await
    }

    async fn finalize(&self, id: &str, duration_ms: Option<u64>) -> Result<()> {
        let mut meta = self.read_meta(id).await?;
        meta.finalized = true;
        meta.duration_ms = duration_ms;
        self.write_meta(&meta).await
    }

    async fn load(&self, id: &str) -> Result<Option<Recording>> {
        if !self.meta_path(id).exists() {
            return Ok(None);
        }
        let metadata = self.read_meta(id).await?;
        let signals = self.read_signals(id).await?;
        let checkpoints = self.read_checkpoints(id).await?;
        Ok(Some(Recording {
            metadata,
            signals,
            checkpoints,
        }))
    }

    async fn load_signals(&self, id: &str, query: LoadSignalsQuery) -> Result<Vec<Signal>> {
        if !self.meta_path(id).exists() {
            return Err(StoreError::RecordingNotFound(id.to_string()));
        }
        let signals = self.read_signals(id).await?;
        let from = query.from_index.unwrap_or(0);
        let to = query.to_index.unwrap_or(signals.len());
        let slice = signals.get(from..to.min(signals.len())).unwrap_or(&[]);
        let filtered = match &query.patterns {
            Some(patterns) => slice
                .iter()
                .filter(|s| matches_any(patterns, &s.name))
                .cloned()
                .collect(),
            None => slice.to_vec(),
        };
        Ok(filtered)
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<RecordingMetadata>> {
        if !Path::new(&self.root).exists() {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&self.root).await?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            if !name.ends_with(".meta") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            let meta: RecordingMetadata = serde_json::from_slice(&bytes)?;
            if let Some(t) = &filter.harness_type {
                if meta.harness_type.as_deref() != Some(t.as_str()) {
                    continue;
                }
            }
            if !filter.tags.iter().all(|t| meta.tags.iter().any(|mt| mt == t)) {
                continue;
            }
            items.push(meta);
        }
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(offset) = filter.offset {
            items = items.into_iter().skip(offset).collect();
        }
        if let Some(limit) = filter.limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        for path in [self.signals_path(id), self.meta_path(id), self.checkpoints_path(id)] {
            if let Err(err) = fs::remove_file(&path).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), %err, "failed to remove recording file");
                }
            }
        }
        self.locks.lock().unwrap().remove(id);
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.meta_path(id).exists())
    }

    async fn clear(&self) -> Result<()> {
        if Path::new(&self.root).exists() {
            let mut entries = fs::read_dir(&self.root).await?;
            while let Some(entry) = entries.next_entry().await? {
                let _ = fs::remove_file(entry.path()).await;
            }
        }
        self.locks.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn roundtrip_append_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let id = store.create(CreateOptions::default()).await.unwrap();
        store
            .append(&id, Signal::new("node:start", json!({"n": 1}), 1))
            .await
            .unwrap();
        store
            .append(&id, Signal::new("node:complete", json!({"n": 2}), 2))
            .await
            .unwrap();
        store.finalize(&id, Some(5)).await.unwrap();

        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.signals.len(), 2);
        assert!(loaded.metadata.finalized);
        assert_eq!(loaded.metadata.duration_ms, Some(5));
    }

    #[tokio::test]
    async fn append_after_finalize_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let id = store.create(CreateOptions::default()).await.unwrap();
        store.finalize(&id, None).await.unwrap();
        let err = store
            .append(&id, Signal::new("x", json!(null), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Finalized(_)));
    }
}
