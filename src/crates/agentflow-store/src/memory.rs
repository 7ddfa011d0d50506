//! In-process [`SignalStore`] backed by a `Mutex<HashMap<...>>`. Data does
//! not survive process restart; intended for tests, `live` harness runs,
//! and short-lived CLI invocations.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::pattern::matches_any;
use crate::signal::Signal;
use crate::traits::{
    Checkpoint, CreateOptions, ListFilter, LoadSignalsQuery, Recording, RecordingMetadata,
    SignalStore,
};

struct Entry {
    metadata: RecordingMetadata,
    signals: Vec<Signal>,
    checkpoints: Vec<Checkpoint>,
}

#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for InMemoryStore {
    async fn create(&self, opts: CreateOptions) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let metadata = RecordingMetadata {
            id: id.clone(),
            name: opts.name,
            tags: opts.tags,
            harness_type: opts.harness_type,
            created_at: Utc::now(),
            signal_count: 0,
            duration_ms: None,
            finalized: false,
        };
        self.entries.lock().unwrap().insert(
            id.clone(),
            Entry {
                metadata,
                signals: Vec::new(),
                checkpoints: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn append(&self, id: &str, signal: Signal) -> Result<()> {
        let mut guard = self.entries.lock().unwrap();
        let entry = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::RecordingNotFound(id.to_string()))?;
        if entry.metadata.finalized {
            return Err(StoreError::Finalized(id.to_string()));
        }
        entry.signals.push(signal);
        entry.metadata.signal_count = entry.signals.len();
        Ok(())
    }

    async fn checkpoint(&self, id: &str, name: &str) -> Result<()> {
        let mut guard = self.entries.lock().unwrap();
        let entry = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::RecordingNotFound(id.to_string()))?;
        entry.checkpoints.push(Checkpoint {
            name: name.to_string(),
            index: entry.signals.len(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn finalize(&self, id: &str, duration_ms: Option<u64>) -> Result<()> {
        let mut guard = self.entries.lock().unwrap();
        let entry = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::RecordingNotFound(id.to_string()))?;
        entry.metadata.finalized = true;
        entry.metadata.duration_ms = duration_ms;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Recording>> {
        let guard = self.entries.lock().unwrap();
        Ok(guard.get(id).map(|e| Recording {
            metadata: e.metadata.clone(),
            signals: e.signals.clone(),
            checkpoints: e.checkpoints.clone(),
        }))
    }

    async fn load_signals(&self, id: &str, query: LoadSignalsQuery) -> Result<Vec<Signal>> {
        let guard = self.entries.lock().unwrap();
        let entry = guard
            .get(id)
            .ok_or_else(|| StoreError::RecordingNotFound(id.to_string()))?;
        let from = query.from_index.unwrap_or(0);
        let to = query.to_index.unwrap_or(entry.signals.len());
        let slice = entry.signals.get(from..to.min(entry.signals.len())).unwrap_or(&[]);
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
        let guard = self.entries.lock().unwrap();
        let mut items: Vec<RecordingMetadata> = guard
            .values()
            .filter(|e| {
                filter
                    .harness_type
                    .as_ref()
                    .map(|t| e.metadata.harness_type.as_deref() == Some(t.as_str()))
                    .unwrap_or(true)
            })
            .filter(|e| {
                filter
                    .tags
                    .iter()
                    .all(|t| e.metadata.tags.iter().any(|et| et == t))
            })
            .map(|e| e.metadata.clone())
            .collect();
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
        self.entries.lock().unwrap().remove(id);
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.entries.lock().unwrap().contains_key(id))
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sig(name: &str, i: u64) -> Signal {
        Signal::new(name, json!({"i": i}), i)
    }

    #[tokio::test]
    async fn append_to_unknown_recording_fails() {
        let store = InMemoryStore::new();
        let err = store.append("nope", sig("a", 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::RecordingNotFound(_)));
    }

    #[tokio::test]
    async fn append_after_finalize_fails() {
        let store = InMemoryStore::new();
        let id = store.create(CreateOptions::default()).await.unwrap();
        store.append(&id, sig("a", 0)).await.unwrap();
        store.finalize(&id, Some(10)).await.unwrap();
        let err = store.append(&id, sig("b", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Finalized(_)));
        let loaded = store.load(&id).await.unwrap().unwrap();
        assert!(loaded.metadata.finalized);
    }

    #[tokio::test]
    async fn append_batch_matches_sequential_appends() {
        let a = InMemoryStore::new();
        let b = InMemoryStore::new();
        let id_a = a.create(CreateOptions::default()).await.unwrap();
        let id_b = b.create(CreateOptions::default()).await.unwrap();
        let sigs = vec![sig("a", 0), sig("b", 1), sig("c", 2)];
        for s in sigs.clone() {
            a.append(&id_a, s).await.unwrap();
        }
        b.append_batch(&id_b, sigs).await.unwrap();
        let la = a.load(&id_a).await.unwrap().unwrap();
        let lb = b.load(&id_b).await.unwrap().unwrap();
        assert_eq!(la.signals.len(), lb.signals.len());
        for (x, y) in la.signals.iter().zip(lb.signals.iter()) {
            assert_eq!(x.name, y.name);
            assert_eq!(x.payload, y.payload);
        }
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = InMemoryStore::new();
        let id1 = store.create(CreateOptions::default()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let id2 = store.create(CreateOptions::default()).await.unwrap();
        let list = store.list(ListFilter::default()).await.unwrap();
        assert_eq!(list[0].id, id2);
        assert_eq!(list[1].id, id1);
    }

    #[tokio::test]
    async fn load_signals_filters_by_pattern() {
        let store = InMemoryStore::new();
        let id = store.create(CreateOptions::default()).await.unwrap();
        store.append(&id, sig("node:start", 0)).await.unwrap();
        store.append(&id, sig("node:complete", 1)).await.unwrap();
        store.append(&id, sig("agent:activated", 2)).await.unwrap();
        let filtered = store
            .load_signals(
                &id,
                LoadSignalsQuery {
                    patterns: Some(vec!["node:*".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 2);
    }
}
