//! A small LRU cache for node outputs, keyed by `(node_id, input_hash)`.
//! Opt-in per node via `policy.cache`; entirely orthogonal to recording.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use serde_json::Value;

fn hash_input(input: &Value) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.to_string().hash(&mut hasher);
    hasher.finish()
}

struct Entry {
    value: Value,
    order: u64,
}

pub struct NodeCache {
    capacity: usize,
    entries: Mutex<HashMap<(String, u64), Entry>>,
    clock: Mutex<u64>,
}

impl NodeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
            clock: Mutex::new(0),
        }
    }

    fn tick(&self) -> u64 {
        let mut clock = self.clock.lock().unwrap();
        *clock += 1;
        *clock
    }

    pub fn get(&self, node_id: &str, input: &Value) -> Option<Value> {
        let key = (node_id.to_string(), hash_input(input));
        let order = self.tick();
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get_mut(&key)?;
        entry.order = order;
        Some(entry.value.clone())
    }

    pub fn put(&self, node_id: &str, input: &Value, output: Value) {
        let key = (node_id.to_string(), hash_input(input));
        let order = self.tick();
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key, Entry { value: output, order });
        if entries.len() > self.capacity {
            if let Some(evict_key) = entries
                .iter()
                .min_by_key(|(_, e)| e.order)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&evict_key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hit_and_miss() {
        let cache = NodeCache::new(2);
        assert!(cache.get("n1", &json!({"x": 1})).is_none());
        cache.put("n1", &json!({"x": 1}), json!("out"));
        assert_eq!(cache.get("n1", &json!({"x": 1})).unwrap(), json!("out"));
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = NodeCache::new(2);
        cache.put("n1", &json!(1), json!("a"));
        cache.put("n1", &json!(2), json!("b"));
        cache.get("n1", &json!(1));
        cache.put("n1", &json!(3), json!("c"));
        assert!(cache.get("n1", &json!(2)).is_none());
        assert!(cache.get("n1", &json!(1)).is_some());
        assert!(cache.get("n1", &json!(3)).is_some());
    }
}
