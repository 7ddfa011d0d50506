//! Runtime configuration. Every field has a sensible default; callers
//! override via builder methods or by deserializing a `toml`/`serde` file
//! in the CLI layer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 200,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff (doubling), capped at `max_backoff_ms`.
    pub fn backoff_for(&self, attempt: usize) -> u64 {
        let raw = self.backoff_ms.saturating_mul(1u64 << attempt.min(20));
        raw.min(self.max_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound on signals retained in a bus's in-memory history.
    pub max_history: usize,
    /// Upper bound on nodes the scheduler runs concurrently.
    pub max_concurrent_nodes: usize,
    /// Applied to a node when it declares no explicit `policy.retry`.
    pub default_retry: RetryPolicy,
    /// Applied to a node when it declares no explicit `policy.timeoutMs`.
    pub default_timeout_ms: Option<u64>,
    /// Recursion depth cap for reactive agent re-activation chains.
    pub max_reactivation_depth: usize,
    /// Upper bound on entries held in the executor's per-node output cache
    /// (see `policy.cache`).
    pub node_cache_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_history: 10_000,
            max_concurrent_nodes: 16,
            default_retry: RetryPolicy::default(),
            default_timeout_ms: None,
            max_reactivation_depth: 8,
            node_cache_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HarnessConfig {
    pub executor: ExecutorConfig,
}
