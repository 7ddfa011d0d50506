//! A deterministic [`Provider`] test double. Useful for flow/agent tests
//! and for exercising the harness without a network dependency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentflow_core::{CoreError, Provider, Result, SignalSink};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use agentflow_store::Signal;

use crate::error::ProviderError;

/// One scripted response: the text streamed as `provider:text:delta`
/// chunks followed by the final value `run` resolves to.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub chunks: Vec<String>,
    pub output: Value,
}

impl ScriptedResponse {
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            output: json!({ "text": text.clone() }),
            chunks: vec![text],
        }
    }
}

/// Replays a fixed script of responses in order, looping once exhausted.
/// Every call is recorded for assertions in tests that use this provider.
pub struct MockProvider {
    script: Vec<ScriptedResponse>,
    calls: Arc<Mutex<Vec<String>>>,
    cursor: AtomicUsize,
    chunk_delay: Option<Duration>,
}

impl MockProvider {
    pub fn new(script: Vec<ScriptedResponse>) -> Self {
        Self {
            script,
            calls: Arc::new(Mutex::new(Vec::new())),
            cursor: AtomicUsize::new(0),
            chunk_delay: None,
        }
    }

    /// Echoes the prompt back as a single response value.
    pub fn echo() -> Self {
        Self::new(vec![])
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn run(&self, prompt: String, sink: SignalSink, cancellation: CancellationToken) -> Result<Value> {
        if cancellation.is_cancelled() {
            return Err(CoreError::cancelled("mock provider cancelled before start"));
        }
        self.calls.lock().unwrap().push(prompt.clone());

        if self.script.is_empty() {
            sink(Signal::named("provider:text:delta", json!({ "delta": prompt.clone() })));
            return Ok(json!({ "text": prompt }));
        }

        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) % self.script.len();
        let response = self.script[idx].clone();

        for chunk in &response.chunks {
            if cancellation.is_cancelled() {
                return Err(CoreError::cancelled("mock provider cancelled mid-stream"));
            }
            if let Some(delay) = self.chunk_delay {
                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => {
                        return Err(CoreError::cancelled("mock provider cancelled mid-stream"));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            sink(Signal::named("provider:text:delta", json!({ "delta": chunk })));
        }

        Ok(response.output)
    }
}

/// A [`Provider`] that always fails, for exercising retry/error paths.
pub struct FailingProvider {
    pub message: String,
}

#[async_trait]
impl Provider for FailingProvider {
    async fn run(&self, _prompt: String, _sink: SignalSink, _cancellation: CancellationToken) -> Result<Value> {
        Err(ProviderError::Other(self.message.clone()).into())
    }
}
