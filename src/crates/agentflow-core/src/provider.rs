//! The provider seam: whatever turns a rendered prompt into a stream of
//! signals and a final value. Concrete network adapters are out of scope
//! for this crate; [`agentflow_providers`] ships the trait's lone
//! reference implementation, a deterministic mock.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use agentflow_store::Signal;

use crate::error::{CoreError, Result};

/// Callback a [`Provider`] uses to stream intermediate signals (token
/// deltas, tool calls, ...) back onto the bus while it runs.
pub type SignalSink = Arc<dyn Fn(Signal) + Send + Sync>;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Run the provider against a rendered prompt, streaming intermediate
    /// signals through `sink`, and return the final output value.
    ///
    /// `cancellation` is checked between yielded items: a provider that
    /// streams in chunks should race each chunk against
    /// `cancellation.cancelled()` and bail out with [`CoreError::Cancelled`]
    /// once it fires, rather than running the whole prompt to completion.
    async fn run(&self, prompt: String, sink: SignalSink, cancellation: CancellationToken) -> Result<Value>;
}

/// Runs `fut` to completion unless `cancellation` fires first, in which
/// case the future is dropped and a [`CoreError::Cancelled`] is returned.
/// A small helper for providers that don't otherwise need to poll the
/// token between individual chunks.
pub async fn run_cancellable<F, T>(cancellation: &CancellationToken, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(CoreError::cancelled("provider run cancelled")),
        result = fut => result,
    }
}
