//! Reference [`agentflow_core::Provider`] implementations: a deterministic
//! mock for tests, and nothing network-facing. Real adapters (Anthropic,
//! OpenAI, Ollama, ...) live outside this crate's scope.

pub mod error;
pub mod mock;

pub use error::{ProviderError, Result};
pub use mock::{FailingProvider, MockProvider, ScriptedResponse};
