//! # agentflow-store
//!
//! Persistence layer for agentflow: the [`Signal`] type, a glob-style
//! [`pattern`] matcher shared by the bus and the store, the [`SignalStore`]
//! trait describing an append-only recording backend, two reference
//! implementations ([`InMemoryStore`], [`FileStore`]), and a [`Player`] for
//! replaying and folding a recording into a snapshot.
//!
//! Recordings are append-only until [`SignalStore::finalize`] is called;
//! after that every `append`/`append_batch` call fails with
//! [`StoreError::Finalized`].

pub mod error;
pub mod file;
pub mod memory;
pub mod pattern;
pub mod player;
pub mod signal;
pub mod traits;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use pattern::{matches, matches_any, CompiledPattern};
pub use player::{Player, Position, Snapshot};
pub use signal::{DisplayHint, DisplayType, Signal, SignalSource};
pub use traits::{
    Checkpoint, CreateOptions, ListFilter, LoadSignalsQuery, Recording, RecordingMetadata,
    SignalStore,
};
