//! # agentflow-core
//!
//! The execution engine for multi-agent workflows: a signal bus with
//! scoped context propagation, a flow executor that schedules a node/edge
//! graph under retry/timeout/guard policies, a reactive agent layer that
//! turns declared `activateOn` patterns into bus subscriptions, and a
//! harness that composes all of it with optional recording.
//!
//! ## Quick start
//!
//! ```no_run
//! use agentflow_core::{Bus, Signal};
//! use serde_json::json;
//!
//! let bus = Bus::new("session-1", 1000);
//! let _unsub = bus.subscribe(&["node:*"], std::sync::Arc::new(|e: &agentflow_core::EnrichedSignal| {
//!     println!("{} -> {:?}", e.signal.name, e.signal.payload);
//! }));
//! bus.emit(Signal::named("node:start", json!({"id": "a"})));
//! ```
//!
//! ## Module organization
//!
//! - [`signal`]/[`pattern`] (re-exported from `agentflow-store`): the wire
//!   type and the glob matcher shared by the bus and the recording store.
//! - [`context`]: ambient per-task scope.
//! - [`bus`]: pub/sub dispatch and the pause/resume/abort state machine.
//! - [`binding`]: `{{ path }}` substitution and guard evaluation.
//! - [`node`]: the registry of runnable node types.
//! - [`flow`]: the flow definition data model, YAML loading, visualization.
//! - [`executor`]: the scheduler.
//! - [`provider`]/[`agent`]: the reactive agent layer.
//! - [`harness`]: the composition root.
//! - [`cache`]: the opt-in per-node output cache.
//! - [`builtin`]: the `echo`/`log`/`noop` demonstration node kinds.

pub mod agent;
pub mod binding;
pub mod builtin;
pub mod bus;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod flow;
pub mod harness;
pub mod node;
pub mod provider;

pub use agentflow_store::{
    matches, matches_any, CompiledPattern, DisplayHint, DisplayType, Signal, SignalSource,
};

pub use agent::{AgentSpec, ReactiveLayer, SharedState};
pub use binding::{eval_expr, resolve_path, substitute, substitute_value, Condition};
pub use builtin::default_registry;
pub use bus::{AbortOptions, Bus, Cleanup, EnrichedSignal, Handler, PausedSession, SessionStatus};
pub use cache::NodeCache;
pub use config::{ExecutorConfig, HarnessConfig, RetryPolicy};
pub use context::{current, scoped, AgentContext, ContextDelta, PhaseContext, ScopedContext, TaskContext};
pub use error::{CoreError, Result};
pub use executor::{ExecutionReport, Executor, NodeStatus, RunStatus};
pub use flow::{visualize, Edge, FlowDefinition, ForEach, Gate, Node, NodePolicy, VisualizeFormat};
pub use harness::{Harness, HarnessMetrics, HarnessRunResult, RecordingMode, ReplayPacing};
pub use node::{validate_schema, FnNode, NodeContext, NodeKind, NodeRegistry};
pub use provider::{run_cancellable, Provider, SignalSink};
