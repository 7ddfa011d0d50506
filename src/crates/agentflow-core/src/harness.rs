//! The composition root: wires a bus, a flow (or reactive agents), a
//! recording mode, and attachments, and exposes a single `run()`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentflow_store::{CreateOptions, Recording, Signal, SignalStore};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::agent::{AgentSpec, ReactiveLayer, SharedState};
use crate::bus::{Attachment, Bus};
use crate::config::HarnessConfig;
use crate::context::{ContextDelta, PhaseContext, TaskContext};
use crate::error::{CoreError, Result};
use crate::executor::{Executor, ExecutionReport, RunStatus};
use crate::flow::FlowDefinition;
use crate::node::NodeRegistry;
use crate::provider::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingMode {
    #[default]
    Live,
    Record,
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayPacing {
    Literal,
    AsFastAsPossible,
    MonotonicStep,
}

impl Default for ReplayPacing {
    fn default() -> Self {
        ReplayPacing::AsFastAsPossible
    }
}

#[derive(Debug, Clone)]
pub struct HarnessMetrics {
    pub duration_ms: u64,
    pub activations: usize,
}

#[derive(Debug, Clone)]
pub struct HarnessRunResult {
    pub status: RunStatus,
    pub outputs: HashMap<String, Value>,
    pub signals: Vec<Signal>,
    pub metrics: HarnessMetrics,
    pub terminated_early: bool,
    pub recording_id: Option<String>,
}

pub struct Harness {
    bus: Bus,
    config: HarnessConfig,
    store: Option<Arc<dyn SignalStore>>,
    mode: RecordingMode,
    replay_pacing: ReplayPacing,
    recording_id: Option<String>,
    create_options: CreateOptions,
}

impl Harness {
    pub fn new(session_id: impl Into<String>, config: HarnessConfig) -> Self {
        let bus = Bus::new(session_id, config.executor.max_history);
        Self {
            bus,
            config,
            store: None,
            mode: RecordingMode::Live,
            replay_pacing: ReplayPacing::default(),
            recording_id: None,
            create_options: CreateOptions::default(),
        }
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn attach(self, attachment: Attachment) -> Self {
        self.bus.attach(attachment);
        self
    }

    pub fn record(mut self, store: Arc<dyn SignalStore>) -> Self {
        self.store = Some(store);
        self.mode = RecordingMode::Record;
        self
    }

    /// Metadata attached to the recording created in [`RecordingMode::Record`].
    pub fn create_options(mut self, options: CreateOptions) -> Self {
        self.create_options = options;
        self
    }

    pub fn replay(mut self, store: Arc<dyn SignalStore>, recording_id: impl Into<String>) -> Self {
        self.store = Some(store);
        self.mode = RecordingMode::Replay;
        self.recording_id = Some(recording_id.into());
        self
    }

    pub fn pacing(mut self, pacing: ReplayPacing) -> Self {
        self.replay_pacing = pacing;
        self
    }

    /// Run a [`FlowDefinition`] to completion (or pause/abort/failure).
    pub async fn run_flow(&mut self, flow: FlowDefinition, registry: Arc<NodeRegistry>, input: Value) -> Result<HarnessRunResult> {
        let start = Instant::now();
        let activations = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count = activations.clone();
        let mut unsub = self.bus.subscribe(
            &["**"],
            Arc::new(move |_e| {
                count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
        );

        let recording_id = match self.mode {
            RecordingMode::Record => {
                let store = self.store.clone().ok_or_else(|| CoreError::validation("record mode requires a store"))?;
                let id = store.create(self.create_options.clone()).await?;
                self.recording_id = Some(id.clone());
                Some(id)
            }
            RecordingMode::Replay | RecordingMode::Live => self.recording_id.clone(),
        };

        let recorder = if self.mode == RecordingMode::Record {
            let store = self.store.clone();
            let id = recording_id.clone();
            Some(self.bus.subscribe(
                &["**"],
                Arc::new(move |e: &crate::bus::EnrichedSignal| {
                    if let (Some(store), Some(id)) = (store.clone(), id.clone()) {
                        let signal = e.signal.clone();
                        tokio::spawn(async move {
                            let _ = store.append(&id, signal).await;
                        });
                    }
                }),
            ))
        } else {
            None
        };

        self.bus.start();
        self.bus.emit_named("harness:start", json!({}));

        let report = if self.mode == RecordingMode::Replay {
            self.run_replay(&flow).await?
        } else {
            let executor = Executor::new(flow, registry, self.bus.clone(), self.config.executor.clone());
            let resume = self.bus.paused_session().map(|p| {
                serde_json::from_value::<HashMap<String, Value>>(p.outputs).unwrap_or_default()
            }).unwrap_or_default();
            executor.run(input, resume).await?
        };

        self.bus.emit_named("harness:end", json!({}));
        self.bus.mark_complete();
        self.bus.stop();

        if let Some(id) = &recording_id {
            if self.mode == RecordingMode::Record {
                if let Some(store) = &self.store {
                    store.finalize(id, Some(start.elapsed().as_millis() as u64)).await?;
                }
            }
        }

        unsub();
        if let Some(mut recorder_unsub) = recorder {
            recorder_unsub();
        }

        Ok(HarnessRunResult {
            status: report.status,
            outputs: report.outputs,
            signals: self.bus.history(),
            metrics: HarnessMetrics {
                duration_ms: start.elapsed().as_millis() as u64,
                activations: activations.load(std::sync::atomic::Ordering::SeqCst),
            },
            terminated_early: false,
            recording_id,
        })
    }

    async fn run_replay(&self, _flow: &FlowDefinition) -> Result<ExecutionReport> {
        let store = self.store.clone().ok_or_else(|| CoreError::validation("replay mode requires a store"))?;
        let id = self
            .recording_id
            .clone()
            .ok_or_else(|| CoreError::validation("replay mode requires a recording id"))?;
        let recording: Recording = store
            .load(&id)
            .await?
            .ok_or_else(|| CoreError::validation(format!("recording {id} not found")))?;

        for signal in recording.signals {
            if self.replay_pacing == ReplayPacing::Literal {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
            self.bus.emit(signal);
        }

        Ok(ExecutionReport {
            status: RunStatus::Complete,
            outputs: HashMap::new(),
            node_status: HashMap::new(),
            loop_counters: HashMap::new(),
        })
    }

    /// Runs a set of reactive agents against the bus: registers each
    /// `spec` through a [`ReactiveLayer`], emits `triggers` to kick the
    /// first activation, then waits for `end_when` to fire (via the
    /// layer's own `has_ended()`) or for `max_duration_ms` to elapse,
    /// whichever comes first. Mirrors [`Harness::run_flow`]'s recording
    /// and lifecycle-signal framing.
    pub async fn run_agents(
        &mut self,
        provider: Arc<dyn Provider>,
        specs: Vec<AgentSpec>,
        initial_state: Value,
        end_when: Option<String>,
        triggers: Vec<Signal>,
        max_duration_ms: Option<u64>,
    ) -> Result<HarnessRunResult> {
        let start = Instant::now();
        let activations = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count = activations.clone();
        let mut unsub = self.bus.subscribe(
            &["**"],
            Arc::new(move |_e| {
                count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
        );

        let recording_id = match self.mode {
            RecordingMode::Record => {
                let store = self.store.clone().ok_or_else(|| CoreError::validation("record mode requires a store"))?;
                let id = store.create(self.create_options.clone()).await?;
                self.recording_id = Some(id.clone());
                Some(id)
            }
            RecordingMode::Replay | RecordingMode::Live => self.recording_id.clone(),
        };

        let recorder = if self.mode == RecordingMode::Record {
            let store = self.store.clone();
            let id = recording_id.clone();
            Some(self.bus.subscribe(
                &["**"],
                Arc::new(move |e: &crate::bus::EnrichedSignal| {
                    if let (Some(store), Some(id)) = (store.clone(), id.clone()) {
                        let signal = e.signal.clone();
                        tokio::spawn(async move {
                            let _ = store.append(&id, signal).await;
                        });
                    }
                }),
            ))
        } else {
            None
        };

        self.bus.start();
        self.bus.emit_named("harness:start", json!({}));

        let state = SharedState::new(initial_state);
        let mut layer = ReactiveLayer::new(self.bus.clone(), state.clone(), provider, self.config.executor.clone());
        if let Some(expr) = &end_when {
            layer = layer.end_when(expr.clone());
        }

        let mut agent_unsubs: Vec<Box<dyn FnMut() + Send>> = Vec::new();
        for spec in specs {
            agent_unsubs.extend(layer.register(spec));
        }

        for trigger in triggers {
            self.bus.emit(trigger);
        }

        let poll_interval = Duration::from_millis(10);
        let deadline = max_duration_ms.map(|ms| start + Duration::from_millis(ms));
        let mut terminated_early = false;
        loop {
            if layer.has_ended() {
                terminated_early = true;
                break;
            }
            if self.bus.status() != crate::bus::SessionStatus::Running {
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
            }
            tokio::time::sleep(poll_interval).await;
        }

        let status = match self.bus.status() {
            crate::bus::SessionStatus::Paused => RunStatus::Paused,
            crate::bus::SessionStatus::Aborted => RunStatus::Aborted,
            crate::bus::SessionStatus::Failed => RunStatus::Failed,
            _ => RunStatus::Complete,
        };

        self.bus.emit_named("harness:end", json!({}));
        self.bus.mark_complete();
        self.bus.stop();

        if let Some(id) = &recording_id {
            if self.mode == RecordingMode::Record {
                if let Some(store) = &self.store {
                    store.finalize(id, Some(start.elapsed().as_millis() as u64)).await?;
                }
            }
        }

        for mut agent_unsub in agent_unsubs {
            agent_unsub();
        }
        unsub();
        if let Some(mut recorder_unsub) = recorder {
            recorder_unsub();
        }

        let mut outputs = HashMap::new();
        outputs.insert("state".to_string(), state.get());

        Ok(HarnessRunResult {
            status,
            outputs,
            signals: self.bus.history(),
            metrics: HarnessMetrics {
                duration_ms: start.elapsed().as_millis() as u64,
                activations: activations.load(std::sync::atomic::Ordering::SeqCst),
            },
            terminated_early,
            recording_id,
        })
    }

    /// Scope a named phase: emits `phase:start` before `body`, then
    /// `phase:complete`/`phase:failed` after.
    pub async fn phase<F, Fut, T>(&self, name: &str, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let bus = self.bus.clone();
        let name_owned = name.to_string();
        let delta = ContextDelta {
            phase: Some(PhaseContext { name: name_owned.clone() }),
            ..Default::default()
        };
        bus.emit_named("phase:start", json!({ "name": name_owned }));
        let start = Instant::now();
        let result = self.bus.scoped(delta, body).await;
        match result {
            Ok(value) => {
                bus.emit_named(
                    "phase:complete",
                    json!({ "name": name_owned, "durationMs": start.elapsed().as_millis() as u64 }),
                );
                Ok(value)
            }
            Err(err) => {
                bus.emit_named("phase:failed", json!({ "name": name_owned, "error": err.to_string() }));
                Err(err)
            }
        }
    }

    pub async fn task<F, Fut, T>(&self, id: &str, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let bus = self.bus.clone();
        let id_owned = id.to_string();
        let delta = ContextDelta {
            task: Some(TaskContext { id: id_owned.clone() }),
            ..Default::default()
        };
        bus.emit_named("task:start", json!({ "id": id_owned }));
        let result = self.bus.scoped(delta, body).await;
        match &result {
            Ok(_) => bus.emit_named("task:complete", json!({ "id": id_owned })),
            Err(err) => bus.emit_named("task:failed", json!({ "id": id_owned, "error": err.to_string() })),
        }
        result
    }

    /// Retry `body` up to `max_attempts`, honoring `should_retry`.
    pub async fn retry<F, Fut, T>(
        &self,
        name: &str,
        max_attempts: usize,
        should_retry: impl Fn(&CoreError) -> bool,
        mut body: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.bus.emit_named("retry:start", json!({ "name": name }));
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            self.bus.emit_named("retry:attempt", json!({ "name": name, "attempt": attempt }));
            match body().await {
                Ok(value) => {
                    self.bus.emit_named("retry:success", json!({ "name": name, "attempt": attempt }));
                    return Ok(value);
                }
                Err(err) if attempt < max_attempts && should_retry(&err) => {
                    let backoff_ms = 200u64.saturating_mul(1u64 << attempt.min(10));
                    self.bus.emit_named(
                        "retry:backoff",
                        json!({ "name": name, "attempt": attempt, "backoffMs": backoff_ms }),
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                }
                Err(err) => {
                    self.bus.emit_named(
                        "retry:failure",
                        json!({ "name": name, "attempt": attempt, "error": err.to_string() }),
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Run `items` concurrently through `body`, isolating each item's
    /// scope (a distinct task id derived from its index).
    pub async fn parallel<T, F, Fut, R>(&self, name: &str, items: Vec<T>, body: F) -> Result<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<R>> + Send,
    {
        self.bus.emit_named("parallel:start", json!({ "name": name, "count": items.len() }));
        let body = Arc::new(body);
        let bus = self.bus.clone();
        let name_owned = name.to_string();
        let mut handles = Vec::new();
        for (idx, item) in items.into_iter().enumerate() {
            let body = body.clone();
            let bus = bus.clone();
            let name_owned = name_owned.clone();
            let task_id = format!("{name_owned}:{idx}");
            handles.push(tokio::spawn(async move {
                let delta = ContextDelta {
                    task: Some(TaskContext { id: task_id.clone() }),
                    ..Default::default()
                };
                let base = crate::context::current(bus.session_id());
                let result = crate::context::scoped(&base, delta, || body(item)).await;
                bus.emit_named(
                    "parallel:item:complete",
                    json!({ "name": name_owned, "index": idx, "ok": result.is_ok() }),
                );
                result
            }));
        }
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.await.map_err(|e| CoreError::Custom(format!("parallel task panicked: {e}")))?);
        }
        self.bus.emit_named("parallel:complete", json!({ "name": name }));
        out.into_iter().collect()
    }
}

/// Build a fresh session id for a new harness instance.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}
