//! The reactive agent layer: maps declared `activateOn`/`emits`/`when`
//! agent configs onto bus subscriptions, invoking a [`Provider`] on match
//! and folding its output back into shared state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::binding::{eval_expr, substitute};
use crate::bus::Bus;
use crate::config::ExecutorConfig;
use crate::provider::Provider;

/// One reactive agent's declared behavior.
#[derive(Clone)]
pub struct AgentSpec {
    pub name: String,
    pub prompt: String,
    pub activate_on: Vec<String>,
    pub emits: Vec<String>,
    pub when: Option<String>,
    pub updates: Option<String>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            activate_on: Vec::new(),
            emits: Vec::new(),
            when: None,
            updates: None,
        }
    }

    pub fn activate_on(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.activate_on = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn emits(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.emits = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn when(mut self, expr: impl Into<String>) -> Self {
        self.when = Some(expr.into());
        self
    }

    pub fn updates(mut self, key: impl Into<String>) -> Self {
        self.updates = Some(key.into());
        self
    }
}

/// Shared, reducer-mutated state visible to every agent's guard and
/// prompt-rendering step.
#[derive(Clone)]
pub struct SharedState(Arc<Mutex<Value>>);

impl SharedState {
    pub fn new(initial: Value) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    pub fn get(&self) -> Value {
        self.0.lock().unwrap().clone()
    }

    pub fn set_key(&self, key: &str, value: Value) {
        let mut guard = self.0.lock().unwrap();
        if let Value::Object(map) = &mut *guard {
            map.insert(key.to_string(), value);
        }
    }
}

/// Registers [`AgentSpec`]s against a [`Bus`], driving each through a
/// [`Provider`] on activation and guarding re-entrant activation chains
/// with a per-(agent, causal root) depth counter.
pub struct ReactiveLayer {
    bus: Bus,
    state: SharedState,
    provider: Arc<dyn Provider>,
    config: ExecutorConfig,
    depth: Arc<Mutex<HashMap<(String, String), usize>>>,
    end_when: Option<String>,
    ended: Arc<AtomicUsize>,
}

impl ReactiveLayer {
    pub fn new(bus: Bus, state: SharedState, provider: Arc<dyn Provider>, config: ExecutorConfig) -> Self {
        Self {
            bus,
            state,
            provider,
            config,
            depth: Arc::new(Mutex::new(HashMap::new())),
            end_when: None,
            ended: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn end_when(mut self, expr: impl Into<String>) -> Self {
        self.end_when = Some(expr.into());
        self
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst) > 0
    }

    /// Subscribes `spec` to the bus. Returns the raw unsubscribe thunks so
    /// a harness can tear an agent down independently if needed.
    pub fn register(&self, spec: AgentSpec) -> Vec<Box<dyn FnMut() + Send>> {
        let bus = self.bus.clone();
        let state = self.state.clone();
        let provider = self.provider.clone();
        let depth = self.depth.clone();
        let max_depth = self.config.max_reactivation_depth;
        let end_when = self.end_when.clone();
        let ended = self.ended.clone();
        let spec = Arc::new(spec);
        let patterns: Vec<&str> = spec.activate_on.iter().map(String::as_str).collect();
        let subscribe_bus = bus.clone();

        let handler_spec = spec.clone();
        let handler = Arc::new(move |enriched: &crate::bus::EnrichedSignal| {
            let signal = enriched.signal.clone();
            let root = signal
                .source
                .as_ref()
                .and_then(|s| s.parent.clone())
                .unwrap_or_else(|| signal.id.clone());
            let key = (handler_spec.name.clone(), root.clone());
            {
                let mut guard = depth.lock().unwrap();
                let entry = guard.entry(key.clone()).or_insert(0);
                if *entry >= max_depth {
                    bus.emit_named(
                        "agent:skipped",
                        json!({ "agent": handler_spec.name, "reason": "recursion-cap" }),
                    );
                    return;
                }
                *entry += 1;
            }

            let ctx = json!({ "state": state.get(), "signal": { "payload": signal.payload } });
            if let Some(expr) = &handler_spec.when {
                match eval_expr(expr, &ctx) {
                    Ok(false) => {
                        bus.emit_named(
                            "agent:skipped",
                            json!({ "agent": handler_spec.name, "reason": "guard" }),
                        );
                        return;
                    }
                    Err(_) => return,
                    Ok(true) => {}
                }
            }

            bus.emit_named("agent:activated", json!({ "agent": handler_spec.name }));
            let (rendered, _missing) = substitute(&handler_spec.prompt, &ctx);

            let bus_for_task = bus.clone();
            let state_for_task = state.clone();
            let provider_for_task = provider.clone();
            let spec_for_task = handler_spec.clone();
            let root_for_task = root.clone();
            let end_when_for_task = end_when.clone();
            let ended_for_task = ended.clone();
            let parent_id = signal.id.clone();
            let cancellation = bus.cancellation_token();

            tokio::spawn(async move {
                let sink_bus = bus_for_task.clone();
                let sink_parent = parent_id.clone();
                let sink: crate::provider::SignalSink = Arc::new(move |mut s: agentflow_store::Signal| {
                    if s.source.is_none() {
                        s.source = Some(agentflow_store::SignalSource {
                            agent: Some(spec_for_task.name.clone()),
                            node: None,
                            parent: Some(sink_parent.clone()),
                        });
                    }
                    sink_bus.emit(s);
                });

                match provider_for_task.run(rendered, sink, cancellation).await {
                    Ok(output) => {
                        for name in &spec_for_task.emits {
                            bus_for_task.emit(
                                agentflow_store::Signal::named(name.clone(), output.clone()).with_source(
                                    agentflow_store::SignalSource {
                                        agent: Some(spec_for_task.name.clone()),
                                        node: None,
                                        parent: Some(root_for_task.clone()),
                                    },
                                ),
                            );
                        }
                        if let Some(key) = &spec_for_task.updates {
                            state_for_task.set_key(key, output);
                        }
                        if let Some(expr) = &end_when_for_task {
                            let ctx = json!({ "state": state_for_task.get() });
                            if eval_expr(expr, &ctx).unwrap_or(false) {
                                ended_for_task.fetch_add(1, Ordering::SeqCst);
                                bus_for_task.emit_named("harness:end", json!({}));
                            }
                        }
                    }
                    Err(err) => {
                        bus_for_task.emit_named(
                            "agent:error",
                            json!({ "agent": spec_for_task.name, "error": err.to_string() }),
                        );
                    }
                }
            });
        });

        vec![Box::new(subscribe_bus.subscribe(&patterns, handler))]
    }
}
