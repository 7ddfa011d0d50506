//! The flow scheduler: builds readiness from the edge graph, runs ready
//! nodes (respecting guards, retry, timeout, schema validation, caching,
//! and `forEach` fan-out), and cooperates with the bus's pause/resume/abort
//! state machine.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::bus::Bus;
use crate::cache::NodeCache;
use crate::config::ExecutorConfig;
use crate::error::{CoreError, Result};
use crate::flow::{Edge, FlowDefinition, ForEach, Gate, NodePolicy};
use crate::node::{validate_schema, NodeContext, NodeKind, NodeRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Pending,
    Running,
    Done,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,
    Paused,
    Aborted,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub status: RunStatus,
    pub outputs: HashMap<String, Value>,
    pub node_status: HashMap<String, NodeStatus>,
    pub loop_counters: HashMap<String, usize>,
}

pub struct Executor {
    flow: FlowDefinition,
    registry: Arc<NodeRegistry>,
    bus: Bus,
    config: ExecutorConfig,
    cache: Arc<NodeCache>,
}

struct RunState {
    outputs: HashMap<String, Value>,
    node_status: HashMap<String, NodeStatus>,
    edge_fired: HashSet<usize>,
    loop_counters: HashMap<String, usize>,
}

/// Runs a single node attempt loop under its retry/timeout policy,
/// validating declared input/output schemas and consulting the shared
/// output cache when `policy.cache` is set. Free-standing (rather than a
/// method) so it can be driven both from a spawned task in the main
/// scheduling loop and inline from `forEach` fan-out.
async fn run_with_policy(
    kind: Arc<dyn NodeKind>,
    bus: Bus,
    node_id: String,
    cancellation: CancellationToken,
    policy: NodePolicy,
    config: ExecutorConfig,
    input: Value,
    cache: Arc<NodeCache>,
) -> (Result<Value>, u64) {
    let start = std::time::Instant::now();

    if policy.cache {
        if let Some(cached) = cache.get(&node_id, &input) {
            bus.emit_named("node:cache-hit", json!({ "nodeId": node_id }));
            return (Ok(cached), start.elapsed().as_millis() as u64);
        }
    }

    let retry = policy.retry.clone().unwrap_or_else(|| config.default_retry.clone());
    let timeout_ms = policy.timeout_ms.or(config.default_timeout_ms);

    let mut attempt = 0usize;
    let result = loop {
        let node_ctx = NodeContext {
            bus: bus.clone(),
            node_id: node_id.clone(),
            cancellation: cancellation.clone(),
        };
        let kind = kind.clone();
        let attempt_node_id = node_id.clone();
        let input = input.clone();
        let run_fut = async move {
            if let Some(schema) = kind.input_schema() {
                validate_schema(schema, &input, "input")
                    .map_err(|e| CoreError::node(attempt_node_id.clone(), e))?;
            }
            let output = kind.run(&node_ctx, input).await?;
            if let Some(schema) = kind.output_schema() {
                validate_schema(schema, &output, "output")
                    .map_err(|e| CoreError::node(attempt_node_id.clone(), e))?;
            }
            Ok(output)
        };
        let attempt_result = match timeout_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), run_fut).await {
                Ok(r) => r,
                Err(_) => Err(CoreError::Timeout {
                    operation: node_id.clone(),
                    duration_ms: ms,
                }),
            },
            None => run_fut.await,
        };
        match attempt_result {
            Ok(value) => break Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= retry.max_attempts {
                    break Err(err);
                }
                tokio::time::sleep(Duration::from_millis(retry.backoff_for(attempt))).await;
            }
        }
    };

    if policy.cache {
        if let Ok(value) = &result {
            cache.put(&node_id, &input, value.clone());
        }
    }

    (result, start.elapsed().as_millis() as u64)
}

impl Executor {
    pub fn new(flow: FlowDefinition, registry: Arc<NodeRegistry>, bus: Bus, config: ExecutorConfig) -> Self {
        let cache = Arc::new(NodeCache::new(config.node_cache_capacity.max(1)));
        Self {
            flow,
            registry,
            bus,
            config,
            cache,
        }
    }

    fn binding_ctx(&self, flow_input: &Value, state: &Value, outputs: &HashMap<String, Value>) -> Value {
        let mut root = serde_json::Map::new();
        root.insert("flow".into(), json!({ "input": flow_input }));
        root.insert("state".into(), state.clone());
        for (k, v) in outputs {
            root.insert(k.clone(), v.clone());
        }
        Value::Object(root)
    }

    fn node_ready(&self, node_id: &str, state: &RunState) -> bool {
        let inbound = self.flow.inbound_edges(node_id);
        if inbound.is_empty() {
            return true;
        }
        let edge_index = |e: &Edge| self.flow.edges.iter().position(|x| std::ptr::eq(x, e)).unwrap();
        let all_fired = inbound
            .iter()
            .filter(|e| e.gate == Gate::All)
            .all(|e| state.edge_fired.contains(&edge_index(e)));
        let any_edges: Vec<&&Edge> = inbound.iter().filter(|e| e.gate == Gate::Any).collect();
        let any_fired = any_edges.is_empty() || any_edges.iter().any(|e| state.edge_fired.contains(&edge_index(e)));
        all_fired && any_fired
    }

    /// Runs the flow to completion or until paused/aborted/failed.
    /// `resume_outputs` seeds already-computed node outputs (used when
    /// continuing from a [`crate::bus::PausedSession`]).
    pub async fn run(&self, flow_input: Value, resume_outputs: HashMap<String, Value>) -> Result<ExecutionReport> {
        let mut state = RunState {
            node_status: self
                .flow
                .nodes
                .iter()
                .map(|n| {
                    let status = if resume_outputs.contains_key(&n.id) {
                        NodeStatus::Done
                    } else {
                        NodeStatus::Pending
                    };
                    (n.id.clone(), status)
                })
                .collect(),
            outputs: resume_outputs,
            edge_fired: HashSet::new(),
            loop_counters: HashMap::new(),
        };

        // Replay edge firing implied by already-done nodes (resume path).
        for (idx, edge) in self.flow.edges.iter().enumerate() {
            if matches!(state.node_status.get(&edge.from), Some(NodeStatus::Done)) {
                state.edge_fired.insert(idx);
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_nodes.max(1)));
        let current_state = self.flow.state.initial.clone();

        loop {
            if self.bus.cancellation_token().is_cancelled() {
                let status = self.bus.status();
                match status {
                    crate::bus::SessionStatus::Paused => {
                        self.bus.update_paused_state(
                            state.outputs.len(),
                            None,
                            Some(self.flow.name.clone()),
                            serde_json::to_value(&state.outputs).unwrap_or(json!({})),
                        );
                        return Ok(ExecutionReport {
                            status: RunStatus::Paused,
                            outputs: state.outputs,
                            node_status: state.node_status,
                            loop_counters: state.loop_counters,
                        });
                    }
                    _ => {
                        return Ok(ExecutionReport {
                            status: RunStatus::Aborted,
                            outputs: state.outputs,
                            node_status: state.node_status,
                            loop_counters: state.loop_counters,
                        });
                    }
                }
            }

            let mut ready: Vec<String> = state
                .node_status
                .iter()
                .filter(|(_, s)| **s == NodeStatus::Pending)
                .map(|(id, _)| id.clone())
                .filter(|id| self.node_ready(id, &state))
                .collect();
            ready.sort();

            if ready.is_empty() {
                break;
            }

            let mut handles = Vec::new();
            for node_id in ready {
                let node = self.flow.node(&node_id).expect("ready node exists").clone();
                let ctx_value = self.binding_ctx(&flow_input, &current_state, &state.outputs);

                if let Some(expr) = &node.when {
                    if !crate::binding::eval_expr(expr, &ctx_value)? {
                        state.node_status.insert(node_id.clone(), NodeStatus::Skipped);
                        self.bus.emit_named(
                            "node:skipped",
                            json!({ "nodeId": node_id, "reason": "guard" }),
                        );
                        if self.propagate_from(&node_id, &mut state, &flow_input, &current_state).await? {
                            return Ok(ExecutionReport {
                                status: RunStatus::Failed,
                                outputs: state.outputs,
                                node_status: state.node_status,
                                loop_counters: state.loop_counters,
                            });
                        }
                        continue;
                    }
                }

                state.node_status.insert(node_id.clone(), NodeStatus::Running);
                let (input_value, had_missing) = crate::binding::substitute_value(&node.input, &ctx_value);
                if had_missing {
                    self.bus.emit_named("binding:missing", json!({ "nodeId": node_id }));
                }

                let permit = semaphore.clone().acquire_owned().await.expect("semaphore open");
                let kind = self
                    .registry
                    .get(&node.type_name)
                    .ok_or_else(|| CoreError::validation(format!("unknown node type: {}", node.type_name)))?;
                let bus = self.bus.clone();
                let cancellation = self.bus.cancellation_token();
                let policy = node.policy.clone();
                let config = self.config.clone();
                let cache = self.cache.clone();
                let node_id_for_task = node_id.clone();

                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    bus.emit_named("node:start", json!({ "nodeId": node_id_for_task }));
                    let (result, duration_ms) = run_with_policy(
                        kind,
                        bus,
                        node_id_for_task.clone(),
                        cancellation,
                        policy.clone(),
                        config,
                        input_value,
                        cache,
                    )
                    .await;
                    (node_id_for_task, result, duration_ms, policy.continue_on_error)
                });
                handles.push(handle);
            }

            for handle in handles {
                let (node_id, result, duration_ms, continue_on_error) =
                    handle.await.map_err(|e| CoreError::Custom(format!("node task panicked: {e}")))?;
                match result {
                    Ok(value) => {
                        self.bus.emit_named(
                            "node:complete",
                            json!({ "nodeId": node_id, "output": value, "durationMs": duration_ms }),
                        );
                        state.node_status.insert(node_id.clone(), NodeStatus::Done);
                        state.outputs.insert(node_id.clone(), value);
                        if self.propagate_from(&node_id, &mut state, &flow_input, &current_state).await? {
                            return Ok(ExecutionReport {
                                status: RunStatus::Failed,
                                outputs: state.outputs,
                                node_status: state.node_status,
                                loop_counters: state.loop_counters,
                            });
                        }
                    }
                    Err(err) => {
                        self.bus.emit_named(
                            "node:error",
                            json!({ "nodeId": node_id, "error": err.to_string() }),
                        );
                        if continue_on_error {
                            state.node_status.insert(node_id.clone(), NodeStatus::Skipped);
                            if self.propagate_from(&node_id, &mut state, &flow_input, &current_state).await? {
                                return Ok(ExecutionReport {
                                    status: RunStatus::Failed,
                                    outputs: state.outputs,
                                    node_status: state.node_status,
                                    loop_counters: state.loop_counters,
                                });
                            }
                        } else {
                            state.node_status.insert(node_id.clone(), NodeStatus::Failed);
                            return Ok(ExecutionReport {
                                status: RunStatus::Failed,
                                outputs: state.outputs,
                                node_status: state.node_status,
                                loop_counters: state.loop_counters,
                            });
                        }
                    }
                }
            }
        }

        let any_failed = state.node_status.values().any(|s| *s == NodeStatus::Failed);
        Ok(ExecutionReport {
            status: if any_failed { RunStatus::Failed } else { RunStatus::Complete },
            outputs: state.outputs,
            node_status: state.node_status,
            loop_counters: state.loop_counters,
        })
    }

    /// Walks the outbound edges of `start_node_id` and everything they
    /// transitively unlock, iteratively (not recursively) so a `forEach`
    /// edge's fan-out can enqueue its target for further propagation.
    /// Returns `true` if a `forEach` iteration failed hard (no
    /// `continueOnError`), signalling the caller to stop the run.
    async fn propagate_from(
        &self,
        start_node_id: &str,
        state: &mut RunState,
        flow_input: &Value,
        current_state: &Value,
    ) -> Result<bool> {
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(start_node_id.to_string());

        while let Some(node_id) = queue.pop_front() {
            let ctx_value = self.binding_ctx(flow_input, current_state, &state.outputs);
            for idx in 0..self.flow.edges.len() {
                let edge = &self.flow.edges[idx];
                if edge.from != node_id {
                    continue;
                }
                let guard_ok = match &edge.when {
                    Some(expr) => crate::binding::eval_expr(expr, &ctx_value)?,
                    None => true,
                };
                if !guard_ok {
                    continue;
                }

                if let Some(for_each) = edge.for_each.clone() {
                    let edge = edge.clone();
                    let outcome = self.run_for_each(&edge, &for_each, &ctx_value, state).await?;
                    state.edge_fired.insert(idx);
                    match outcome {
                        ForEachOutcome::HardFailed => return Ok(true),
                        ForEachOutcome::Completed => queue.push_back(edge.to.clone()),
                        ForEachOutcome::Capped => {}
                    }
                    continue;
                }

                state.edge_fired.insert(idx);
            }
        }
        Ok(false)
    }

    /// Resolves the array at `for_each.in_path`, binds `for_each.as_name`
    /// into a per-iteration context, and runs the edge's target node once
    /// per element (sequentially, capped at `edge.max_iterations`),
    /// aggregating the per-element outputs into a single array stored
    /// under the target node's id.
    async fn run_for_each(
        &self,
        edge: &Edge,
        for_each: &ForEach,
        ctx_value: &Value,
        state: &mut RunState,
    ) -> Result<ForEachOutcome> {
        let node = self
            .flow
            .node(&edge.to)
            .cloned()
            .ok_or_else(|| CoreError::validation(format!("forEach targets unknown node: {}", edge.to)))?;

        let elements: Vec<Value> = match crate::binding::resolve_path(ctx_value, &for_each.in_path) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };

        let max = edge.max_iterations.unwrap_or(usize::MAX);
        let counter_key = format!("{}->{}", edge.from, edge.to);
        let kind = self
            .registry
            .get(&node.type_name)
            .ok_or_else(|| CoreError::validation(format!("unknown node type: {}", node.type_name)))?;

        let mut outputs = Vec::new();
        let mut hard_failed = false;
        let mut capped = false;

        for element in elements {
            let counter = state.loop_counters.entry(counter_key.clone()).or_insert(0);
            if *counter >= max {
                self.bus.emit_named(
                    "edge:loop-capped",
                    json!({ "edge": counter_key, "max": max }),
                );
                capped = true;
                break;
            }
            *counter += 1;
            let iteration = *counter;

            let mut iter_root = match ctx_value.clone() {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };
            iter_root.insert(for_each.as_name.clone(), element);
            let iter_ctx = Value::Object(iter_root);

            if let Some(expr) = &node.when {
                if !crate::binding::eval_expr(expr, &iter_ctx)? {
                    self.bus.emit_named(
                        "node:skipped",
                        json!({ "nodeId": node.id, "reason": "guard", "iteration": iteration }),
                    );
                    continue;
                }
            }

            let (input_value, had_missing) = crate::binding::substitute_value(&node.input, &iter_ctx);
            if had_missing {
                self.bus.emit_named(
                    "binding:missing",
                    json!({ "nodeId": node.id, "iteration": iteration }),
                );
            }

            self.bus.emit_named(
                "node:start",
                json!({ "nodeId": node.id, "iteration": iteration }),
            );
            let (result, duration_ms) = run_with_policy(
                kind.clone(),
                self.bus.clone(),
                node.id.clone(),
                self.bus.cancellation_token(),
                node.policy.clone(),
                self.config.clone(),
                input_value,
                self.cache.clone(),
            )
            .await;

            match result {
                Ok(value) => {
                    self.bus.emit_named(
                        "node:complete",
                        json!({ "nodeId": node.id, "output": value, "durationMs": duration_ms, "iteration": iteration }),
                    );
                    outputs.push(value);
                }
                Err(err) => {
                    self.bus.emit_named(
                        "node:error",
                        json!({ "nodeId": node.id, "error": err.to_string(), "iteration": iteration }),
                    );
                    if node.policy.continue_on_error {
                        continue;
                    }
                    hard_failed = true;
                    break;
                }
            }
        }

        if hard_failed {
            state.node_status.insert(node.id.clone(), NodeStatus::Failed);
            return Ok(ForEachOutcome::HardFailed);
        }

        state.node_status.insert(node.id.clone(), NodeStatus::Done);
        state.outputs.insert(node.id.clone(), Value::Array(outputs));
        Ok(if capped {
            ForEachOutcome::Capped
        } else {
            ForEachOutcome::Completed
        })
    }
}

enum ForEachOutcome {
    Completed,
    Capped,
    HardFailed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FnNode;

    fn echo_registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(FnNode::new("echo", |_ctx, input| async move { Ok(input) })));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn runs_linear_flow_to_completion() {
        let flow = FlowDefinition::from_yaml_str(
            r#"
name: demo
nodes:
  - id: a
    type: echo
    input: {"v": 1}
  - id: b
    type: echo
    input: {"v": 2}
edges:
  - from: a
    to: b
"#,
        )
        .unwrap();
        let bus = Bus::new("s1", 100);
        bus.start();
        let executor = Executor::new(flow, echo_registry(), bus, ExecutorConfig::default());
        let report = executor.run(json!({}), HashMap::new()).await.unwrap();
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.outputs.len(), 2);
    }

    #[tokio::test]
    async fn guard_false_skips_node_without_start_signal() {
        let flow = FlowDefinition::from_yaml_str(
            r#"
name: demo
nodes:
  - id: a
    type: echo
    input: {}
    when: "state.go = false"
"#,
        )
        .unwrap();
        let bus = Bus::new("s1", 100);
        bus.start();
        let starts = Arc::new(std::sync::Mutex::new(0usize));
        let s = starts.clone();
        let _unsub = bus.subscribe(
            &["node:start"],
            Arc::new(move |_e| {
                *s.lock().unwrap() += 1;
            }),
        );
        let executor = Executor::new(flow, echo_registry(), bus, ExecutorConfig::default());
        let report = executor.run(json!({}), HashMap::new()).await.unwrap();
        assert_eq!(report.node_status["a"], NodeStatus::Skipped);
        assert_eq!(*starts.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn continue_on_error_skips_instead_of_failing() {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(FnNode::new("boom", |_ctx, _input| async move {
            Err(CoreError::Custom("kaboom".into()))
        })));
        let flow = FlowDefinition::from_yaml_str(
            r#"
name: demo
nodes:
  - id: a
    type: boom
    input: {}
    policy:
      continueOnError: true
"#,
        )
        .unwrap();
        let bus = Bus::new("s1", 100);
        bus.start();
        let executor = Executor::new(flow, Arc::new(registry), bus, ExecutorConfig::default());
        let report = executor.run(json!({}), HashMap::new()).await.unwrap();
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.node_status["a"], NodeStatus::Skipped);
    }

    #[tokio::test]
    async fn resume_seeds_already_done_outputs() {
        let flow = FlowDefinition::from_yaml_str(
            r#"
name: demo
nodes:
  - id: a
    type: echo
    input: {"v": 1}
  - id: b
    type: echo
    input: {"v": 2}
edges:
  - from: a
    to: b
"#,
        )
        .unwrap();
        let bus = Bus::new("s1", 100);
        bus.start();
        let mut resume = HashMap::new();
        resume.insert("a".to_string(), json!({"v": 1}));
        let executor = Executor::new(flow, echo_registry(), bus, ExecutorConfig::default());
        let report = executor.run(json!({}), resume).await.unwrap();
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.node_status["a"], NodeStatus::Done);
        assert_eq!(report.node_status["b"], NodeStatus::Done);
    }

    #[tokio::test]
    async fn for_each_runs_target_once_per_array_element() {
        let flow = FlowDefinition::from_yaml_str(
            r#"
name: loopy
nodes:
  - id: start
    type: echo
    input: {}
  - id: repeat
    type: echo
    input: {"doubled": "{{ item }}"}
edges:
  - from: start
    to: repeat
    forEach:
      in: "flow.input.items"
      as: item
    maxIterations: 10
"#,
        )
        .unwrap();
        let bus = Bus::new("s1", 100);
        bus.start();
        let executor = Executor::new(flow, echo_registry(), bus, ExecutorConfig::default());
        let report = executor
            .run(json!({"items": [1, 2, 3]}), HashMap::new())
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.node_status["repeat"], NodeStatus::Done);
        let repeated = report.outputs.get("repeat").unwrap().as_array().unwrap();
        assert_eq!(repeated.len(), 3);
    }

    #[tokio::test]
    async fn loop_cap_is_never_exceeded() {
        let flow = FlowDefinition::from_yaml_str(
            r#"
name: loopy
nodes:
  - id: start
    type: echo
    input: {}
  - id: repeat
    type: echo
    input: {}
edges:
  - from: start
    to: repeat
    forEach:
      in: "flow.input.items"
      as: item
    maxIterations: 2
"#,
        )
        .unwrap();
        let bus = Bus::new("loop-session", 1000);
        bus.start();
        let capped = Arc::new(std::sync::Mutex::new(false));
        let c = capped.clone();
        let _unsub = bus.subscribe(
            &["edge:loop-capped"],
            Arc::new(move |_e| {
                *c.lock().unwrap() = true;
            }),
        );
        let executor = Executor::new(flow, echo_registry(), bus, ExecutorConfig::default());
        let report = executor
            .run(json!({"items": [1, 2, 3, 4, 5]}), HashMap::new())
            .await
            .unwrap();
        assert!(report.loop_counters.values().all(|&c| c <= 2));
        assert_eq!(report.outputs.get("repeat").unwrap().as_array().unwrap().len(), 2);
        assert!(*capped.lock().unwrap());
    }

    #[tokio::test]
    async fn cached_node_skips_execution_on_repeat_run_with_same_input() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_for_node = calls.clone();
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(FnNode::new("counted", move |_ctx, input| {
            let calls = calls_for_node.clone();
            async move {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(input)
            }
        })));
        let flow = FlowDefinition::from_yaml_str(
            r#"
name: demo
nodes:
  - id: a
    type: counted
    input: {"v": 1}
    policy:
      cache: true
"#,
        )
        .unwrap();
        let bus = Bus::new("s1", 100);
        bus.start();
        let executor = Executor::new(flow, Arc::new(registry), bus, ExecutorConfig::default());
        executor.run(json!({}), HashMap::new()).await.unwrap();
        let report = executor.run(json!({}), HashMap::new()).await.unwrap();
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn schema_mismatch_surfaces_as_node_error() {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(
            FnNode::new("strict", |_ctx, input| async move { Ok(input) })
                .with_input_schema(json!({"type": "object", "required": ["x"]})),
        ));
        let flow = FlowDefinition::from_yaml_str(
            r#"
name: demo
nodes:
  - id: a
    type: strict
    input: {}
"#,
        )
        .unwrap();
        let bus = Bus::new("s1", 100);
        bus.start();
        let executor = Executor::new(flow, Arc::new(registry), bus, ExecutorConfig::default());
        let report = executor.run(json!({}), HashMap::new()).await.unwrap();
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.node_status["a"], NodeStatus::Failed);
    }
}
