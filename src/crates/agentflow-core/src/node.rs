//! Node types: the registry of runnable behaviors a [`crate::flow::FlowDefinition`]
//! refers to by name, plus the context handed to each invocation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::bus::Bus;
use crate::error::{CoreError, Result};

/// Everything a node implementation needs besides its input: the bus (to
/// emit custom signals), the cancellation token for the current run (to
/// observe abort/timeout), and the node's own id for diagnostics.
pub struct NodeContext {
    pub bus: Bus,
    pub node_id: String,
    pub cancellation: CancellationToken,
}

/// Validates `value` against a JSON Schema document, surfacing a failure
/// as a [`CoreError::Validation`]. Used around [`NodeKind::run`] to check
/// a node's declared `inputSchema`/`outputSchema`.
pub fn validate_schema(schema: &Value, value: &Value, what: &str) -> Result<()> {
    let compiled = jsonschema::JSONSchema::compile(schema)
        .map_err(|e| CoreError::validation(format!("invalid {what} schema: {e}")))?;
    if let Err(errors) = compiled.validate(value) {
        let detail = errors
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(CoreError::validation(format!("{what} failed schema validation: {detail}")));
    }
    Ok(())
}

#[async_trait]
pub trait NodeKind: Send + Sync {
    fn type_name(&self) -> &str;

    /// JSON Schema the node's input must satisfy, if declared.
    fn input_schema(&self) -> Option<&Value> {
        None
    }

    /// JSON Schema the node's output must satisfy, if declared.
    fn output_schema(&self) -> Option<&Value> {
        None
    }

    /// Declared capability tags (e.g. `"network"`, `"filesystem"`) a
    /// caller may use to gate which node types a flow is allowed to use.
    fn capabilities(&self) -> &[String] {
        &[]
    }

    async fn run(&self, ctx: &NodeContext, input: Value) -> Result<Value>;
}

/// A node implementation built from a plain async closure — the common
/// case; implement [`NodeKind`] directly only for something stateful.
pub struct FnNode<F> {
    type_name: String,
    func: F,
    input_schema: Option<Value>,
    output_schema: Option<Value>,
    capabilities: Vec<String>,
}

impl<F, Fut> FnNode<F>
where
    F: Fn(Arc<NodeContext>, Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value>> + Send,
{
    pub fn new(type_name: impl Into<String>, func: F) -> Self {
        Self {
            type_name: type_name.into(),
            func,
            input_schema: None,
            output_schema: None,
            capabilities: Vec::new(),
        }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl<F, Fut> NodeKind for FnNode<F>
where
    F: Fn(Arc<NodeContext>, Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value>> + Send,
{
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn input_schema(&self) -> Option<&Value> {
        self.input_schema.as_ref()
    }

    fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn run(&self, ctx: &NodeContext, input: Value) -> Result<Value> {
        let ctx = Arc::new(NodeContext {
            bus: ctx.bus.clone(),
            node_id: ctx.node_id.clone(),
            cancellation: ctx.cancellation.clone(),
        });
        (self.func)(ctx, input).await
    }
}

#[derive(Default)]
pub struct NodeRegistry {
    kinds: HashMap<String, Arc<dyn NodeKind>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: Arc<dyn NodeKind>) -> &mut Self {
        self.kinds.insert(kind.type_name().to_string(), kind);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn NodeKind>> {
        self.kinds.get(type_name).cloned()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.kinds.contains_key(type_name)
    }
}
