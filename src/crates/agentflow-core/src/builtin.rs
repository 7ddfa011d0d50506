//! A minimal set of demonstration node kinds. Real node kinds (HTTP calls,
//! shell commands, domain handlers, ...) are registered by the embedding
//! application; this module exists so a flow file can be run standalone
//! (by the CLI, or in a doctest) without writing a registry by hand.

use std::sync::Arc;

use serde_json::json;

use crate::node::{FnNode, NodeRegistry};

/// Registers `echo` (returns its input unchanged) and `log` (prints its
/// input to stdout via `tracing::info!` and passes it through).
pub fn default_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(FnNode::new("echo", |_ctx, input| async move { Ok(input) })));
    registry.register(Arc::new(FnNode::new("log", |ctx, input| async move {
        tracing::info!(node_id = %ctx.node_id, payload = %input, "log node");
        Ok(input)
    })));
    registry.register(Arc::new(FnNode::new("noop", |_ctx, _input| async move { Ok(json!({})) })));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_the_documented_kinds() {
        let registry = default_registry();
        assert!(registry.contains("echo"));
        assert!(registry.contains("log"));
        assert!(registry.contains("noop"));
    }
}
