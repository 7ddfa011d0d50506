//! The flow definition data model: the on-disk/in-memory shape a
//! [`crate::executor::Executor`] runs.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RetryPolicy;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodePolicy {
    pub retry: Option<RetryPolicy>,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub cache: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub input: Value,
    pub when: Option<String>,
    #[serde(default)]
    pub policy: NodePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForEach {
    #[serde(rename = "in")]
    pub in_path: String,
    #[serde(rename = "as")]
    pub as_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    #[default]
    Any,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub when: Option<String>,
    #[serde(default)]
    pub gate: Gate,
    pub for_each: Option<ForEach>,
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StateSpec {
    #[serde(default)]
    pub initial: Value,
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub name: String,
    pub version: Option<u32>,
    #[serde(default)]
    pub state: StateSpec,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl FlowDefinition {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let def: Self = serde_yaml::from_str(text)?;
        def.validate()?;
        Ok(def)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Checks node id uniqueness and that every edge endpoint references a
    /// declared node. Cycles are allowed (guarded or `forEach`-capped).
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(CoreError::validation(format!("duplicate node id: {}", node.id)));
            }
        }
        for edge in &self.edges {
            if !seen.contains(edge.from.as_str()) {
                return Err(CoreError::validation(format!(
                    "edge references unknown source node: {}",
                    edge.from
                )));
            }
            if !seen.contains(edge.to.as_str()) {
                return Err(CoreError::validation(format!(
                    "edge references unknown target node: {}",
                    edge.to
                )));
            }
            if edge.for_each.is_some() && edge.max_iterations.is_none() {
                return Err(CoreError::validation(format!(
                    "edge {}->{} uses forEach but declares no maxIterations",
                    edge.from, edge.to
                )));
            }
        }
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn inbound_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.to == node_id).collect()
    }

    pub fn outbound_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.from == node_id).collect()
    }

    /// Nodes with no inbound edges — the executor's initial ready set.
    pub fn source_nodes(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| self.inbound_edges(&n.id).is_empty())
            .collect()
    }

    pub fn describe(&self) -> FlowDescription {
        FlowDescription {
            name: self.name.clone(),
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            source_nodes: self.source_nodes().into_iter().map(|n| n.id.clone()).collect(),
            reachable: self.reachable_node_ids(),
        }
    }

    fn reachable_node_ids(&self) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut stack: Vec<&str> = self.source_nodes().into_iter().map(|n| n.id.as_str()).collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            for edge in self.outbound_edges(id) {
                stack.push(&edge.to);
            }
        }
        let mut ids: Vec<String> = visited.into_iter().map(String::from).collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowDescription {
    pub name: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub source_nodes: Vec<String>,
    pub reachable: Vec<String>,
}

/// Render a flow as Mermaid or DOT text for inspection without a GUI.
pub fn visualize(flow: &FlowDefinition, format: VisualizeFormat) -> String {
    match format {
        VisualizeFormat::Mermaid => {
            let mut out = String::from("graph TD\n");
            for node in &flow.nodes {
                out.push_str(&format!("    {}[\"{} ({})\"]\n", node.id, node.id, node.type_name));
            }
            for edge in &flow.edges {
                let label = edge.when.as_deref().unwrap_or("");
                if label.is_empty() {
                    out.push_str(&format!("    {} --> {}\n", edge.from, edge.to));
                } else {
                    out.push_str(&format!("    {} -- \"{}\" --> {}\n", edge.from, label, edge.to));
                }
            }
            out
        }
        VisualizeFormat::Dot => {
            let mut out = String::from("digraph flow {\n");
            for node in &flow.nodes {
                out.push_str(&format!("  \"{}\" [label=\"{} ({})\"];\n", node.id, node.id, node.type_name));
            }
            for edge in &flow.edges {
                out.push_str(&format!("  \"{}\" -> \"{}\";\n", edge.from, edge.to));
            }
            out.push_str("}\n");
            out
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum VisualizeFormat {
    Mermaid,
    Dot,
}

pub type NodeOutputs = HashMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
name: demo
nodes:
  - id: a
    type: echo
    input: {}
  - id: b
    type: echo
    input: {}
edges:
  - from: a
    to: b
"#;

    #[test]
    fn parses_and_validates_minimal_flow() {
        let flow = FlowDefinition::from_yaml_str(YAML).unwrap();
        assert_eq!(flow.nodes.len(), 2);
        assert_eq!(flow.source_nodes().len(), 1);
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let bad = YAML.replace("id: b", "id: a");
        let err = FlowDefinition::from_yaml_str(&bad).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn rejects_dangling_edge_target() {
        let bad = YAML.replace("to: b", "to: nope");
        let err = FlowDefinition::from_yaml_str(&bad).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn for_each_without_max_iterations_is_rejected() {
        let mut flow = FlowDefinition::from_yaml_str(YAML).unwrap();
        flow.edges[0].for_each = Some(ForEach {
            in_path: "state.items".into(),
            as_name: "item".into(),
        });
        assert!(flow.validate().is_err());
    }

    #[test]
    fn visualize_mermaid_includes_all_nodes_and_edges() {
        let flow = FlowDefinition::from_yaml_str(YAML).unwrap();
        let out = visualize(&flow, VisualizeFormat::Mermaid);
        assert!(out.contains("graph TD"));
        assert!(out.contains("a --> b"));
    }
}
