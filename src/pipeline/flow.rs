//! Declarative flow definitions.
//!
//! A flow is a JSON document:
//!
//! ```json
//! {
//!   "flow_id": "search_demo",
//!   "name": "Search demo",
//!   "version": "1.0",
//!   "nodes": [
//!     {"node_id": "planner", "template_id": "search_path_planner", "parameters": {}},
//!     {"node_id": "reporter", "template_id": "event_reporter"}
//!   ],
//!   "edges": [
//!     {"edge_id": "e1", "from_node_id": "planner", "from_port": "waypoints",
//!      "to_node_id": "reporter", "to_port": "events"}
//!   ]
//! }
//! ```
//!
//! Only `flow_id` is required. Unknown fields are ignored. Parameter values
//! are kept as raw JSON here and checked when the flow starts.

use crate::pipeline::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

fn default_version() -> String {
    "1.0".to_string()
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// One node entry of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub node_id: String,
    pub template_id: String,
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

/// One edge entry of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    #[serde(default)]
    pub edge_id: String,
    pub from_node_id: String,
    pub from_port: String,
    pub to_node_id: String,
    pub to_port: String,
}

/// A parsed flow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub flow_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

impl FlowDefinition {
    /// Parse a flow from JSON text.
    pub fn parse(text: &str) -> FlowResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        match value.get("flow_id") {
            Some(Value::String(_)) => {}
            _ => return Err(FlowError::MissingFlowId),
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Read and parse a flow file.
    pub fn from_file(path: impl AsRef<Path>) -> FlowResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    pub fn to_json(&self) -> FlowResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }
}
