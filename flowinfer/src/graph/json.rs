use anyhow::Result;
use serde_json::Value;

use crate::graph::{Graph, GraphBuilder, NodeDef};

pub struct GraphSerialize;

impl GraphSerialize {
    /// Serialize the node definitions and default outputs of a graph.
    pub fn json(graph: &Graph) -> Result<Value> {
        Ok(serde_json::json!({
            "nodes": serde_json::to_value(graph.node_defs())?,
            "outputs": graph.output_names(),
        }))
    }
}

pub struct GraphDeserialize;

impl GraphDeserialize {
    pub fn from_json(value: Value) -> Result<Graph> {
        let document: GraphDocument = serde_json::from_value(value)?;
        let builder = GraphBuilder::from_defs(document.nodes);
        match document.outputs {
            Some(outputs) => builder.outputs(outputs).build(),
            None => builder.build(),
        }
    }
}

#[derive(serde::Deserialize)]
struct GraphDocument {
    nodes: Vec<NodeDef>,
    #[serde(default)]
    outputs: Option<Vec<String>>,
}
