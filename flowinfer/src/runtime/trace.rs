use std::fmt;

use serde::ser::{SerializeStruct, Serializer};
use uuid::Uuid;

/// Kind of trace event recorded during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TraceEventKind {
    /// A node was evaluated and its outputs stored.
    NodeExecute,
    /// A caller input seeded the worklist without evaluation.
    InputSeed,
    /// A tensor was released by consumer counting.
    Dispose,
    /// Unprotected tensors were released when the call finished.
    Cleanup,
}

impl fmt::Display for TraceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEventKind::NodeExecute => write!(f, "NodeExecute"),
            TraceEventKind::InputSeed => write!(f, "InputSeed"),
            TraceEventKind::Dispose => write!(f, "Dispose"),
            TraceEventKind::Cleanup => write!(f, "Cleanup"),
        }
    }
}

/// Execution trace record for a single node.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    pub node_index: usize,
    pub node_uuid: Uuid,
    pub node_name: String,
    pub op_name: String,
    /// Context-qualified storage key of the node's outputs.
    pub key: String,
    pub context_id: String,
    /// Released tensor ids for `Dispose`/`Cleanup` events.
    pub released: Vec<u64>,
    pub micros: String,
    pub micros_parts: [u64; 3],
}

impl TraceEvent {
    pub(crate) fn new(kind: TraceEventKind, node: &crate::graph::Node, key: &str, context_id: &str) -> Self {
        Self {
            kind,
            node_index: node.id,
            node_uuid: node.uuid,
            node_name: node.name.clone(),
            op_name: node.op.clone(),
            key: key.to_string(),
            context_id: context_id.to_string(),
            released: Vec::new(),
            micros: String::new(),
            micros_parts: [0; 3],
        }
    }

    pub(crate) fn cleanup(released: Vec<u64>) -> Self {
        Self {
            kind: TraceEventKind::Cleanup,
            node_index: 0,
            node_uuid: Uuid::nil(),
            node_name: String::new(),
            op_name: String::new(),
            key: String::new(),
            context_id: String::new(),
            released,
            micros: String::new(),
            micros_parts: [0; 3],
        }
    }
}

impl serde::Serialize for TraceEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("TraceEvent", 8)?;
        state.serialize_field("node_index", &self.node_index)?;
        state.serialize_field("node_uuid", &self.node_uuid)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("op", &self.op_name)?;
        state.serialize_field("key", &self.key)?;
        state.serialize_field("context", &self.context_id)?;
        state.serialize_field("released", &self.released)?;
        state.serialize_field("micros", &self.micros_parts)?;
        state.end()
    }
}
