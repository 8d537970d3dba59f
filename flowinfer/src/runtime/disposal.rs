use std::collections::{HashMap, HashSet};

use crate::graph::{Graph, Node, NodeId};
use crate::runtime::context::ExecutionContext;
use crate::runtime::tensor_map::TensorMap;

/// Remaining consumer edges per live intermediate tensor id.
#[derive(Debug, Default)]
pub struct ConsumerCounts {
    counts: HashMap<u64, usize>,
}

impl ConsumerCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bookkeeping after `node` was evaluated and stored under `key`.
    ///
    /// Control nodes are skipped entirely. Output nodes are never counted.
    /// Every non-control input edge is consumed once; an input tensor whose
    /// count drops to zero is released unless it is in `keep`. Returns the
    /// ids released.
    pub fn after_evaluation(
        &mut self,
        graph: &Graph,
        node: &Node,
        key: &str,
        tensors: &TensorMap,
        ctx: &ExecutionContext,
        keep: &HashSet<u64>,
        outputs: &HashSet<NodeId>,
    ) -> Vec<u64> {
        if node.is_control() {
            return Vec::new();
        }
        if !outputs.contains(&node.id) {
            if let Some(produced) = tensors.get(key) {
                for tensor in produced.iter().flatten() {
                    *self.counts.entry(tensor.id()).or_insert(0) += node.children.len();
                }
            }
        }

        let mut released = Vec::new();
        for input in &node.inputs {
            if graph.node(*input).is_control() {
                continue;
            }
            let Some(slots) = tensors.resolve_current(&graph.node(*input).name, ctx) else {
                continue;
            };
            for tensor in slots.iter().flatten() {
                if keep.contains(&tensor.id()) {
                    continue;
                }
                match self.counts.get(&tensor.id()).copied() {
                    Some(1) => {
                        tensor.dispose();
                        self.counts.remove(&tensor.id());
                        released.push(tensor.id());
                    }
                    Some(count) if count > 1 => {
                        self.counts.insert(tensor.id(), count - 1);
                    }
                    _ => {}
                }
            }
        }
        released
    }
}

/// Release every tensor in the table that is not protected. Returns the ids
/// released.
pub fn release_unprotected(tensors: &TensorMap, protected: &HashSet<u64>) -> Vec<u64> {
    let mut released = Vec::new();
    for tensor in tensors.tensors() {
        if protected.contains(&tensor.id()) || tensor.is_disposed() {
            continue;
        }
        tensor.dispose();
        released.push(tensor.id());
    }
    released
}
