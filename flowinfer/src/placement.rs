//! Device placement pass.
//!
//! Walks forward from placeholders and weights and tags each reachable node
//! with a [`Backend`]: a node stays on the CPU only when all of its inputs
//! are there, placeholders take the configured input backend, and a few
//! shape-query ops always run on the CPU. The executor does not read these
//! tags.
use std::collections::HashSet;

use crate::graph::{parse_node_name, Backend, ControlOp, Graph, NodeId, NodeKind};

const CPU_OPS: &[&str] = &["Rank", "Shape", "Size", "LoopCond"];

/// Node counts per backend after a placement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlacementSummary {
    pub cpu: usize,
    pub gpu: usize,
    /// CPU nodes that are not weights.
    pub non_constant_cpu: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct DevicePlacement {
    input_backend: Backend,
}

impl Default for DevicePlacement {
    fn default() -> Self {
        Self::new(Backend::Gpu)
    }
}

impl DevicePlacement {
    pub fn new(input_backend: Backend) -> Self {
        Self { input_backend }
    }

    pub fn optimize(&self, graph: &mut Graph) -> PlacementSummary {
        let mut stack: Vec<NodeId> = graph
            .placeholders()
            .iter()
            .chain(graph.weights())
            .copied()
            .collect();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut summary = PlacementSummary::default();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let all_cpu = graph
                .node(id)
                .inputs
                .iter()
                .all(|input| graph.node(*input).placement == Some(Backend::Cpu));
            let node = graph.node_mut(id);
            let backend = if node.kind == NodeKind::Placeholder {
                self.input_backend
            } else if CPU_OPS.contains(&node.op.as_str()) || all_cpu {
                Backend::Cpu
            } else {
                Backend::Gpu
            };
            node.placement = Some(backend);
            match backend {
                Backend::Cpu => summary.cpu += 1,
                Backend::Gpu => summary.gpu += 1,
            }

            let node = graph.node(id);
            for child_id in &node.children {
                if visited.contains(child_id) {
                    continue;
                }
                let child = graph.node(*child_id);
                let mut seen = child
                    .input_names
                    .iter()
                    .map(|reference| graph.find(parse_node_name(reference).0))
                    .map(|input| input.is_some_and(|input| visited.contains(&input)));
                let ready = if child.kind == NodeKind::Control(ControlOp::Merge) {
                    seen.any(|visited| visited)
                } else {
                    seen.all(|visited| visited)
                };
                if ready {
                    stack.push(*child_id);
                }
            }
        }

        summary.non_constant_cpu = summary.cpu.saturating_sub(graph.weights().len());
        crate::trace!("gpu nodes = {}", summary.gpu);
        crate::trace!("cpu nodes = {}", summary.cpu);
        crate::trace!("non-constant cpu nodes = {}", summary.non_constant_cpu);
        summary
    }
}
