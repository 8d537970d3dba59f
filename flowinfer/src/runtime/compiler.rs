//! Static-path planning: backward reachability from the requested outputs,
//! then a forward topological order over the reachable nodes.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::error::ExecError;
use crate::graph::{Graph, NodeId, NodeKind};

/// Nodes that must run to produce a set of outputs from a set of inputs.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSubgraph {
    pub used: HashSet<NodeId>,
    /// Reachable nodes without inputs that are neither weights nor supplied.
    pub missing: Vec<NodeId>,
    /// The first control-flow or dynamic-shape node met while walking back.
    pub dynamic_node: Option<NodeId>,
    /// Consumers of `dynamic_node` that were already required when it was
    /// met; supplying them as inputs would avoid the dynamic op.
    pub sync_inputs: Vec<NodeId>,
}

pub fn execution_subgraph(graph: &Graph, inputs: &[NodeId], outputs: &[NodeId]) -> ExecutionSubgraph {
    let supplied: HashSet<NodeId> = inputs.iter().copied().collect();
    let mut info = ExecutionSubgraph::default();
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut frontier: Vec<NodeId> = outputs.to_vec();

    while let Some(id) = frontier.pop() {
        let node = graph.node(id);
        if node.is_dynamic() && info.dynamic_node.is_none() {
            info.dynamic_node = Some(id);
            info.sync_inputs = node
                .children
                .iter()
                .copied()
                .filter(|child| info.used.contains(child))
                .collect();
            info.sync_inputs.dedup();
        }
        info.used.insert(id);
        if node.kind == NodeKind::Const || supplied.contains(&id) {
            continue;
        }
        if node.inputs.is_empty() {
            info.missing.push(id);
            continue;
        }
        for input in &node.inputs {
            if seen.insert(*input) {
                frontier.push(*input);
            }
        }
    }
    info
}

/// Order the used nodes so that each appears after all of its inputs.
/// Weights seed the walk but are not emitted; supplied inputs are.
pub fn topological_order(graph: &Graph, inputs: &[NodeId], info: &ExecutionSubgraph) -> Vec<NodeId> {
    let mut frontier: Vec<NodeId> = inputs
        .iter()
        .copied()
        .filter(|id| info.used.contains(id))
        .collect();
    frontier.extend(
        graph
            .weights()
            .iter()
            .copied()
            .filter(|id| info.used.contains(id)),
    );

    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut ordered = Vec::new();
    while let Some(id) = frontier.pop() {
        if !seen.insert(id) {
            continue;
        }
        let node = graph.node(id);
        if node.kind != NodeKind::Const {
            ordered.push(id);
        }
        for child in &node.children {
            let ready = !seen.contains(child)
                && info.used.contains(child)
                && graph
                    .node(*child)
                    .inputs
                    .iter()
                    .all(|input| seen.contains(input));
            if ready {
                frontier.push(*child);
            }
        }
    }
    ordered
}

fn cache_key(graph: &Graph, inputs: &[NodeId], outputs: &[NodeId]) -> String {
    let mut input_names = graph.names(inputs);
    let mut output_names = graph.names(outputs);
    input_names.sort();
    output_names.sort();
    format!("{}--{}", input_names.join(","), output_names.join(","))
}

/// Compiled-order cache shared by every call on one executor.
#[derive(Debug, Default)]
pub struct Compiler {
    cache: Mutex<HashMap<String, Arc<Vec<NodeId>>>>,
    compilations: AtomicUsize,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(
        &self,
        graph: &Graph,
        inputs: &[NodeId],
        outputs: &[NodeId],
    ) -> Result<Arc<Vec<NodeId>>> {
        let key = cache_key(graph, inputs, outputs);
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| anyhow!("compile cache lock poisoned"))?;
        if let Some(order) = cache.get(&key) {
            return Ok(Arc::clone(order));
        }
        let order = Arc::new(self.plan(graph, inputs, outputs)?);
        cache.insert(key, Arc::clone(&order));
        Ok(order)
    }

    fn plan(&self, graph: &Graph, inputs: &[NodeId], outputs: &[NodeId]) -> Result<Vec<NodeId>> {
        self.compilations.fetch_add(1, Ordering::Relaxed);
        let info = execution_subgraph(graph, inputs, outputs);
        if let Some(dynamic) = info.dynamic_node {
            let node = graph.node(dynamic);
            return Err(ExecError::UnsupportedStaticGraph {
                node: node.name.clone(),
                op: node.op.clone(),
                alternatives: graph.names(&info.sync_inputs),
            }
            .into());
        }
        if !info.missing.is_empty() {
            return Err(ExecError::MissingInputs {
                outputs: graph.names(outputs),
                inputs: graph.names(inputs),
                missing: graph.names(&info.missing),
            }
            .into());
        }
        crate::trace_full!(
            "compiled {} nodes for outputs [{}]",
            info.used.len(),
            graph.names(outputs).join(", ")
        );
        Ok(topological_order(graph, inputs, &info))
    }

    /// Number of times a plan was actually computed, cache hits excluded.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }
}
