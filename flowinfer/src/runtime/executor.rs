use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::error::ExecError;
use crate::graph::{parse_node_name, ControlOp, Graph, Node, NodeId, NodeKind};
use crate::logging::{env_flag, trace_basic_enabled, TIMER_ENV};
use crate::runtime::compiler::{execution_subgraph, Compiler, ExecutionSubgraph};
use crate::runtime::context::{ExecutionContext, Frame};
use crate::runtime::disposal::{release_unprotected, ConsumerCounts};
use crate::runtime::evaluator::{Evaluation, NodeOutputs, OpEvaluator, OpInputs};
use crate::runtime::op_runner::{detach_outputs, run_node};
use crate::runtime::tensor_map::{storage_key, NamedTensors, TensorMap};
use crate::runtime::trace::{TraceEvent, TraceEventKind};
use crate::tensor::{shape_matches, Tensor};
use crate::timer::{format_duration, Timer};

/// Per-executor switches for trace recording and node timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub trace_enabled: bool,
    pub timer_enabled: bool,
}

impl ExecutorOptions {
    /// Read `FLOWINFER_TRACE` and `FLOWINFER_TIMER`.
    pub fn from_env() -> Self {
        Self {
            trace_enabled: trace_basic_enabled(),
            timer_enabled: env_flag(TIMER_ENV),
        }
    }
}

/// A pending unit of dynamic-path work: a node plus the frame stack that was
/// active when it became eligible.
#[derive(Debug)]
struct WorkItem {
    node: NodeId,
    frames: Vec<Frame>,
}

/// State of one execution call. Dropped when the call returns.
struct CallState {
    ctx: ExecutionContext,
    tensors: TensorMap,
    counts: ConsumerCounts,
    /// Ids of caller inputs and weights.
    keep: HashSet<u64>,
    /// Nodes whose value was seeded rather than evaluated.
    seeded: HashSet<NodeId>,
    outputs: HashSet<NodeId>,
    trace: Vec<TraceEvent>,
}

/// Runs a graph against a fixed set of weights, either along a compiled
/// topological order ([`GraphExecutor::execute`]) or through a worklist that
/// understands loops and branches ([`GraphExecutor::execute_async`]).
pub struct GraphExecutor {
    graph: Arc<Graph>,
    weights: NamedTensors,
    evaluator: Arc<dyn OpEvaluator>,
    compiler: Compiler,
    options: ExecutorOptions,
    last_trace: Mutex<Vec<TraceEvent>>,
}

impl GraphExecutor {
    pub fn new(graph: Graph, weights: NamedTensors, evaluator: Arc<dyn OpEvaluator>) -> Self {
        Self::with_options(graph, weights, evaluator, ExecutorOptions::from_env())
    }

    pub fn with_options(
        graph: Graph,
        weights: NamedTensors,
        evaluator: Arc<dyn OpEvaluator>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            weights,
            evaluator,
            compiler: Compiler::new(),
            options,
            last_trace: Mutex::new(Vec::new()),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn weights(&self) -> &NamedTensors {
        &self.weights
    }

    pub fn options(&self) -> ExecutorOptions {
        self.options
    }

    /// Number of plans computed so far; cache hits do not count.
    pub fn compilations(&self) -> usize {
        self.compiler.compilations()
    }

    /// Trace events of the most recent call, empty unless tracing is enabled.
    pub fn last_trace(&self) -> Vec<TraceEvent> {
        self.last_trace
            .lock()
            .map(|trace| trace.clone())
            .unwrap_or_default()
    }

    /// Topological order of the nodes needed to compute `outputs` from
    /// `inputs`. Cached by the sorted input and output name sets.
    pub fn compile(&self, inputs: &[String], outputs: &[String]) -> Result<Arc<Vec<NodeId>>> {
        let input_ids = self.resolve_inputs(inputs.iter().map(String::as_str))?;
        let output_ids = self.resolve_outputs(outputs)?;
        self.compiler.compile(&self.graph, &input_ids, &output_ids)
    }

    /// Evaluate the graph along a compiled order. `outputs` empty means the
    /// graph's default outputs. Results follow the order of `outputs`.
    ///
    /// Fails with [`ExecError::UnsupportedStaticGraph`] when a control-flow or
    /// dynamic-shape node is needed, and with [`ExecError::PendingEvaluation`]
    /// if the evaluator suspends.
    pub fn execute(&self, inputs: &NamedTensors, strict: bool, outputs: &[String]) -> Result<Vec<Tensor>> {
        let output_names = self.output_names(outputs);
        self.check_inputs(inputs, strict)?;
        let output_ids = self.resolve_outputs(&output_names)?;
        let input_ids = self.resolve_inputs(inputs.keys().map(String::as_str))?;
        let order = self.compiler.compile(&self.graph, &input_ids, &output_ids)?;

        let mut state = self.seed(inputs, &output_ids);
        let result = self
            .run_static(&order, &mut state)
            .and_then(|_| self.gather_outputs(&output_names, &input_ids, &state));
        self.finish(state, result)
    }

    /// Evaluate the graph with the dynamic scheduler. Supports `Switch`,
    /// `Merge`, `Enter`, `Exit`, `NextIteration`, indexed arrays and
    /// evaluators that return pending results.
    pub async fn execute_async(&self, inputs: &NamedTensors, outputs: &[String]) -> Result<Vec<Tensor>> {
        let output_names = self.output_names(outputs);
        self.check_inputs(inputs, false)?;
        let output_ids = self.resolve_outputs(&output_names)?;
        let input_ids = self.resolve_inputs(inputs.keys().map(String::as_str))?;

        let mut state = self.seed(inputs, &output_ids);
        let result = match self.run_dynamic(&input_ids, &output_ids, &mut state).await {
            Ok(()) => self.gather_outputs(&output_names, &input_ids, &state),
            Err(err) => Err(err),
        };
        self.finish(state, result)
    }

    fn output_names(&self, outputs: &[String]) -> Vec<String> {
        if outputs.is_empty() {
            self.graph.output_names()
        } else {
            outputs.to_vec()
        }
    }

    fn resolve_inputs<'a>(&self, names: impl Iterator<Item = &'a str>) -> Result<Vec<NodeId>> {
        let mut ids = Vec::new();
        for name in names {
            let (node_name, _) = parse_node_name(name);
            let id = self.graph.find(node_name).ok_or_else(|| ExecError::UnknownInput {
                name: name.to_string(),
            })?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn resolve_outputs(&self, names: &[String]) -> Result<Vec<NodeId>> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let (node_name, _) = parse_node_name(name);
            let id = self.graph.find(node_name).ok_or_else(|| ExecError::UnknownOutput {
                name: name.clone(),
            })?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn check_inputs(&self, inputs: &NamedTensors, strict: bool) -> Result<()> {
        let mut provided: Vec<String> = inputs.keys().cloned().collect();
        provided.sort();
        for name in &provided {
            let (node_name, _) = parse_node_name(name);
            if self.graph.find(node_name).is_none() {
                return Err(ExecError::UnknownInput { name: name.clone() }.into());
            }
        }

        if strict {
            let mut expected = self.graph.placeholder_names();
            expected.sort();
            let provided_nodes: HashSet<&str> =
                provided.iter().map(|name| parse_node_name(name).0).collect();
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !provided_nodes.contains(name.as_str()))
                .cloned()
                .collect();
            let unused: Vec<String> = provided
                .iter()
                .filter(|name| !expected.iter().any(|p| p == parse_node_name(name).0))
                .cloned()
                .collect();
            if !missing.is_empty() || !unused.is_empty() {
                return Err(ExecError::InputMismatch {
                    provided,
                    missing,
                    unused,
                    expected,
                }
                .into());
            }
        }

        for name in &provided {
            let Some(node) = self.graph.get(parse_node_name(name).0) else {
                continue;
            };
            let Some(tensor) = inputs.get(name) else {
                continue;
            };
            if let Some(declared) = node.declared_shape() {
                if !shape_matches(declared, tensor.shape()) {
                    return Err(ExecError::ShapeMismatch {
                        name: node.name.clone(),
                        expected: declared.to_vec(),
                        actual: tensor.shape().to_vec(),
                    }
                    .into());
                }
            }
            if let Some(dtype) = node.declared_dtype() {
                if dtype != tensor.dtype() {
                    return Err(ExecError::DtypeMismatch {
                        name: node.name.clone(),
                        expected: dtype,
                        actual: tensor.dtype(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn seed(&self, inputs: &NamedTensors, output_ids: &[NodeId]) -> CallState {
        let mut tensors = TensorMap::new();
        let mut keep = HashSet::new();
        let mut seeded = HashSet::new();
        for id in self.graph.weights() {
            let node = self.graph.node(*id);
            if let Some(weight) = self.weights.get(&node.name) {
                keep.insert(weight.id());
                seeded.insert(*id);
                tensors.insert(node.name.clone(), vec![Some(weight.clone())]);
            }
        }
        for (name, tensor) in inputs {
            let (node_name, index) = parse_node_name(name);
            if let Some(id) = self.graph.find(node_name) {
                seeded.insert(id);
            }
            keep.insert(tensor.id());
            tensors.insert_at(node_name.to_string(), index, tensor.clone());
        }
        CallState {
            ctx: ExecutionContext::new(),
            tensors,
            counts: ConsumerCounts::new(),
            keep,
            seeded,
            outputs: output_ids.iter().copied().collect(),
            trace: Vec::new(),
        }
    }

    fn run_static(&self, order: &[NodeId], state: &mut CallState) -> Result<()> {
        for id in order {
            let node = self.graph.node(*id);
            if state.tensors.contains_key(&node.name) {
                continue;
            }
            let timer = Timer::start(self.options.timer_enabled);
            let (inputs, input_ids) = self.collect_inputs(node, state);
            let outputs = match run_node(node, inputs, &mut state.ctx, self.evaluator.as_ref())? {
                Evaluation::Ready(outputs) => outputs,
                Evaluation::Pending(_) => {
                    return Err(ExecError::PendingEvaluation {
                        node: node.name.clone(),
                        op: node.op.clone(),
                    }
                    .into())
                }
            };
            let outputs = detach_outputs(outputs, &input_ids)?;
            self.store(node, node.name.clone(), outputs, timer, state);
        }
        Ok(())
    }

    async fn run_dynamic(
        &self,
        input_ids: &[NodeId],
        output_ids: &[NodeId],
        state: &mut CallState,
    ) -> Result<()> {
        let info = execution_subgraph(&self.graph, input_ids, output_ids);
        let root = state.ctx.frames().to_vec();
        let weights = self
            .graph
            .weights()
            .iter()
            .filter(|id| state.seeded.contains(*id));
        let mut stack: Vec<WorkItem> = input_ids
            .iter()
            .chain(weights)
            .map(|id| WorkItem {
                node: *id,
                frames: root.clone(),
            })
            .collect();
        let mut added: HashSet<String> = HashSet::new();

        while let Some(item) = stack.pop() {
            let node = self.graph.node(item.node);
            state.ctx.set_frames(item.frames);

            if state.seeded.contains(&node.id) {
                if self.options.trace_enabled {
                    let key = storage_key(&node.name, state.ctx.current_context_id());
                    let event = TraceEvent::new(
                        TraceEventKind::InputSeed,
                        node,
                        &key,
                        state.ctx.current_context_id(),
                    );
                    state.trace.push(event);
                }
                self.push_children(node, state, &info.used, &mut added, &mut stack);
                continue;
            }

            let constant_key = constant_enter_key(node, state);

            let timer = Timer::start(self.options.timer_enabled);
            let (inputs, input_ids) = self.collect_inputs(node, state);
            let outputs = match run_node(node, inputs, &mut state.ctx, self.evaluator.as_ref())? {
                Evaluation::Ready(outputs) => outputs,
                Evaluation::Pending(pending) => {
                    crate::trace_full!("awaiting {} ({})", node.name, node.op);
                    pending.await?
                }
            };
            let outputs = detach_outputs(outputs, &input_ids)?;
            let key = constant_key
                .unwrap_or_else(|| storage_key(&node.name, state.ctx.current_context_id()));
            self.store(node, key, outputs, timer, state);
            self.push_children(node, state, &info.used, &mut added, &mut stack);
        }

        state.ctx.set_frames(root);
        if info.dynamic_node.is_none() {
            crate::warning!(
                "this execution did not contain any nodes with control flow or dynamic output shapes; use execute() instead"
            );
        }

        let missing: Vec<NodeId> = output_ids
            .iter()
            .copied()
            .filter(|id| {
                let node = self.graph.node(*id);
                let control_flow = matches!(node.kind, NodeKind::Control(op) if op.is_control_flow());
                !control_flow && state.tensors.lookup(&node.name, &state.ctx).is_none()
            })
            .collect();
        if !missing.is_empty() {
            return Err(self.missing_outputs(&missing, input_ids, &info));
        }
        Ok(())
    }

    fn missing_outputs(
        &self,
        outputs: &[NodeId],
        input_ids: &[NodeId],
        info: &ExecutionSubgraph,
    ) -> anyhow::Error {
        let alternatives = if info.dynamic_node.is_some() {
            self.graph.names(&info.sync_inputs)
        } else {
            Vec::new()
        };
        ExecError::MissingOutputs {
            outputs: self.graph.names(outputs),
            inputs: self.graph.names(input_ids),
            missing: self.graph.names(&info.missing),
            alternatives,
        }
        .into()
    }

    fn push_children(
        &self,
        node: &Node,
        state: &CallState,
        used: &HashSet<NodeId>,
        added: &mut HashSet<String>,
        stack: &mut Vec<WorkItem>,
    ) {
        for child_id in &node.children {
            let child = self.graph.node(*child_id);
            let key = storage_key(&child.name, state.ctx.current_context_id());
            if added.contains(&key) || !used.contains(child_id) {
                continue;
            }
            let mut resolved = child
                .input_names
                .iter()
                .map(|reference| state.tensors.lookup(reference, &state.ctx).is_some());
            let eligible = if child.kind == NodeKind::Control(ControlOp::Merge) {
                resolved.any(|present| present)
            } else {
                resolved.all(|present| present)
            };
            if eligible {
                added.insert(key);
                stack.push(WorkItem {
                    node: *child_id,
                    frames: state.ctx.frames().to_vec(),
                });
            }
        }
    }

    fn collect_inputs(&self, node: &Node, state: &CallState) -> (OpInputs, HashSet<u64>) {
        let values = state.tensors.node_inputs(node, &state.ctx);
        let ids = values.iter().flatten().map(Tensor::id).collect();
        (
            OpInputs::new(values, state.ctx.current_context_id()),
            ids,
        )
    }

    fn store(&self, node: &Node, key: String, outputs: NodeOutputs, timer: Timer, state: &mut CallState) {
        crate::trace!("{} {} -> {}", node.op, node.name, key);
        state.tensors.insert(key.clone(), outputs);
        let released = state.counts.after_evaluation(
            &self.graph,
            node,
            &key,
            &state.tensors,
            &state.ctx,
            &state.keep,
            &state.outputs,
        );
        if !self.options.trace_enabled {
            return;
        }
        let context_id = state.ctx.current_context_id().to_string();
        let mut event = TraceEvent::new(TraceEventKind::NodeExecute, node, &key, &context_id);
        if let Some(elapsed) = timer.stop() {
            let (text, parts) = format_duration(elapsed);
            event.micros = text;
            event.micros_parts = parts;
        }
        state.trace.push(event);
        if !released.is_empty() {
            let mut event = TraceEvent::new(TraceEventKind::Dispose, node, &key, &context_id);
            event.released = released;
            state.trace.push(event);
        }
    }

    fn gather_outputs(
        &self,
        names: &[String],
        input_ids: &[NodeId],
        state: &CallState,
    ) -> Result<Vec<Tensor>> {
        names
            .iter()
            .map(|name| {
                if let Some(tensor) = state.tensors.lookup(name, &state.ctx) {
                    return Ok(tensor);
                }
                // outputs were resolved up front, so the node exists
                let output: Vec<NodeId> =
                    self.graph.find(parse_node_name(name).0).into_iter().collect();
                let info = execution_subgraph(&self.graph, input_ids, &output);
                Err(self.missing_outputs(&output, input_ids, &info))
            })
            .collect()
    }

    /// Release everything the call produced except caller inputs, weights and
    /// returned outputs, on success and on failure alike.
    fn finish(&self, mut state: CallState, result: Result<Vec<Tensor>>) -> Result<Vec<Tensor>> {
        let mut protected = state.keep.clone();
        if let Ok(outputs) = &result {
            protected.extend(outputs.iter().map(Tensor::id));
        }
        let released = release_unprotected(&state.tensors, &protected);
        state.ctx.release_arrays();
        if self.options.trace_enabled {
            state.trace.push(TraceEvent::cleanup(released));
        }
        if let Ok(mut trace) = self.last_trace.lock() {
            *trace = std::mem::take(&mut state.trace);
        }
        if let Err(err) = &result {
            crate::error!("execution failed: {}", err);
        }
        result
    }
}

/// Storage key of a constant `Enter`: the context its input resolved under,
/// so a value captured through several nested frames stays visible to every
/// iteration of each of them.
fn constant_enter_key(node: &Node, state: &CallState) -> Option<String> {
    let constant = node.kind == NodeKind::Control(ControlOp::Enter)
        && node.attr_bool("is_constant").unwrap_or(false);
    if !constant {
        return None;
    }
    let (source, _) = parse_node_name(node.input_names.first()?);
    let context_id = state
        .tensors
        .context_of(source, &state.ctx)
        .unwrap_or_else(|| state.ctx.current_context_id());
    Some(storage_key(&node.name, context_id))
}

impl std::fmt::Debug for GraphExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphExecutor")
            .field("nodes", &self.graph.len())
            .field("weights", &self.weights.len())
            .field("options", &self.options)
            .finish()
    }
}

/// Key every output tensor by the name it was requested under.
pub fn name_outputs(names: &[String], tensors: Vec<Tensor>) -> Result<HashMap<String, Tensor>> {
    if names.len() != tensors.len() {
        return Err(anyhow!(
            "expected {} outputs, got {}",
            names.len(),
            tensors.len()
        ));
    }
    Ok(names.iter().cloned().zip(tensors).collect())
}
