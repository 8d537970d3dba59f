#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use flowinfer::{
    evaluate_node, AttrValue, DType, Evaluation, ExecError, ExecutorOptions, Graph, GraphBuilder,
    GraphExecutor, NamedTensors, Node, NodeDef, OpEvaluator, OpInputs, ReferenceEvaluator, Tensor,
};

pub fn traced() -> ExecutorOptions {
    ExecutorOptions {
        trace_enabled: true,
        timer_enabled: false,
    }
}

pub fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

pub fn op(name: &str, op: &str, inputs: &[&str]) -> NodeDef {
    NodeDef::new(name, op).inputs(inputs.iter().copied())
}

pub fn placeholder(name: &str) -> NodeDef {
    NodeDef::new(name, "Placeholder")
}

pub fn weight(name: &str) -> NodeDef {
    NodeDef::new(name, "Const")
}

pub fn enter(name: &str, input: &str, frame: &str, constant: bool) -> NodeDef {
    op(name, "Enter", &[input])
        .attr("frame_name", AttrValue::Str(frame.to_string()))
        .attr("is_constant", AttrValue::Bool(constant))
}

pub fn weights(items: &[(&str, Tensor)]) -> NamedTensors {
    items
        .iter()
        .map(|(name, tensor)| (name.to_string(), tensor.clone()))
        .collect()
}

pub fn scalar(tensor: &Tensor) -> Result<f32> {
    match tensor.to_f32_vec()?.as_slice() {
        [value] => Ok(*value),
        other => Err(anyhow!("expected a single value, got {:?}", other)),
    }
}

pub fn exec_error(err: &anyhow::Error) -> Result<&ExecError> {
    err.downcast_ref::<ExecError>()
        .ok_or_else(|| anyhow!("expected an ExecError, got: {}", err))
}

/// `input` (placeholder), `const = 2.0`, `intermediate = input + const`,
/// `output = intermediate + const`.
pub fn add_chain_graph() -> Result<Graph> {
    GraphBuilder::new()
        .node(
            placeholder("input")
                .attr("shape", AttrValue::IntList(vec![]))
                .attr("dtype", AttrValue::DType(DType::F32)),
        )
        .node(weight("const"))
        .node(op("intermediate", "Add", &["input", "const"]))
        .node(op("output", "Add", &["intermediate", "const"]))
        .build()
}

pub fn add_chain_weights() -> NamedTensors {
    weights(&[("const", Tensor::scalar_f32(2.0))])
}

/// Counts `x` up by one until it reaches `limit`:
/// `while x < limit { x = x + one }`, returned through `exit`.
pub fn counting_loop_graph() -> Result<Graph> {
    GraphBuilder::new()
        .node(placeholder("x"))
        .node(weight("limit"))
        .node(weight("one"))
        .node(enter("enter_x", "x", "count", false))
        .node(enter("enter_limit", "limit", "count", true))
        .node(enter("enter_one", "one", "count", true))
        .node(op("merge", "Merge", &["enter_x", "next"]))
        .node(op("less", "Less", &["merge", "enter_limit"]))
        .node(op("cond", "LoopCond", &["less"]))
        .node(op("switch", "Switch", &["merge", "cond"]))
        .node(op("body", "Identity", &["switch:1"]))
        .node(op("add", "Add", &["body", "enter_one"]))
        .node(op("next", "NextIteration", &["add"]))
        .node(op("exit", "Exit", &["switch:0"]))
        .outputs(["exit"])
        .build()
}

pub fn counting_loop_weights(limit: f32) -> NamedTensors {
    weights(&[
        ("limit", Tensor::scalar_f32(limit)),
        ("one", Tensor::scalar_f32(1.0)),
    ])
}

/// Two nested loops adding `one` to `acc`, three inner iterations per outer
/// iteration and two outer iterations. `one` and `inner_limit` are captured
/// from the root through a constant `Enter` into each frame.
pub fn nested_loop_graph() -> Result<Graph> {
    GraphBuilder::new()
        .node(placeholder("acc"))
        .node(weight("zero"))
        .node(weight("one"))
        .node(weight("outer_limit"))
        .node(weight("inner_limit"))
        .node(enter("o_i_enter", "zero", "outer", false))
        .node(enter("o_acc_enter", "acc", "outer", false))
        .node(enter("o_one", "one", "outer", true))
        .node(enter("o_lim", "outer_limit", "outer", true))
        .node(enter("o_ilim", "inner_limit", "outer", true))
        .node(op("o_i_merge", "Merge", &["o_i_enter", "o_i_next"]))
        .node(op("o_acc_merge", "Merge", &["o_acc_enter", "o_acc_next"]))
        .node(op("o_less", "Less", &["o_i_merge", "o_lim"]))
        .node(op("o_cond", "LoopCond", &["o_less"]))
        .node(op("o_i_sw", "Switch", &["o_i_merge", "o_cond"]))
        .node(op("o_acc_sw", "Switch", &["o_acc_merge", "o_cond"]))
        .node(op("o_i_body", "Identity", &["o_i_sw:1"]))
        .node(op("o_i_inc", "Add", &["o_i_body", "o_one"]))
        .node(op("o_i_next", "NextIteration", &["o_i_inc"]))
        .node(op("j_start", "Sub", &["o_i_body", "o_i_body"]))
        .node(enter("i_j_enter", "j_start", "inner", false))
        .node(enter("i_acc_enter", "o_acc_sw:1", "inner", false))
        .node(enter("i_one", "o_one", "inner", true))
        .node(enter("i_lim", "o_ilim", "inner", true))
        .node(op("i_j_merge", "Merge", &["i_j_enter", "i_j_next"]))
        .node(op("i_acc_merge", "Merge", &["i_acc_enter", "i_acc_next"]))
        .node(op("i_less", "Less", &["i_j_merge", "i_lim"]))
        .node(op("i_cond", "LoopCond", &["i_less"]))
        .node(op("i_j_sw", "Switch", &["i_j_merge", "i_cond"]))
        .node(op("i_acc_sw", "Switch", &["i_acc_merge", "i_cond"]))
        .node(op("i_j_inc", "Add", &["i_j_sw:1", "i_one"]))
        .node(op("i_acc_inc", "Add", &["i_acc_sw:1", "i_one"]))
        .node(op("i_j_next", "NextIteration", &["i_j_inc"]))
        .node(op("i_acc_next", "NextIteration", &["i_acc_inc"]))
        .node(op("i_acc_exit", "Exit", &["i_acc_sw:0"]))
        .node(op("o_acc_next", "NextIteration", &["i_acc_exit"]))
        .node(op("o_acc_exit", "Exit", &["o_acc_sw:0"]))
        .outputs(["o_acc_exit"])
        .build()
}

pub fn nested_loop_weights(outer: f32, inner: f32) -> NamedTensors {
    weights(&[
        ("zero", Tensor::scalar_f32(0.0)),
        ("one", Tensor::scalar_f32(1.0)),
        ("outer_limit", Tensor::scalar_f32(outer)),
        ("inner_limit", Tensor::scalar_f32(inner)),
    ])
}

/// The counting loop writing each counter value `i` into slot `i` of an
/// indexed array. The array's flow value is carried through the loop so that
/// `gathered = gather(ta, order)` only runs after the last write.
pub fn array_loop_graph() -> Result<Graph> {
    GraphBuilder::new()
        .node(placeholder("x"))
        .node(weight("limit"))
        .node(weight("one"))
        .node(weight("size"))
        .node(weight("order"))
        .node(op("ta", "TensorArrayV3", &["size"]).attr("dtype", AttrValue::DType(DType::F32)))
        .node(enter("enter_x", "x", "count", false))
        .node(enter("enter_flow", "ta:1", "count", false))
        .node(enter("enter_ta", "ta", "count", true))
        .node(enter("enter_limit", "limit", "count", true))
        .node(enter("enter_one", "one", "count", true))
        .node(op("merge", "Merge", &["enter_x", "next"]))
        .node(op("flow_merge", "Merge", &["enter_flow", "flow_next"]))
        .node(op("less", "Less", &["merge", "enter_limit"]))
        .node(op("cond", "LoopCond", &["less"]))
        .node(op("switch", "Switch", &["merge", "cond"]))
        .node(op("flow_switch", "Switch", &["flow_merge", "cond"]))
        .node(op("body", "Identity", &["switch:1"]))
        .node(op(
            "write",
            "TensorArrayWriteV3",
            &["enter_ta", "body", "body", "flow_switch:1"],
        ))
        .node(op("add", "Add", &["body", "enter_one"]))
        .node(op("next", "NextIteration", &["add"]))
        .node(op("flow_next", "NextIteration", &["write"]))
        .node(op("exit", "Exit", &["switch:0"]))
        .node(op("flow_exit", "Exit", &["flow_switch:0"]))
        .node(op("gathered", "TensorArrayGatherV3", &["ta", "order", "flow_exit"]))
        .outputs(["gathered", "exit"])
        .build()
}

pub fn array_loop_weights(order: Vec<i32>) -> Result<NamedTensors> {
    let len = order.len();
    Ok(weights(&[
        ("limit", Tensor::scalar_f32(len as f32)),
        ("one", Tensor::scalar_f32(1.0)),
        ("size", Tensor::scalar_i32(len as i32)),
        ("order", Tensor::from_i32(order, vec![len])?),
    ]))
}

/// `m = Merge(x * two, x + one)` with `Switch(x, pred)` choosing the branch.
pub fn branch_graph() -> Result<Graph> {
    GraphBuilder::new()
        .node(placeholder("x"))
        .node(placeholder("pred"))
        .node(weight("one"))
        .node(weight("two"))
        .node(op("sw", "Switch", &["x", "pred"]))
        .node(op("doubled", "Mul", &["sw:0", "two"]))
        .node(op("incremented", "Add", &["sw:1", "one"]))
        .node(op("m", "Merge", &["doubled", "incremented"]))
        .outputs(["m"])
        .build()
}

pub fn branch_weights() -> NamedTensors {
    weights(&[
        ("one", Tensor::scalar_f32(1.0)),
        ("two", Tensor::scalar_f32(2.0)),
    ])
}

pub fn reference_executor(graph: Graph, weights: NamedTensors) -> GraphExecutor {
    GraphExecutor::with_options(graph, weights, Arc::new(ReferenceEvaluator::new()), traced())
}

/// Reference evaluator that counts calls and keeps every tensor it produced.
#[derive(Default)]
pub struct SpyEvaluator {
    calls: AtomicUsize,
    produced: Mutex<Vec<(String, Tensor)>>,
}

impl SpyEvaluator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn produced(&self, name: &str) -> Result<Tensor> {
        let produced = self
            .produced
            .lock()
            .map_err(|_| anyhow!("spy lock poisoned"))?;
        produced
            .iter()
            .find(|(node, _)| node == name)
            .map(|(_, tensor)| tensor.clone())
            .ok_or_else(|| anyhow!("{} was never evaluated", name))
    }
}

impl OpEvaluator for SpyEvaluator {
    fn evaluate<'a>(&'a self, node: &'a Node, inputs: OpInputs) -> Result<Evaluation<'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outputs = evaluate_node(node, &inputs)?;
        if let Some(Some(tensor)) = outputs.first() {
            self.produced
                .lock()
                .map_err(|_| anyhow!("spy lock poisoned"))?
                .push((node.name.clone(), tensor.clone()));
        }
        Ok(Evaluation::Ready(outputs))
    }
}
