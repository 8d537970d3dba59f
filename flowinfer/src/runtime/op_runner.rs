use std::collections::HashSet;

use anyhow::{anyhow, Result};

use crate::graph::{Node, NodeKind};
use crate::runtime::context::ExecutionContext;
use crate::runtime::control_flow::eval_control;
use crate::runtime::evaluator::{unsupported, Evaluation, NodeOutputs, OpEvaluator, OpInputs};
use crate::runtime::registry::registered_op;

/// Route one node to its handler: control ops and custom ops run here,
/// everything else goes to the evaluator.
pub fn run_node<'a>(
    node: &'a Node,
    inputs: OpInputs,
    ctx: &mut ExecutionContext,
    evaluator: &'a dyn OpEvaluator,
) -> Result<Evaluation<'a>> {
    match node.kind {
        NodeKind::Control(op) => Ok(Evaluation::Ready(eval_control(op, node, &inputs, ctx)?)),
        NodeKind::Custom => {
            let op = registered_op(&node.op).ok_or_else(|| unsupported(node))?;
            Ok(Evaluation::Ready(op.execute(node, &inputs)?))
        }
        NodeKind::Placeholder => Err(anyhow!("placeholder {} was not supplied", node.name)),
        NodeKind::Const => Err(anyhow!("weight {} has no buffer", node.name)),
        NodeKind::DynamicShape | NodeKind::Op => evaluator.evaluate(node, inputs),
    }
}

/// Fork any output that reuses an input handle, so that every stored tensor
/// has its own identity for consumer counting.
pub fn detach_outputs(outputs: NodeOutputs, input_ids: &HashSet<u64>) -> Result<NodeOutputs> {
    outputs
        .into_iter()
        .map(|slot| match slot {
            Some(tensor) if input_ids.contains(&tensor.id()) => tensor.fork().map(Some),
            other => Ok(other),
        })
        .collect()
}
