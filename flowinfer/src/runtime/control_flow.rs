//! Evaluation of the control ops the engine owns: loop/branch primitives,
//! which mutate the execution context, and the indexed-array ops, which act
//! on arrays the context owns.
//!
//! Pass-through values are returned as forks so that releasing the producer
//! never invalidates the consumer's copy.
use anyhow::Result;

use crate::graph::{ControlOp, Node};
use crate::runtime::context::ExecutionContext;
use crate::runtime::evaluator::{NodeOutputs, OpInputs};
use crate::runtime::tensor_array::{TensorArray, TensorArraySpec};
use crate::runtime::value_eval::{index_list, scalar_bool, scalar_i32, scalar_index};
use crate::tensor::{DType, Tensor};

pub fn eval_control(
    op: ControlOp,
    node: &Node,
    inputs: &OpInputs,
    ctx: &mut ExecutionContext,
) -> Result<NodeOutputs> {
    match op {
        ControlOp::Switch => {
            let data = inputs.get(node, 0)?;
            let pred = scalar_bool(inputs.get(node, 1)?)?;
            let routed = data.fork()?;
            if pred {
                Ok(vec![None, Some(routed)])
            } else {
                Ok(vec![Some(routed), None])
            }
        }
        ControlOp::Merge => match inputs.values().iter().flatten().next() {
            Some(first) => Ok(vec![Some(first.fork()?)]),
            None => Ok(vec![None]),
        },
        ControlOp::Enter => {
            let data = inputs.get(node, 0)?.fork()?;
            let frame = node.attr_str("frame_name").unwrap_or_default();
            ctx.enter_frame(frame);
            Ok(vec![Some(data)])
        }
        ControlOp::Exit => {
            let data = inputs.get(node, 0)?.fork()?;
            ctx.exit_frame()?;
            Ok(vec![Some(data)])
        }
        ControlOp::NextIteration => {
            let data = inputs.get(node, 0)?.fork()?;
            ctx.next_iteration()?;
            Ok(vec![Some(data)])
        }
        ControlOp::LoopCond => Ok(vec![Some(inputs.get(node, 0)?.fork()?)]),
        _ => eval_array_op(op, node, inputs, ctx),
    }
}

fn eval_array_op(
    op: ControlOp,
    node: &Node,
    inputs: &OpInputs,
    ctx: &mut ExecutionContext,
) -> Result<NodeOutputs> {
    if op == ControlOp::TensorArray {
        let spec = TensorArraySpec {
            name: node.attr_str("name").unwrap_or(&node.name).to_string(),
            dtype: node.attr_dtype("dtype").unwrap_or(DType::F32),
            size: scalar_index(inputs.get(node, 0)?)?,
            element_shape: node.attr_int_list("element_shape").map(<[i64]>::to_vec),
            dynamic_size: node.attr_bool("dynamic_size").unwrap_or(false),
            clear_after_read: node.attr_bool("clear_after_read").unwrap_or(true),
            identical_element_shapes: node.attr_bool("identical_element_shapes").unwrap_or(false),
        };
        let handle = ctx.add_array(TensorArray::new(spec));
        crate::trace_full!("{} created indexed array {}", node.name, handle);
        return Ok(vec![
            Some(Tensor::scalar_i32(handle)),
            Some(Tensor::scalar_f32(1.0)),
        ]);
    }

    let handle_tensor = inputs.get(node, 0)?;
    let handle = scalar_i32(handle_tensor)?;
    let array = ctx.array_mut(handle)?;
    let returned_handle = || handle_tensor.fork().map(|tensor| vec![Some(tensor)]);
    match op {
        ControlOp::TensorArrayWrite => {
            let index = scalar_index(inputs.get(node, 1)?)?;
            array.write(index, inputs.get(node, 2)?)?;
            returned_handle()
        }
        ControlOp::TensorArrayRead => {
            let index = scalar_index(inputs.get(node, 1)?)?;
            Ok(vec![Some(array.read(index)?)])
        }
        ControlOp::TensorArrayGather => {
            let indices = inputs.optional(1).map(index_list).transpose()?;
            let gathered = array.gather(indices.as_deref(), node.attr_dtype("dtype"))?;
            Ok(vec![Some(gathered)])
        }
        ControlOp::TensorArrayScatter => {
            let indices = index_list(inputs.get(node, 1)?)?;
            array.scatter(&indices, inputs.get(node, 2)?)?;
            returned_handle()
        }
        ControlOp::TensorArrayConcat => {
            let joined = array.concat(node.attr_dtype("dtype"))?;
            Ok(vec![Some(joined)])
        }
        ControlOp::TensorArraySplit => {
            let value = inputs.get(node, 1)?;
            match inputs.optional(2) {
                Some(lengths) => array.split(&index_list(lengths)?, value)?,
                None => {
                    // one row per slot
                    let rows: Vec<usize> = (0..value.shape().first().copied().unwrap_or(0)).collect();
                    array.scatter(&rows, value)?
                }
            }
            returned_handle()
        }
        ControlOp::TensorArraySize => Ok(vec![Some(Tensor::scalar_i32(array.size() as i32))]),
        ControlOp::TensorArrayClose => {
            array.clear_and_close();
            returned_handle()
        }
        _ => Err(anyhow::anyhow!(
            "{} is not an indexed array op (node {})",
            op,
            node.name
        )),
    }
}
