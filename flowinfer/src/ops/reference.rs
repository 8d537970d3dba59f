//! Small CPU evaluator for graph and elementwise ops.
use std::collections::HashSet;

use anyhow::{anyhow, Result};

use super::broadcast::{broadcast_map, broadcast_shape};
use crate::graph::Node;
use crate::runtime::{unsupported, Evaluation, NodeOutputs, OpEvaluator, OpInputs};
use crate::tensor::{DType, Tensor, TensorData};

#[derive(Debug, Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Max,
    Min,
}

#[derive(Debug, Clone, Copy)]
enum Compare {
    Less,
    Greater,
    Equal,
}

/// Evaluates `Identity`, `Add`/`AddV2`, `Sub`, `Mul`, `Maximum`, `Minimum`,
/// `Less`, `Greater`, `Equal`, `LogicalNot`, `Cast`, `Shape`, `Rank`, `Size`
/// and `Where`. Binary ops broadcast.
///
/// Ops listed with [`ReferenceEvaluator::with_pending`] return a pending
/// result instead of a ready one.
#[derive(Debug, Clone, Default)]
pub struct ReferenceEvaluator {
    pending_ops: HashSet<String>,
}

impl ReferenceEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pending(mut self, op: impl Into<String>) -> Self {
        self.pending_ops.insert(op.into());
        self
    }
}

impl OpEvaluator for ReferenceEvaluator {
    fn evaluate<'a>(&'a self, node: &'a Node, inputs: OpInputs) -> Result<Evaluation<'a>> {
        if self.pending_ops.contains(&node.op) {
            return Ok(Evaluation::Pending(Box::pin(async move {
                evaluate_node(node, &inputs)
            })));
        }
        Ok(Evaluation::Ready(evaluate_node(node, &inputs)?))
    }
}

pub fn evaluate_node(node: &Node, inputs: &OpInputs) -> Result<NodeOutputs> {
    let output = match node.op.as_str() {
        "Identity" => inputs.get(node, 0)?.fork()?,
        "Add" | "AddV2" => arith(node, inputs, Arith::Add)?,
        "Sub" => arith(node, inputs, Arith::Sub)?,
        "Mul" => arith(node, inputs, Arith::Mul)?,
        "Maximum" => arith(node, inputs, Arith::Max)?,
        "Minimum" => arith(node, inputs, Arith::Min)?,
        "Less" => compare(node, inputs, Compare::Less)?,
        "Greater" => compare(node, inputs, Compare::Greater)?,
        "Equal" => compare(node, inputs, Compare::Equal)?,
        "LogicalNot" => {
            let x = inputs.get(node, 0)?;
            let values = x.to_bool_vec()?.into_iter().map(|v| !v).collect();
            Tensor::from_bool(values, x.shape().to_vec())?
        }
        "Cast" => {
            let x = inputs.get(node, 0)?;
            let dtype = node
                .attr_dtype("dtype")
                .ok_or_else(|| anyhow!("Cast node {} has no dtype attribute", node.name))?;
            cast(x, dtype)?
        }
        "Shape" => {
            let x = inputs.get(node, 0)?;
            let dims = x.shape().iter().map(|dim| *dim as i32).collect();
            Tensor::from_i32(dims, vec![x.rank()])?
        }
        "Rank" => Tensor::scalar_i32(inputs.get(node, 0)?.rank() as i32),
        "Size" => Tensor::scalar_i32(inputs.get(node, 0)?.len() as i32),
        "Where" => where_true(inputs.get(node, 0)?)?,
        _ => return Err(unsupported(node)),
    };
    Ok(vec![Some(output)])
}

fn binary_inputs<'a>(node: &Node, inputs: &'a OpInputs) -> Result<(&'a Tensor, &'a Tensor, Vec<usize>)> {
    let lhs = inputs.get(node, 0)?;
    let rhs = inputs.get(node, 1)?;
    if lhs.dtype() != rhs.dtype() {
        return Err(anyhow!(
            "{} ({}): dtype {} does not match {}",
            node.name,
            node.op,
            lhs.dtype(),
            rhs.dtype()
        ));
    }
    let shape = broadcast_shape(lhs.shape(), rhs.shape())?;
    Ok((lhs, rhs, shape))
}

fn arith(node: &Node, inputs: &OpInputs, op: Arith) -> Result<Tensor> {
    let (lhs, rhs, shape) = binary_inputs(node, inputs)?;
    let (a, b) = (lhs.data()?, rhs.data()?);
    let data = match (a.as_ref(), b.as_ref()) {
        (TensorData::F32(a), TensorData::F32(b)) => TensorData::F32(broadcast_map(
            (a.as_slice(), lhs.shape()),
            (b.as_slice(), rhs.shape()),
            &shape,
            |x, y| match op {
                Arith::Add => x + y,
                Arith::Sub => x - y,
                Arith::Mul => x * y,
                Arith::Max => x.max(y),
                Arith::Min => x.min(y),
            },
        )),
        (TensorData::I32(a), TensorData::I32(b)) => TensorData::I32(broadcast_map(
            (a.as_slice(), lhs.shape()),
            (b.as_slice(), rhs.shape()),
            &shape,
            |x, y| match op {
                Arith::Add => x.wrapping_add(y),
                Arith::Sub => x.wrapping_sub(y),
                Arith::Mul => x.wrapping_mul(y),
                Arith::Max => x.max(y),
                Arith::Min => x.min(y),
            },
        )),
        _ => {
            return Err(anyhow!(
                "{} ({}) does not support dtype {}",
                node.name,
                node.op,
                lhs.dtype()
            ))
        }
    };
    Tensor::new(data, shape)
}

fn compare(node: &Node, inputs: &OpInputs, op: Compare) -> Result<Tensor> {
    let (lhs, rhs, shape) = binary_inputs(node, inputs)?;
    let a = lhs.to_f32_vec()?;
    let b = rhs.to_f32_vec()?;
    let values = broadcast_map((a.as_slice(), lhs.shape()), (b.as_slice(), rhs.shape()), &shape, |x, y| match op {
        Compare::Less => x < y,
        Compare::Greater => x > y,
        Compare::Equal => x == y,
    });
    Tensor::from_bool(values, shape)
}

fn cast(x: &Tensor, dtype: DType) -> Result<Tensor> {
    let shape = x.shape().to_vec();
    match dtype {
        DType::F32 => Tensor::from_f32(x.to_f32_vec()?, shape),
        DType::I32 => Tensor::from_i32(x.to_i32_vec()?, shape),
        DType::Bool => Tensor::from_bool(x.to_bool_vec()?, shape),
    }
}

/// Coordinates of the true elements, shape `[count, rank]`.
fn where_true(x: &Tensor) -> Result<Tensor> {
    let values = x.to_bool_vec()?;
    let shape = x.shape();
    let mut coords = Vec::new();
    let mut count = 0;
    for (flat, value) in values.iter().enumerate() {
        if !value {
            continue;
        }
        count += 1;
        let mut rest = flat;
        let mut index = vec![0i32; shape.len()];
        for (axis, dim) in shape.iter().enumerate().rev() {
            index[axis] = (rest % dim) as i32;
            rest /= dim;
        }
        coords.extend(index);
    }
    Tensor::from_i32(coords, vec![count, shape.len()])
}
