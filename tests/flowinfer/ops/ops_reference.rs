use std::sync::Arc;

use anyhow::Result;
use flowinfer::{
    broadcast_shape, concat, deregister_op, evaluate_node, register_op, registered_op, stack,
    unstack, AttrValue, DType, ExecError, Graph, GraphBuilder, Node, NodeDef, NodeKind,
    NodeOutputs, OpInputs, Tensor,
};

use crate::common::{self, op, placeholder};

/// A graph holding the single node `def`, fed by placeholders `a` and `b`.
fn single_node(def: NodeDef) -> Result<Graph> {
    GraphBuilder::new()
        .node(placeholder("a"))
        .node(placeholder("b"))
        .node(def)
        .build()
}

fn run(def: NodeDef, values: Vec<Tensor>) -> Result<Tensor> {
    let graph = single_node(def)?;
    let node = graph.nodes().last().expect("node under test");
    let inputs = OpInputs::new(values.into_iter().map(Some).collect(), "");
    let outputs = evaluate_node(node, &inputs)?;
    outputs
        .into_iter()
        .next()
        .flatten()
        .ok_or_else(|| anyhow::anyhow!("no output"))
}

#[test]
fn binary_ops_broadcast() -> Result<()> {
    let a = Tensor::from_f32(vec![1.0, 5.0, 3.0, 8.0], vec![2, 2])?;
    let b = Tensor::from_f32(vec![2.0, 4.0], vec![2])?;

    let max = run(op("m", "Maximum", &["a", "b"]), vec![a.clone(), b.clone()])?;
    assert_eq!(max.to_f32_vec()?, vec![2.0, 5.0, 3.0, 8.0]);
    let min = run(op("m", "Minimum", &["a", "b"]), vec![a.clone(), b.clone()])?;
    assert_eq!(min.to_f32_vec()?, vec![1.0, 4.0, 2.0, 4.0]);
    let sub = run(op("s", "Sub", &["a", "b"]), vec![a.clone(), b.clone()])?;
    assert_eq!(sub.to_f32_vec()?, vec![-1.0, 1.0, 1.0, 4.0]);

    let greater = run(op("g", "Greater", &["a", "b"]), vec![a, b])?;
    assert_eq!(greater.dtype(), DType::Bool);
    assert_eq!(greater.shape(), &[2, 2]);
    assert_eq!(greater.to_bool_vec()?, vec![false, true, true, true]);
    Ok(())
}

#[test]
fn integer_arithmetic_stays_integer() -> Result<()> {
    let a = Tensor::from_i32(vec![7, -2], vec![2])?;
    let b = Tensor::scalar_i32(3);
    let product = run(op("p", "Mul", &["a", "b"]), vec![a.clone(), b.clone()])?;
    assert_eq!(product.dtype(), DType::I32);
    assert_eq!(product.to_i32_vec()?, vec![21, -6]);
    let equal = run(op("e", "Equal", &["a", "b"]), vec![a, Tensor::scalar_i32(7)])?;
    assert_eq!(equal.to_bool_vec()?, vec![true, false]);
    Ok(())
}

#[test]
fn mixed_dtypes_are_rejected() -> Result<()> {
    let err = run(
        op("bad", "Add", &["a", "b"]),
        vec![Tensor::scalar_f32(1.0), Tensor::scalar_i32(1)],
    )
    .expect_err("f32 + i32");
    assert!(err.to_string().contains("does not match"));
    Ok(())
}

#[test]
fn unary_and_shape_ops() -> Result<()> {
    let mask = Tensor::from_bool(vec![true, false, false, true], vec![2, 2])?;
    let inverted = run(op("n", "LogicalNot", &["a"]), vec![mask.clone()])?;
    assert_eq!(inverted.to_bool_vec()?, vec![false, true, true, false]);

    let cast = run(
        op("c", "Cast", &["a"]).attr("dtype", AttrValue::DType(DType::F32)),
        vec![mask.clone()],
    )?;
    assert_eq!(cast.dtype(), DType::F32);
    assert_eq!(cast.to_f32_vec()?, vec![1.0, 0.0, 0.0, 1.0]);

    let rank = run(op("r", "Rank", &["a"]), vec![mask.clone()])?;
    assert_eq!(rank.to_i32_vec()?, vec![2]);
    let size = run(op("s", "Size", &["a"]), vec![mask.clone()])?;
    assert_eq!(size.to_i32_vec()?, vec![4]);

    let coords = run(op("w", "Where", &["a"]), vec![mask])?;
    assert_eq!(coords.shape(), &[2, 2]);
    assert_eq!(coords.to_i32_vec()?, vec![0, 0, 1, 1]);
    Ok(())
}

#[test]
fn cast_without_dtype_fails() -> Result<()> {
    assert!(run(op("c", "Cast", &["a"]), vec![Tensor::scalar_f32(1.0)]).is_err());
    Ok(())
}

#[test]
fn unknown_ops_are_unsupported() -> Result<()> {
    let err = run(op("u", "Conv2D", &["a"]), vec![Tensor::scalar_f32(1.0)])
        .expect_err("not a reference op");
    assert_eq!(
        common::exec_error(&err)?,
        &ExecError::UnsupportedOperation {
            node: "u".to_string(),
            op: "Conv2D".to_string(),
        }
    );
    Ok(())
}

#[test]
fn broadcast_shapes_align_from_the_right() -> Result<()> {
    assert_eq!(broadcast_shape(&[2, 1], &[3])?, vec![2, 3]);
    assert_eq!(broadcast_shape(&[], &[4, 2])?, vec![4, 2]);
    assert!(broadcast_shape(&[2], &[3]).is_err());
    Ok(())
}

#[test]
fn stack_and_unstack_mirror_each_other() -> Result<()> {
    let rows = vec![
        Tensor::from_f32(vec![1.0, 2.0], vec![2])?,
        Tensor::from_f32(vec![3.0, 4.0], vec![2])?,
    ];
    let stacked = stack(&rows)?;
    assert_eq!(stacked.shape(), &[2, 2]);
    let back = unstack(&stacked)?;
    assert_eq!(back, rows);

    let joined = concat(&[stacked.clone(), stacked])?;
    assert_eq!(joined.shape(), &[4, 2]);
    assert!(stack(&[]).is_err());
    assert!(unstack(&Tensor::scalar_f32(1.0)).is_err());
    Ok(())
}

#[test]
fn registered_ops_run_instead_of_the_evaluator() -> Result<()> {
    let times_ten = |node: &Node, inputs: &OpInputs| -> Result<NodeOutputs> {
        let x = inputs.get(node, 0)?;
        let values = x.to_f32_vec()?.into_iter().map(|v| v * 10.0).collect();
        Ok(vec![Some(Tensor::from_f32(values, x.shape().to_vec())?)])
    };
    register_op("TestTimesTen", Arc::new(times_ten));
    assert!(registered_op("TestTimesTen").is_some());

    let graph = GraphBuilder::new()
        .node(placeholder("x"))
        .node(op("y", "TestTimesTen", &["x"]))
        .build()?;
    assert_eq!(graph.get("y").map(|n| n.kind), Some(NodeKind::Custom));
    let exec = common::reference_executor(graph, Default::default());
    let inputs = common::weights(&[("x", Tensor::scalar_f32(1.5))]);
    let outputs = exec.execute(&inputs, true, &[])?;
    assert_eq!(common::scalar(&outputs[0])?, 15.0);

    assert!(deregister_op("TestTimesTen"));
    assert!(!deregister_op("TestTimesTen"));
    let err = exec
        .execute(&inputs, true, &[])
        .expect_err("the op is gone");
    assert!(matches!(
        common::exec_error(&err)?,
        ExecError::UnsupportedOperation { .. }
    ));
    Ok(())
}
