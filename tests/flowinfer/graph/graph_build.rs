use anyhow::Result;
use flowinfer::{
    describe_node, parse_node_name, AttrValue, ControlOp, GraphBuilder, GraphDeserialize,
    GraphSerialize, NodeKind, OpCategory,
};

use crate::common::{self, op, placeholder, weight};

#[test]
fn parse_node_name_splits_output_index() {
    assert_eq!(parse_node_name("a"), ("a", 0));
    assert_eq!(parse_node_name("a:2"), ("a", 2));
    assert_eq!(parse_node_name("^ctrl"), ("ctrl", 0));
    assert_eq!(parse_node_name("scope/a:1"), ("scope/a", 1));
    assert_eq!(parse_node_name("odd:name"), ("odd:name", 0));
}

#[test]
fn builder_resolves_edges_and_sets() -> Result<()> {
    let graph = common::add_chain_graph()?;
    assert_eq!(graph.len(), 4);
    assert_eq!(graph.placeholder_names(), vec!["input"]);
    assert_eq!(graph.names(graph.weights()), vec!["const"]);
    assert_eq!(graph.output_names(), vec!["output"]);

    let constant = graph.get("const").expect("const node");
    let consumers = graph.names(&constant.children);
    assert_eq!(consumers, vec!["intermediate", "output"]);

    let output = graph.get("output").expect("output node");
    assert_eq!(graph.names(&output.inputs), vec!["intermediate", "const"]);
    assert_eq!(output.kind, NodeKind::Op);
    assert_eq!(output.category, OpCategory::Compute);
    assert!(!graph.has_control_flow());
    assert!(!graph.has_dynamic_shape());
    Ok(())
}

#[test]
fn children_count_every_consuming_edge() -> Result<()> {
    let graph = GraphBuilder::new()
        .node(placeholder("x"))
        .node(op("square", "Mul", &["x", "x"]))
        .build()?;
    let x = graph.get("x").expect("x node");
    assert_eq!(x.children.len(), 2);
    Ok(())
}

#[test]
fn op_tags_are_classified_once() -> Result<()> {
    let graph = common::counting_loop_graph()?;
    assert!(graph.has_control_flow());
    let merge = graph.get("merge").expect("merge node");
    assert_eq!(merge.kind, NodeKind::Control(ControlOp::Merge));
    assert_eq!(merge.category, OpCategory::Control);
    assert!(merge.is_dynamic());
    let cond = graph.get("cond").expect("cond node");
    assert!(cond.is_control());
    assert!(!cond.is_dynamic());
    assert_eq!(graph.get("limit").map(|n| n.kind), Some(NodeKind::Const));

    let dynamic = GraphBuilder::new()
        .node(placeholder("mask"))
        .node(op("idx", "Where", &["mask"]))
        .build()?;
    assert!(dynamic.has_dynamic_shape());
    assert_eq!(dynamic.get("idx").map(|n| n.kind), Some(NodeKind::DynamicShape));
    Ok(())
}

#[test]
fn builder_rejects_duplicates_and_unknown_inputs() {
    let duplicate = GraphBuilder::new()
        .node(placeholder("x"))
        .node(placeholder("x"))
        .build();
    assert!(duplicate.is_err());

    let dangling = GraphBuilder::new()
        .node(op("y", "Identity", &["missing"]))
        .build();
    let err = dangling.err().expect("unknown input must fail");
    assert!(err.to_string().contains("missing"));

    let bad_output = GraphBuilder::new()
        .node(placeholder("x"))
        .outputs(["nope"])
        .build();
    assert!(bad_output.is_err());
}

#[test]
fn serialize_roundtrip_keeps_definitions() -> Result<()> {
    let graph = common::counting_loop_graph()?;
    let json = GraphSerialize::json(&graph)?;
    let restored = GraphDeserialize::from_json(json)?;
    assert_eq!(restored.node_defs(), graph.node_defs());
    assert_eq!(restored.output_names(), graph.output_names());
    let enter = restored.get("enter_limit").expect("enter node");
    assert_eq!(enter.attr_bool("is_constant"), Some(true));
    assert_eq!(enter.attr_str("frame_name"), Some("count"));
    Ok(())
}

#[test]
fn deserialize_accepts_minimal_documents() -> Result<()> {
    let json = serde_json::json!({
        "nodes": [
            { "name": "x", "op": "Placeholder", "attrs": { "shape": { "int_list": [-1, 3] } } },
            { "name": "w", "op": "Const" },
            { "name": "y", "op": "Mul", "inputs": ["x", "w"] }
        ]
    });
    let graph = GraphDeserialize::from_json(json)?;
    assert_eq!(graph.output_names(), vec!["y"]);
    let x = graph.get("x").expect("x node");
    assert_eq!(x.attr("shape"), Some(&AttrValue::IntList(vec![-1, 3])));
    Ok(())
}

#[test]
fn describe_node_renders_kind() -> Result<()> {
    let graph = GraphBuilder::new()
        .node(placeholder("x"))
        .node(weight("w"))
        .node(op("y", "Add", &["x", "w"]))
        .node(op("e", "Exit", &["y"]))
        .build()?;
    let described: Vec<String> = graph.nodes().iter().map(describe_node).collect();
    assert_eq!(
        described,
        vec![
            "placeholder x".to_string(),
            "const w".to_string(),
            "op Add(x,w) >> y".to_string(),
            "control Exit(y) >> e".to_string(),
        ]
    );
    Ok(())
}
