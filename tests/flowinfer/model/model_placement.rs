use anyhow::Result;
use flowinfer::{Backend, DevicePlacement, GraphBuilder, PlacementSummary};

use crate::common::{self, op, placeholder};

#[test]
fn gpu_inputs_pull_their_consumers_onto_the_gpu() -> Result<()> {
    let mut graph = common::add_chain_graph()?;
    let summary = DevicePlacement::default().optimize(&mut graph);
    assert_eq!(
        summary,
        PlacementSummary {
            cpu: 1,
            gpu: 3,
            non_constant_cpu: 0,
        }
    );
    assert_eq!(graph.get("const").and_then(|n| n.placement), Some(Backend::Cpu));
    assert_eq!(graph.get("output").and_then(|n| n.placement), Some(Backend::Gpu));
    Ok(())
}

#[test]
fn cpu_inputs_keep_the_chain_on_the_cpu() -> Result<()> {
    let mut graph = common::add_chain_graph()?;
    let summary = DevicePlacement::new(Backend::Cpu).optimize(&mut graph);
    assert_eq!(summary.cpu, 4);
    assert_eq!(summary.gpu, 0);
    assert_eq!(summary.non_constant_cpu, 3);
    Ok(())
}

#[test]
fn shape_queries_run_on_the_cpu() -> Result<()> {
    let mut graph = GraphBuilder::new()
        .node(placeholder("x"))
        .node(op("s", "Shape", &["x"]))
        .node(op("twice", "Add", &["s", "s"]))
        .node(op("scaled", "Mul", &["x", "x"]))
        .build()?;
    DevicePlacement::default().optimize(&mut graph);
    let placed = |name: &str| graph.get(name).and_then(|n| n.placement);
    assert_eq!(placed("x"), Some(Backend::Gpu));
    assert_eq!(placed("s"), Some(Backend::Cpu));
    assert_eq!(placed("twice"), Some(Backend::Cpu));
    assert_eq!(placed("scaled"), Some(Backend::Gpu));
    Ok(())
}

#[test]
fn loops_are_placed_through_merge() -> Result<()> {
    let mut graph = common::counting_loop_graph()?;
    let summary = DevicePlacement::default().optimize(&mut graph);
    assert!(graph.nodes().iter().all(|node| node.placement.is_some()));
    assert_eq!(summary.cpu + summary.gpu, graph.len());
    assert_eq!(graph.get("cond").and_then(|n| n.placement), Some(Backend::Cpu));
    assert_eq!(graph.get("merge").and_then(|n| n.placement), Some(Backend::Gpu));
    Ok(())
}

#[test]
fn backends_parse_from_strings() -> Result<()> {
    assert_eq!("cpu".parse::<Backend>()?, Backend::Cpu);
    assert_eq!("gpu".parse::<Backend>()?, Backend::Gpu);
    assert!("tpu".parse::<Backend>().is_err());
    Ok(())
}
