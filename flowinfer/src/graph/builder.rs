use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::parse_node_name;
use super::{AttrValue, ControlOp, Node, NodeId, NodeKind, DYNAMIC_SHAPE_OPS};
use crate::runtime::registry::registered_op;

/// Wire-independent description of one node, as produced by a model loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    pub op: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,
}

impl NodeDef {
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            inputs: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(name.into(), value);
        self
    }
}

/// Normalized computation graph. Immutable once built apart from the
/// placement annotation.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    by_name: HashMap<String, NodeId>,
    placeholders: Vec<NodeId>,
    weights: Vec<NodeId>,
    outputs: Vec<NodeId>,
    has_control_flow: bool,
    has_dynamic_shape: bool,
}

impl Graph {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.find(name).map(|id| &self.nodes[id])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn placeholders(&self) -> &[NodeId] {
        &self.placeholders
    }

    pub fn weights(&self) -> &[NodeId] {
        &self.weights
    }

    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    pub fn placeholder_names(&self) -> Vec<String> {
        self.names(&self.placeholders)
    }

    pub fn output_names(&self) -> Vec<String> {
        self.names(&self.outputs)
    }

    pub fn names(&self, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|id| self.nodes[*id].name.clone()).collect()
    }

    pub fn has_control_flow(&self) -> bool {
        self.has_control_flow
    }

    pub fn has_dynamic_shape(&self) -> bool {
        self.has_dynamic_shape
    }

    /// Node definitions in arena order; rebuilding from them yields an
    /// equivalent graph.
    pub fn node_defs(&self) -> Vec<NodeDef> {
        self.nodes
            .iter()
            .map(|node| NodeDef {
                name: node.name.clone(),
                op: node.op.clone(),
                inputs: node.input_names.clone(),
                attrs: node.attrs.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct GraphBuilder {
    defs: Vec<NodeDef>,
    outputs: Option<Vec<String>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_defs(defs: Vec<NodeDef>) -> Self {
        Self {
            defs,
            outputs: None,
        }
    }

    pub fn node(mut self, def: NodeDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Declare the default outputs. Without this, every node that has no
    /// consumers is an output.
    pub fn outputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<Graph> {
        let mut by_name = HashMap::with_capacity(self.defs.len());
        for (id, def) in self.defs.iter().enumerate() {
            if by_name.insert(def.name.clone(), id).is_some() {
                return Err(anyhow!("duplicate node name {}", def.name));
            }
        }

        let mut nodes = Vec::with_capacity(self.defs.len());
        for (id, def) in self.defs.into_iter().enumerate() {
            let mut inputs = Vec::with_capacity(def.inputs.len());
            for reference in &def.inputs {
                let (name, _) = parse_node_name(reference);
                let input = by_name.get(name).copied().ok_or_else(|| {
                    anyhow!("node {} has unknown input {}", def.name, reference)
                })?;
                inputs.push(input);
            }
            let kind = classify(&def.op);
            nodes.push(Node {
                id,
                uuid: Uuid::new_v4(),
                name: def.name,
                op: def.op,
                kind,
                category: kind.category(),
                input_names: def.inputs,
                inputs,
                children: Vec::new(),
                attrs: def.attrs,
                placement: None,
            });
        }

        for id in 0..nodes.len() {
            for input in nodes[id].inputs.clone() {
                nodes[input].children.push(id);
            }
        }

        let placeholders = ids_where(&nodes, |node| node.kind == NodeKind::Placeholder);
        let weights = ids_where(&nodes, |node| node.kind == NodeKind::Const);
        let outputs = match self.outputs {
            Some(names) => names
                .iter()
                .map(|reference| {
                    let (name, _) = parse_node_name(reference);
                    by_name
                        .get(name)
                        .copied()
                        .ok_or_else(|| anyhow!("unknown output node {}", reference))
                })
                .collect::<Result<Vec<_>>>()?,
            None => ids_where(&nodes, |node| node.children.is_empty()),
        };
        let has_control_flow = nodes
            .iter()
            .any(|node| matches!(node.kind, NodeKind::Control(op) if op.is_control_flow()));
        let has_dynamic_shape = nodes
            .iter()
            .any(|node| node.kind == NodeKind::DynamicShape);

        Ok(Graph {
            nodes,
            by_name,
            placeholders,
            weights,
            outputs,
            has_control_flow,
            has_dynamic_shape,
        })
    }
}

fn classify(op: &str) -> NodeKind {
    match op {
        "Placeholder" => NodeKind::Placeholder,
        "Const" => NodeKind::Const,
        _ => {
            if let Some(control) = ControlOp::from_tag(op) {
                NodeKind::Control(control)
            } else if DYNAMIC_SHAPE_OPS.contains(&op) {
                NodeKind::DynamicShape
            } else if registered_op(op).is_some() {
                NodeKind::Custom
            } else {
                NodeKind::Op
            }
        }
    }
}

fn ids_where(nodes: &[Node], pred: impl Fn(&Node) -> bool) -> Vec<NodeId> {
    nodes
        .iter()
        .filter(|node| pred(node))
        .map(|node| node.id)
        .collect()
}
