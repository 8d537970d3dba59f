use std::collections::BTreeMap;

use uuid::Uuid;

use super::{AttrValue, Backend, NodeKind, OpCategory};
use crate::tensor::DType;

/// Stable index of a node in its graph's arena.
pub type NodeId = usize;

/// One operation instance. Owned by [`super::Graph`]; `inputs` and `children`
/// are index lists into the same arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub uuid: Uuid,
    pub name: String,
    pub op: String,
    pub kind: NodeKind,
    pub category: OpCategory,
    /// Input references as written, e.g. `"split:1"`.
    pub input_names: Vec<String>,
    pub inputs: Vec<NodeId>,
    /// One entry per consuming edge, so a child reading this node twice
    /// appears twice.
    pub children: Vec<NodeId>,
    pub attrs: BTreeMap<String, AttrValue>,
    pub placement: Option<Backend>,
}

impl Node {
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn attr_bool(&self, name: &str) -> Option<bool> {
        self.attr(name).and_then(AttrValue::as_bool)
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(AttrValue::as_str)
    }

    pub fn attr_int_list(&self, name: &str) -> Option<&[i64]> {
        self.attr(name).and_then(AttrValue::as_int_list)
    }

    pub fn attr_dtype(&self, name: &str) -> Option<DType> {
        self.attr(name).and_then(AttrValue::as_dtype)
    }

    /// Declared placeholder shape, `-1` marking unknown dimensions.
    pub fn declared_shape(&self) -> Option<&[i64]> {
        self.attr_int_list("shape")
    }

    pub fn declared_dtype(&self) -> Option<DType> {
        self.attr_dtype("dtype")
    }

    pub fn is_control(&self) -> bool {
        matches!(self.kind, NodeKind::Control(_))
    }

    /// Loop/branch primitives and dynamic-shape ops; either forces the
    /// dynamic path.
    pub fn is_dynamic(&self) -> bool {
        match self.kind {
            NodeKind::Control(op) => op.is_control_flow(),
            NodeKind::DynamicShape => true,
            _ => false,
        }
    }
}

/// Split an input reference into node name and output index.
///
/// `"a"` is `("a", 0)`, `"a:2"` is `("a", 2)` and a leading `^` control
/// dependency marker is dropped. A suffix that is not a number is kept as
/// part of the name.
pub fn parse_node_name(reference: &str) -> (&str, usize) {
    let reference = reference.strip_prefix('^').unwrap_or(reference);
    match reference.rsplit_once(':') {
        Some((name, index)) => match index.parse::<usize>() {
            Ok(index) => (name, index),
            Err(_) => (reference, 0),
        },
        None => (reference, 0),
    }
}

pub fn describe_node(node: &Node) -> String {
    match node.kind {
        NodeKind::Placeholder => format!("placeholder {}", node.name),
        NodeKind::Const => format!("const {}", node.name),
        NodeKind::Control(op) => {
            format!("control {}({}) >> {}", op, node.input_names.join(","), node.name)
        }
        _ => format!("op {}({}) >> {}", node.op, node.input_names.join(","), node.name),
    }
}
