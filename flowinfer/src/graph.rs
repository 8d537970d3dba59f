mod builder;
mod json;
mod node;
mod types;

pub use builder::{Graph, GraphBuilder, NodeDef};
pub use json::{GraphDeserialize, GraphSerialize};
pub use node::{describe_node, parse_node_name, Node, NodeId};
pub use types::{AttrValue, Backend, ControlOp, NodeKind, OpCategory, DYNAMIC_SHAPE_OPS};
