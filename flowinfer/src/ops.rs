mod broadcast;
mod reference;

pub use broadcast::{broadcast_map, broadcast_shape};
pub use reference::{evaluate_node, ReferenceEvaluator};
