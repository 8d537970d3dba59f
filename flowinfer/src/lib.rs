#[doc(hidden)]
pub mod logging;

mod error;
mod graph;
mod macros;
mod model;
mod ops;
mod placement;
mod runtime;
mod tensor;
mod timer;

pub use error::ExecError;
pub use graph::{
    describe_node, parse_node_name, AttrValue, Backend, ControlOp, Graph, GraphBuilder,
    GraphDeserialize, GraphSerialize, Node, NodeDef, NodeId, NodeKind, OpCategory,
    DYNAMIC_SHAPE_OPS,
};
pub use model::{GraphModel, ModelInputs, ModelOutput, OutputSelection};
pub use ops::{broadcast_map, broadcast_shape, evaluate_node, ReferenceEvaluator};
pub use placement::{DevicePlacement, PlacementSummary};
pub use runtime::{
    deregister_op, execution_subgraph, index_list, name_outputs, register_op, registered_op,
    release_unprotected, scalar_bool, scalar_i32, scalar_index, storage_key, topological_order,
    unsupported, Compiler, ConsumerCounts, CustomOp, Evaluation, ExecutionContext,
    ExecutionSubgraph, ExecutorOptions, Frame, GraphExecutor, NamedTensors, NodeOutputs,
    OpEvaluator, OpInputs, TensorArray, TensorArraySpec, TensorMap, TraceEvent, TraceEventKind,
};
pub use tensor::{concat, numel, shape_matches, stack, unstack, DType, Tensor, TensorData};
pub use timer::{format_duration, Timer};
