mod compiler;
mod context;
mod control_flow;
mod disposal;
mod evaluator;
mod executor;
mod op_runner;
pub(crate) mod registry;
mod tensor_array;
mod tensor_map;
mod trace;
mod value_eval;

pub use compiler::{execution_subgraph, topological_order, Compiler, ExecutionSubgraph};
pub use context::{ExecutionContext, Frame};
pub use disposal::{release_unprotected, ConsumerCounts};
pub use evaluator::{unsupported, Evaluation, NodeOutputs, OpEvaluator, OpInputs};
pub use executor::{name_outputs, ExecutorOptions, GraphExecutor};
pub use registry::{deregister_op, register_op, registered_op, CustomOp};
pub use tensor_array::{TensorArray, TensorArraySpec};
pub use tensor_map::{storage_key, NamedTensors, TensorMap};
pub use trace::{TraceEvent, TraceEventKind};
pub use value_eval::{index_list, scalar_bool, scalar_i32, scalar_index};
