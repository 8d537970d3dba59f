//! The seam between the engine and the numeric op library.
use anyhow::Result;
use futures::future::BoxFuture;

use crate::error::ExecError;
use crate::graph::Node;
use crate::tensor::Tensor;

/// Outputs of one node, one slot per output index.
pub type NodeOutputs = Vec<Option<Tensor>>;

/// Result of asking an evaluator for a node's outputs.
///
/// `Pending` lets an op finish later (for example after a device transfer);
/// the dynamic scheduler awaits it before touching the next work item, and
/// the static path rejects it.
pub enum Evaluation<'a> {
    Ready(NodeOutputs),
    Pending(BoxFuture<'a, Result<NodeOutputs>>),
}

/// Resolved input values of a node under the active execution context.
#[derive(Debug, Clone)]
pub struct OpInputs {
    values: Vec<Option<Tensor>>,
    context_id: String,
}

impl OpInputs {
    pub fn new(values: Vec<Option<Tensor>>, context_id: impl Into<String>) -> Self {
        Self {
            values,
            context_id: context_id.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Option<Tensor>] {
        &self.values
    }

    pub fn optional(&self, index: usize) -> Option<&Tensor> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Input `index`, failing when it is absent or unresolved.
    pub fn get(&self, node: &Node, index: usize) -> Result<&Tensor> {
        self.optional(index).ok_or_else(|| {
            anyhow::anyhow!(
                "node {} ({}) has no value for input {}",
                node.name,
                node.op,
                index
            )
        })
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }
}

/// Evaluates ordinary ops. Must be deterministic for identical inputs and
/// must fail with [`ExecError::UnsupportedOperation`] for op tags it does not
/// know. Returned tensors must be fresh handles (use [`Tensor::fork`] for
/// pass-through values).
pub trait OpEvaluator: Send + Sync {
    fn evaluate<'a>(&'a self, node: &'a Node, inputs: OpInputs) -> Result<Evaluation<'a>>;
}

pub fn unsupported(node: &Node) -> anyhow::Error {
    ExecError::UnsupportedOperation {
        node: node.name.clone(),
        op: node.op.clone(),
    }
    .into()
}
