//! Failure kinds surfaced by the execution engine.
//!
//! Engine code returns `anyhow::Result` and raises these variants with
//! `.into()`, so a caller can classify a failure with
//! `err.downcast_ref::<ExecError>()`.
use thiserror::Error;

use crate::tensor::DType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("the input map has key '{name}' that is not part of the graph")]
    UnknownInput { name: String },

    #[error("the output '{name}' is not found in the graph")]
    UnknownOutput { name: String },

    #[error(
        "the input map has keys [{}], missing required keys [{}], unused keys [{}]; expected exactly [{}]",
        .provided.join(", "),
        .missing.join(", "),
        .unused.join(", "),
        .expected.join(", ")
    )]
    InputMismatch {
        provided: Vec<String>,
        missing: Vec<String>,
        unused: Vec<String>,
        expected: Vec<String>,
    },

    #[error("the shape of input '{name}' must be {expected:?}, but was {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<i64>,
        actual: Vec<usize>,
    },

    #[error("the dtype of input '{name}' must be {expected}, but was {actual}")]
    DtypeMismatch {
        name: String,
        expected: DType,
        actual: DType,
    },

    #[error(
        "cannot compute the outputs [{}] from the provided inputs [{}]; missing the inputs [{}]",
        .outputs.join(", "),
        .inputs.join(", "),
        .missing.join(", ")
    )]
    MissingInputs {
        outputs: Vec<String>,
        inputs: Vec<String>,
        missing: Vec<String>,
    },

    #[error(
        "cannot compute the outputs [{}] from the provided inputs [{}]; consider providing [{}]{}",
        .outputs.join(", "),
        .inputs.join(", "),
        .missing.join(", "),
        alternatives_hint(.alternatives)
    )]
    MissingOutputs {
        outputs: Vec<String>,
        inputs: Vec<String>,
        missing: Vec<String>,
        alternatives: Vec<String>,
    },

    #[error(
        "node '{node}' has the dynamic op '{op}'; use execute_async instead{}",
        alternatives_hint(.alternatives)
    )]
    UnsupportedStaticGraph {
        node: String,
        op: String,
        alternatives: Vec<String>,
    },

    #[error("node '{node}' has op '{op}' which is not supported")]
    UnsupportedOperation { node: String, op: String },

    #[error("indexed array '{array}': {reason}")]
    InvalidIndexedArrayAccess { array: String, reason: String },

    #[error("{op} requires an active loop frame, but the context stack is empty")]
    EmptyContextStack { op: String },

    #[error("node '{node}' ({op}) returned a pending result; use execute_async instead")]
    PendingEvaluation { node: String, op: String },

    #[error("tensor {id} has already been disposed")]
    DisposedTensor { id: u64 },
}

fn alternatives_hint(alternatives: &[String]) -> String {
    if alternatives.is_empty() {
        String::new()
    } else {
        format!(
            "; alternatively, to avoid the dynamic ops, provide the inputs [{}]",
            alternatives.join(", ")
        )
    }
}

impl ExecError {
    pub(crate) fn array(array: &str, reason: impl Into<String>) -> Self {
        ExecError::InvalidIndexedArrayAccess {
            array: array.to_string(),
            reason: reason.into(),
        }
    }
}
