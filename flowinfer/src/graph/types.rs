//! Core graph data types.
//!
//! Op tags are classified once, when the graph is built, into a closed
//! [`NodeKind`]. The engine branches on the kind and never on raw strings.
use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::tensor::DType;

/// Attribute value attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Float(f32),
    Int(i64),
    Bool(bool),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f32>),
    DType(DType),
}

impl AttrValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            AttrValue::IntList(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_dtype(&self) -> Option<DType> {
        match self {
            AttrValue::DType(dtype) => Some(*dtype),
            _ => None,
        }
    }
}

/// Ops with runtime side effects on the execution context, plus the
/// indexed-array ops that read or write context-owned arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    Switch,
    Merge,
    Enter,
    Exit,
    NextIteration,
    LoopCond,
    TensorArray,
    TensorArrayWrite,
    TensorArrayRead,
    TensorArrayGather,
    TensorArrayScatter,
    TensorArrayConcat,
    TensorArraySplit,
    TensorArraySize,
    TensorArrayClose,
}

impl ControlOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlOp::Switch => "Switch",
            ControlOp::Merge => "Merge",
            ControlOp::Enter => "Enter",
            ControlOp::Exit => "Exit",
            ControlOp::NextIteration => "NextIteration",
            ControlOp::LoopCond => "LoopCond",
            ControlOp::TensorArray => "TensorArrayV3",
            ControlOp::TensorArrayWrite => "TensorArrayWriteV3",
            ControlOp::TensorArrayRead => "TensorArrayReadV3",
            ControlOp::TensorArrayGather => "TensorArrayGatherV3",
            ControlOp::TensorArrayScatter => "TensorArrayScatterV3",
            ControlOp::TensorArrayConcat => "TensorArrayConcatV3",
            ControlOp::TensorArraySplit => "TensorArraySplitV3",
            ControlOp::TensorArraySize => "TensorArraySizeV3",
            ControlOp::TensorArrayClose => "TensorArrayCloseV3",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        let op = match tag {
            "Switch" => ControlOp::Switch,
            "Merge" => ControlOp::Merge,
            "Enter" => ControlOp::Enter,
            "Exit" => ControlOp::Exit,
            "NextIteration" => ControlOp::NextIteration,
            "LoopCond" => ControlOp::LoopCond,
            "TensorArrayV3" => ControlOp::TensorArray,
            "TensorArrayWriteV3" => ControlOp::TensorArrayWrite,
            "TensorArrayReadV3" => ControlOp::TensorArrayRead,
            "TensorArrayGatherV3" => ControlOp::TensorArrayGather,
            "TensorArrayScatterV3" => ControlOp::TensorArrayScatter,
            "TensorArrayConcatV3" => ControlOp::TensorArrayConcat,
            "TensorArraySplitV3" => ControlOp::TensorArraySplit,
            "TensorArraySizeV3" => ControlOp::TensorArraySize,
            "TensorArrayCloseV3" => ControlOp::TensorArrayClose,
            _ => return None,
        };
        Some(op)
    }

    /// The loop/branch primitives whose presence forces the dynamic path.
    pub fn is_control_flow(self) -> bool {
        matches!(
            self,
            ControlOp::Switch
                | ControlOp::Merge
                | ControlOp::Enter
                | ControlOp::Exit
                | ControlOp::NextIteration
        )
    }
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ops whose output shape depends on input values.
pub const DYNAMIC_SHAPE_OPS: &[&str] = &["NonMaxSuppressionV2", "NonMaxSuppressionV3", "Where"];

/// How the engine treats a node, resolved once from its op tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Value supplied by the caller.
    Placeholder,
    /// Value supplied once as a weight buffer.
    Const,
    Control(ControlOp),
    /// Delegated to the evaluator, but forces the dynamic path.
    DynamicShape,
    /// Found in the custom op registry at build time.
    Custom,
    /// Delegated to the evaluator.
    Op,
}

impl NodeKind {
    pub fn category(self) -> OpCategory {
        match self {
            NodeKind::Placeholder | NodeKind::Const => OpCategory::Graph,
            NodeKind::Control(_) => OpCategory::Control,
            NodeKind::DynamicShape => OpCategory::Dynamic,
            NodeKind::Custom => OpCategory::Custom,
            NodeKind::Op => OpCategory::Compute,
        }
    }
}

/// Coarse grouping used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCategory {
    Graph,
    Control,
    Dynamic,
    Custom,
    Compute,
}

/// Placement tag written by the device placement pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Cpu,
    Gpu,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "cpu" => Ok(Backend::Cpu),
            "gpu" | "webgl" => Ok(Backend::Gpu),
            _ => Err(anyhow!("unknown backend {}", value)),
        }
    }
}
