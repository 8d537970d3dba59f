//! Process-wide table of user-supplied ops.
//!
//! Graphs classify a node as [`crate::graph::NodeKind::Custom`] when its op
//! tag is registered at build time; the executor then runs the registered
//! op instead of the evaluator.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use once_cell::sync::Lazy;

use crate::graph::Node;
use crate::runtime::evaluator::{NodeOutputs, OpInputs};

pub trait CustomOp: Send + Sync {
    fn execute(&self, node: &Node, inputs: &OpInputs) -> Result<NodeOutputs>;
}

impl<F> CustomOp for F
where
    F: Fn(&Node, &OpInputs) -> Result<NodeOutputs> + Send + Sync,
{
    fn execute(&self, node: &Node, inputs: &OpInputs) -> Result<NodeOutputs> {
        self(node, inputs)
    }
}

static CUSTOM_OPS: Lazy<RwLock<HashMap<String, Arc<dyn CustomOp>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register `op` under `name`, replacing any earlier registration.
pub fn register_op(name: impl Into<String>, op: Arc<dyn CustomOp>) {
    let name = name.into();
    if let Ok(mut ops) = CUSTOM_OPS.write() {
        if ops.insert(name.clone(), op).is_some() {
            crate::warning!("custom op {} was already registered and is replaced", name);
        }
    }
}

pub fn registered_op(name: &str) -> Option<Arc<dyn CustomOp>> {
    CUSTOM_OPS
        .read()
        .ok()
        .and_then(|ops| ops.get(name).cloned())
}

pub fn deregister_op(name: &str) -> bool {
    CUSTOM_OPS
        .write()
        .map(|mut ops| ops.remove(name).is_some())
        .unwrap_or(false)
}
