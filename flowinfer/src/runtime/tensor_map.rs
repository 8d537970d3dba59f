use std::collections::HashMap;

use crate::graph::{parse_node_name, Node};
use crate::runtime::context::ExecutionContext;
use crate::tensor::Tensor;

/// Caller-facing map of node name to tensor.
pub type NamedTensors = HashMap<String, Tensor>;

/// Storage key of a node's value under a context id.
pub fn storage_key(name: &str, context_id: &str) -> String {
    if context_id.is_empty() {
        name.to_string()
    } else {
        format!("{}-{}", name, context_id)
    }
}

/// Value table of one execution call, keyed by context-qualified node name.
/// Each entry holds one slot per node output; a `None` slot is an output
/// that was not produced (for example the untaken side of a `Switch`).
#[derive(Debug, Default)]
pub struct TensorMap {
    entries: HashMap<String, Vec<Option<Tensor>>>,
}

impl TensorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, outputs: Vec<Option<Tensor>>) {
        self.entries.insert(key, outputs);
    }

    /// Place `tensor` at output `index` of `key`, growing the entry as needed.
    pub fn insert_at(&mut self, key: String, index: usize, tensor: Tensor) {
        let slots = self.entries.entry(key).or_default();
        if slots.len() <= index {
            slots.resize(index + 1, None);
        }
        slots[index] = Some(tensor);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&[Option<Tensor>]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tensors(&self) -> impl Iterator<Item = &Tensor> {
        self.entries.values().flatten().flatten()
    }

    /// The first entry for `name` found walking the context ids from the
    /// innermost frame outwards.
    pub fn resolve_current(&self, name: &str, ctx: &ExecutionContext) -> Option<&[Option<Tensor>]> {
        self.context_of(name, ctx)
            .and_then(|context_id| self.get(&storage_key(name, context_id)))
    }

    /// The context id that [`Self::resolve_current`] would match `name` under.
    pub fn context_of<'c>(&self, name: &str, ctx: &'c ExecutionContext) -> Option<&'c str> {
        ctx.current_context_ids()
            .iter()
            .find(|context_id| self.contains_key(&storage_key(name, context_id)))
            .map(String::as_str)
    }

    /// Resolve an input reference such as `"split:1"` under the active context.
    pub fn lookup(&self, reference: &str, ctx: &ExecutionContext) -> Option<Tensor> {
        let (name, index) = parse_node_name(reference);
        self.resolve_current(name, ctx)
            .and_then(|slots| slots.get(index).cloned().flatten())
    }

    pub fn node_inputs(&self, node: &Node, ctx: &ExecutionContext) -> Vec<Option<Tensor>> {
        node.input_names
            .iter()
            .map(|reference| self.lookup(reference, ctx))
            .collect()
    }
}
