//! Caller-facing wrapper around [`GraphExecutor`].
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::graph::Graph;
use crate::runtime::{name_outputs, ExecutorOptions, GraphExecutor, NamedTensors, OpEvaluator};
use crate::tensor::Tensor;

/// Inputs in any of the accepted shapes. A single tensor or a list is matched
/// to the placeholders in graph order.
#[derive(Debug, Clone)]
pub enum ModelInputs {
    Single(Tensor),
    List(Vec<Tensor>),
    Named(NamedTensors),
}

impl From<Tensor> for ModelInputs {
    fn from(tensor: Tensor) -> Self {
        ModelInputs::Single(tensor)
    }
}

impl From<Vec<Tensor>> for ModelInputs {
    fn from(tensors: Vec<Tensor>) -> Self {
        ModelInputs::List(tensors)
    }
}

impl From<NamedTensors> for ModelInputs {
    fn from(map: NamedTensors) -> Self {
        ModelInputs::Named(map)
    }
}

/// Which outputs to compute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputSelection {
    /// The graph's declared outputs.
    #[default]
    Default,
    One(String),
    Many(Vec<String>),
}

impl From<&str> for OutputSelection {
    fn from(name: &str) -> Self {
        OutputSelection::One(name.to_string())
    }
}

impl From<Vec<&str>> for OutputSelection {
    fn from(names: Vec<&str>) -> Self {
        OutputSelection::Many(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for OutputSelection {
    fn from(names: Vec<String>) -> Self {
        OutputSelection::Many(names)
    }
}

/// A single tensor when exactly one output was requested (or defaulted),
/// otherwise a map keyed by output name.
#[derive(Debug, Clone)]
pub enum ModelOutput {
    Single(Tensor),
    Named(HashMap<String, Tensor>),
}

impl ModelOutput {
    pub fn into_single(self) -> Result<Tensor> {
        match self {
            ModelOutput::Single(tensor) => Ok(tensor),
            ModelOutput::Named(map) => Err(anyhow!(
                "expected a single output, got {} named outputs",
                map.len()
            )),
        }
    }

    pub fn into_named(self) -> Result<HashMap<String, Tensor>> {
        match self {
            ModelOutput::Named(map) => Ok(map),
            ModelOutput::Single(_) => Err(anyhow!("expected named outputs, got a single tensor")),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        match self {
            ModelOutput::Single(_) => None,
            ModelOutput::Named(map) => map.get(name),
        }
    }
}

#[derive(Debug)]
pub struct GraphModel {
    executor: GraphExecutor,
    input_nodes: Vec<String>,
    output_nodes: Vec<String>,
}

impl GraphModel {
    pub fn new(graph: Graph, weights: NamedTensors, evaluator: Arc<dyn OpEvaluator>) -> Self {
        Self::with_options(graph, weights, evaluator, ExecutorOptions::from_env())
    }

    pub fn with_options(
        graph: Graph,
        weights: NamedTensors,
        evaluator: Arc<dyn OpEvaluator>,
        options: ExecutorOptions,
    ) -> Self {
        let input_nodes = graph.placeholder_names();
        let output_nodes = graph.output_names();
        Self {
            executor: GraphExecutor::with_options(graph, weights, evaluator, options),
            input_nodes,
            output_nodes,
        }
    }

    pub fn input_nodes(&self) -> &[String] {
        &self.input_nodes
    }

    pub fn output_nodes(&self) -> &[String] {
        &self.output_nodes
    }

    pub fn executor(&self) -> &GraphExecutor {
        &self.executor
    }

    /// Strict execution of the default outputs: the inputs must cover exactly
    /// the placeholders.
    pub fn predict(&self, inputs: impl Into<ModelInputs>) -> Result<ModelOutput> {
        self.execute_with(inputs.into(), true, OutputSelection::Default)
    }

    /// Execute along the static path. Any node may be fed, so intermediate
    /// values can be supplied directly.
    pub fn execute(
        &self,
        inputs: impl Into<ModelInputs>,
        outputs: impl Into<OutputSelection>,
    ) -> Result<ModelOutput> {
        self.execute_with(inputs.into(), false, outputs.into())
    }

    /// Execute along the dynamic path; required for loops and branches.
    pub async fn execute_async(
        &self,
        inputs: impl Into<ModelInputs>,
        outputs: impl Into<OutputSelection>,
    ) -> Result<ModelOutput> {
        let inputs = self.tensor_map(inputs.into())?;
        let (names, single) = self.selection(outputs.into());
        let tensors = self.executor.execute_async(&inputs, &names).await?;
        shape_output(names, tensors, single)
    }

    fn execute_with(
        &self,
        inputs: ModelInputs,
        strict: bool,
        outputs: OutputSelection,
    ) -> Result<ModelOutput> {
        let inputs = self.tensor_map(inputs)?;
        let (names, single) = self.selection(outputs);
        let tensors = self.executor.execute(&inputs, strict, &names)?;
        shape_output(names, tensors, single)
    }

    fn tensor_map(&self, inputs: ModelInputs) -> Result<NamedTensors> {
        let list = match inputs {
            ModelInputs::Named(map) => return Ok(map),
            ModelInputs::Single(tensor) => vec![tensor],
            ModelInputs::List(tensors) => tensors,
        };
        if list.len() != self.input_nodes.len() {
            return Err(anyhow!(
                "input tensor count mismatch: the graph model has {} placeholders, while there are {} input tensors",
                self.input_nodes.len(),
                list.len()
            ));
        }
        Ok(self.input_nodes.iter().cloned().zip(list).collect())
    }

    fn selection(&self, outputs: OutputSelection) -> (Vec<String>, bool) {
        match outputs {
            OutputSelection::Default => {
                let names = self.output_nodes.clone();
                let single = names.len() == 1;
                (names, single)
            }
            OutputSelection::One(name) => (vec![name], true),
            OutputSelection::Many(names) => {
                let single = names.len() == 1;
                (names, single)
            }
        }
    }

    /// Release the weight buffers. The model cannot execute afterwards.
    pub fn dispose(&self) {
        for tensor in self.executor.weights().values() {
            tensor.dispose();
        }
    }
}

fn shape_output(names: Vec<String>, tensors: Vec<Tensor>, single: bool) -> Result<ModelOutput> {
    if single {
        let tensor = tensors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("execution produced no outputs"))?;
        return Ok(ModelOutput::Single(tensor));
    }
    Ok(ModelOutput::Named(name_outputs(&names, tensors)?))
}
