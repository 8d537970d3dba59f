//! Buffers flowing along graph edges.
//!
//! A [`Tensor`] is a cheap, shareable handle. Every handle created through a
//! constructor or [`Tensor::fork`] has its own identity (`id`), which the
//! engine uses for consumer counting; disposing a handle releases its data
//! without affecting forks that share the same storage.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::error::ExecError;

mod ops;
mod shape;

pub use ops::{concat, stack, unstack};
pub use shape::{numel, shape_matches};
pub(crate) use shape::to_declared;

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    F32,
    I32,
    Bool,
}

impl DType {
    /// Parse a dtype from its identifier string.
    pub fn from_ident(ident: &str) -> Result<Self> {
        match ident {
            "f32" | "float32" => Ok(DType::F32),
            "i32" | "int32" => Ok(DType::I32),
            "bool" => Ok(DType::Bool),
            _ => Err(anyhow!("unsupported dtype: {}", ident)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::I32 => "i32",
            DType::Bool => "bool",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Flat, row-major element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I32(Vec<i32>),
    Bool(Vec<bool>),
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::I32(_) => DType::I32,
            TensorData::Bool(_) => DType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(values) => values.len(),
            TensorData::I32(values) => values.len(),
            TensorData::Bool(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn empty(dtype: DType) -> Self {
        match dtype {
            DType::F32 => TensorData::F32(Vec::new()),
            DType::I32 => TensorData::I32(Vec::new()),
            DType::Bool => TensorData::Bool(Vec::new()),
        }
    }
}

static NEXT_TENSOR_ID: AtomicU64 = AtomicU64::new(1);

fn next_tensor_id() -> u64 {
    NEXT_TENSOR_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
struct TensorInner {
    id: u64,
    dtype: DType,
    shape: Vec<usize>,
    data: Mutex<Option<Arc<TensorData>>>,
}

/// Shared handle to an n-dimensional buffer.
#[derive(Debug, Clone)]
pub struct Tensor {
    inner: Arc<TensorInner>,
}

impl Tensor {
    /// Build a tensor, checking that `shape` covers exactly `data.len()` elements.
    pub fn new(data: TensorData, shape: Vec<usize>) -> Result<Self> {
        if numel(&shape) != data.len() {
            return Err(anyhow!(
                "shape {:?} needs {} elements, got {}",
                shape,
                numel(&shape),
                data.len()
            ));
        }
        Ok(Self::from_shared(Arc::new(data), shape))
    }

    fn from_shared(data: Arc<TensorData>, shape: Vec<usize>) -> Self {
        Self {
            inner: Arc::new(TensorInner {
                id: next_tensor_id(),
                dtype: data.dtype(),
                shape,
                data: Mutex::new(Some(data)),
            }),
        }
    }

    pub fn from_f32(values: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        Self::new(TensorData::F32(values), shape)
    }

    pub fn from_i32(values: Vec<i32>, shape: Vec<usize>) -> Result<Self> {
        Self::new(TensorData::I32(values), shape)
    }

    pub fn from_bool(values: Vec<bool>, shape: Vec<usize>) -> Result<Self> {
        Self::new(TensorData::Bool(values), shape)
    }

    pub fn scalar_f32(value: f32) -> Self {
        Self::from_shared(Arc::new(TensorData::F32(vec![value])), Vec::new())
    }

    pub fn scalar_i32(value: i32) -> Self {
        Self::from_shared(Arc::new(TensorData::I32(vec![value])), Vec::new())
    }

    pub fn scalar_bool(value: bool) -> Self {
        Self::from_shared(Arc::new(TensorData::Bool(vec![value])), Vec::new())
    }

    /// An empty tensor with a zero-length leading axis: `[0, ..element_shape]`.
    pub fn empty(dtype: DType, element_shape: &[usize]) -> Self {
        let mut shape = Vec::with_capacity(element_shape.len() + 1);
        shape.push(0);
        shape.extend_from_slice(element_shape);
        Self::from_shared(Arc::new(TensorData::empty(dtype)), shape)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.inner.shape
    }

    pub fn rank(&self) -> usize {
        self.inner.shape.len()
    }

    pub fn len(&self) -> usize {
        numel(&self.inner.shape)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the element storage; fails once the tensor was disposed.
    pub fn data(&self) -> Result<Arc<TensorData>> {
        let guard = self
            .inner
            .data
            .lock()
            .map_err(|_| anyhow!("tensor {} lock poisoned", self.inner.id))?;
        guard
            .clone()
            .ok_or_else(|| ExecError::DisposedTensor { id: self.inner.id }.into())
    }

    /// A new handle with its own identity over the same storage.
    pub fn fork(&self) -> Result<Self> {
        Ok(Self::from_shared(self.data()?, self.inner.shape.clone()))
    }

    /// Release this handle's storage. Forks keep their own reference.
    pub fn dispose(&self) {
        if let Ok(mut guard) = self.inner.data.lock() {
            guard.take();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner
            .data
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        match self.data()?.as_ref() {
            TensorData::F32(values) => Ok(values.clone()),
            TensorData::I32(values) => Ok(values.iter().map(|v| *v as f32).collect()),
            TensorData::Bool(values) => Ok(values
                .iter()
                .map(|v| if *v { 1.0 } else { 0.0 })
                .collect()),
        }
    }

    pub fn to_i32_vec(&self) -> Result<Vec<i32>> {
        match self.data()?.as_ref() {
            TensorData::F32(values) => Ok(values.iter().map(|v| *v as i32).collect()),
            TensorData::I32(values) => Ok(values.clone()),
            TensorData::Bool(values) => Ok(values.iter().map(|v| *v as i32).collect()),
        }
    }

    pub fn to_bool_vec(&self) -> Result<Vec<bool>> {
        match self.data()?.as_ref() {
            TensorData::F32(values) => Ok(values.iter().map(|v| *v != 0.0).collect()),
            TensorData::I32(values) => Ok(values.iter().map(|v| *v != 0).collect()),
            TensorData::Bool(values) => Ok(values.clone()),
        }
    }
}

impl PartialEq for Tensor {
    /// Value equality: same dtype, shape and elements. Identity is ignored.
    fn eq(&self, other: &Self) -> bool {
        if self.dtype() != other.dtype() || self.shape() != other.shape() {
            return false;
        }
        match (self.data(), other.data()) {
            (Ok(lhs), Ok(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}
