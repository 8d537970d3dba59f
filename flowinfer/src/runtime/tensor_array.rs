//! Indexed value array used by loop bodies to accumulate values across
//! iterations.
//!
//! Each slot is written at most once and then read; with `clear_after_read`
//! a read also invalidates the slot. The array keeps its own handle to each
//! stored tensor and hands out forks, so releasing the array never affects
//! values already read out of it.
use anyhow::Result;

use crate::error::ExecError;
use crate::tensor::{self, shape_matches, to_declared, DType, Tensor};

#[derive(Debug, Default)]
struct Slot {
    tensor: Option<Tensor>,
    written: bool,
    read: bool,
    cleared: bool,
}

/// Construction parameters of a [`TensorArray`].
#[derive(Debug, Clone)]
pub struct TensorArraySpec {
    pub name: String,
    pub dtype: DType,
    pub size: usize,
    /// `None` when the element shape is unknown; fixed by the first write.
    pub element_shape: Option<Vec<i64>>,
    pub dynamic_size: bool,
    pub clear_after_read: bool,
    pub identical_element_shapes: bool,
}

#[derive(Debug)]
pub struct TensorArray {
    name: String,
    dtype: DType,
    max_size: usize,
    element_shape: Option<Vec<i64>>,
    dynamic_size: bool,
    clear_after_read: bool,
    identical_element_shapes: bool,
    slots: Vec<Slot>,
    closed: bool,
}

impl TensorArray {
    pub fn new(spec: TensorArraySpec) -> Self {
        Self {
            name: spec.name,
            dtype: spec.dtype,
            max_size: spec.size,
            element_shape: spec.element_shape,
            dynamic_size: spec.dynamic_size,
            clear_after_read: spec.clear_after_read,
            identical_element_shapes: spec.identical_element_shapes,
            slots: Vec::new(),
            closed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn element_shape(&self) -> Option<&[i64]> {
        self.element_shape.as_deref()
    }

    /// Number of slots touched so far (highest written index + 1).
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn fail(&self, reason: impl Into<String>) -> anyhow::Error {
        ExecError::array(&self.name, reason).into()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(self.fail("the array has already been closed"));
        }
        Ok(())
    }

    fn ensure_dtype(&self, dtype: DType) -> Result<()> {
        if dtype != self.dtype {
            return Err(self.fail(format!(
                "could not use a tensor of dtype {}; the array has dtype {}",
                dtype, self.dtype
            )));
        }
        Ok(())
    }

    fn ensure_element_shape(&self, shape: &[usize]) -> Result<()> {
        match &self.element_shape {
            Some(expected) if !shape_matches(expected, shape) => Err(self.fail(format!(
                "element shape {:?} does not match the array element shape {:?}",
                shape, expected
            ))),
            _ => Ok(()),
        }
    }

    fn element_dims(&self) -> Vec<usize> {
        self.element_shape
            .as_ref()
            .map(|shape| shape.iter().map(|dim| (*dim).max(0) as usize).collect())
            .unwrap_or_default()
    }

    pub fn read(&mut self, index: usize) -> Result<Tensor> {
        self.ensure_open()?;
        if index >= self.slots.len() {
            return Err(self.fail(format!(
                "tried to read from index {}, but the array size is {}",
                index,
                self.slots.len()
            )));
        }
        let clear = self.clear_after_read;
        let name = self.name.clone();
        let slot = &mut self.slots[index];
        if slot.cleared {
            return Err(ExecError::array(
                &name,
                format!(
                    "could not read index {} twice because it was cleared after a previous read",
                    index
                ),
            )
            .into());
        }
        let stored = match &slot.tensor {
            Some(tensor) => tensor.clone(),
            None => {
                return Err(
                    ExecError::array(&name, format!("index {} has not been written", index)).into(),
                )
            }
        };
        let value = stored.fork()?;
        slot.read = true;
        if clear {
            slot.cleared = true;
            stored.dispose();
            slot.tensor = None;
        }
        Ok(value)
    }

    pub fn read_many(&mut self, indices: &[usize]) -> Result<Vec<Tensor>> {
        indices.iter().map(|index| self.read(*index)).collect()
    }

    pub fn write(&mut self, index: usize, tensor: &Tensor) -> Result<()> {
        self.ensure_open()?;
        if !self.dynamic_size && index >= self.max_size {
            return Err(self.fail(format!(
                "tried to write to index {}, but the array is not resizeable and its size is {}",
                index, self.max_size
            )));
        }
        self.ensure_dtype(tensor.dtype())?;
        if self.element_shape.is_none() {
            self.element_shape = Some(to_declared(tensor.shape()));
        }
        self.ensure_element_shape(tensor.shape())?;
        if self.identical_element_shapes {
            self.element_shape = Some(to_declared(tensor.shape()));
        }
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, Slot::default);
        }
        let slot = &self.slots[index];
        if slot.read {
            return Err(self.fail(format!(
                "could not write to index {} because it has already been read",
                index
            )));
        }
        if slot.written {
            return Err(self.fail(format!(
                "could not write to index {} because it has already been written",
                index
            )));
        }
        let stored = tensor.fork()?;
        let slot = &mut self.slots[index];
        slot.tensor = Some(stored);
        slot.written = true;
        Ok(())
    }

    pub fn write_many(&mut self, indices: &[usize], tensors: &[Tensor]) -> Result<()> {
        if indices.len() != tensors.len() {
            return Err(self.fail(format!(
                "could not write {} tensors to {} indices",
                tensors.len(),
                indices.len()
            )));
        }
        for (index, tensor) in indices.iter().zip(tensors) {
            self.write(*index, tensor)?;
        }
        Ok(())
    }

    /// Stack the selected slots along a new leading axis. `None` selects every
    /// slot in order.
    pub fn gather(&mut self, indices: Option<&[usize]>, dtype: Option<DType>) -> Result<Tensor> {
        self.ensure_open()?;
        if let Some(dtype) = dtype {
            self.ensure_dtype(dtype)?;
        }
        let indices: Vec<usize> = match indices {
            Some(indices) => indices.to_vec(),
            None => (0..self.size()).collect(),
        };
        if indices.is_empty() {
            return Ok(Tensor::empty(self.dtype, &self.element_dims()));
        }
        let tensors = self.read_many(&indices)?;
        self.ensure_element_shape(tensors[0].shape())?;
        tensor::stack(&tensors)
    }

    /// Join every slot along the existing leading axis.
    pub fn concat(&mut self, dtype: Option<DType>) -> Result<Tensor> {
        self.ensure_open()?;
        if let Some(dtype) = dtype {
            self.ensure_dtype(dtype)?;
        }
        if self.size() == 0 {
            return Ok(Tensor::empty(self.dtype, &self.element_dims()));
        }
        let indices: Vec<usize> = (0..self.size()).collect();
        let tensors = self.read_many(&indices)?;
        self.ensure_element_shape(tensors[0].shape())?;
        tensor::concat(&tensors)
    }

    /// Write `tensor[i]` to slot `indices[i]`.
    pub fn scatter(&mut self, indices: &[usize], tensor: &Tensor) -> Result<()> {
        self.ensure_open()?;
        self.ensure_dtype(tensor.dtype())?;
        let leading = tensor.shape().first().copied().unwrap_or(0);
        if indices.len() != leading {
            return Err(self.fail(format!(
                "expected len(indices) == tensor.shape[0], but saw {} vs. {}",
                indices.len(),
                leading
            )));
        }
        let max_index = indices.iter().copied().max().unwrap_or(0);
        if !self.dynamic_size && !indices.is_empty() && max_index >= self.max_size {
            return Err(self.fail(format!(
                "max index must be < array size ({} vs. {})",
                max_index, self.max_size
            )));
        }
        let rows = tensor::unstack(tensor)?;
        self.write_many(indices, &rows)
    }

    /// Cut `tensor` along its leading axis into chunks of `lengths[i]` rows and
    /// write chunk `i` to slot `i`. An unknown element shape becomes
    /// `[-1, ..row_shape]` so chunks may differ in length.
    pub fn split(&mut self, lengths: &[usize], tensor: &Tensor) -> Result<()> {
        self.ensure_open()?;
        self.ensure_dtype(tensor.dtype())?;
        let total: usize = lengths.iter().sum();
        let leading = tensor.shape().first().copied().unwrap_or(0);
        if total != leading {
            return Err(self.fail(format!(
                "expected the sum of lengths to equal tensor.shape[0], but the sum is {} and the shape is {:?}",
                total,
                tensor.shape()
            )));
        }
        if !self.dynamic_size && lengths.len() != self.max_size {
            return Err(self.fail(format!(
                "the array size is not equal to the number of lengths ({} vs. {}) and the array is not resizeable",
                self.max_size,
                lengths.len()
            )));
        }
        let row_shape = tensor.shape().get(1..).unwrap_or_default();
        if self.element_shape.is_none() {
            let mut shape = vec![-1];
            shape.extend(to_declared(row_shape));
            self.element_shape = Some(shape);
        }
        let rows = tensor::unstack(tensor)?;
        let mut start = 0;
        let mut chunks = Vec::with_capacity(lengths.len());
        for length in lengths {
            let chunk = if *length == 0 {
                Tensor::empty(tensor.dtype(), row_shape)
            } else {
                tensor::stack(&rows[start..start + length])?
            };
            chunks.push(chunk);
            start += length;
        }
        let indices: Vec<usize> = (0..lengths.len()).collect();
        self.write_many(&indices, &chunks)
    }

    /// Release every stored tensor and reject any later access.
    pub fn clear_and_close(&mut self) {
        for slot in &mut self.slots {
            if let Some(tensor) = slot.tensor.take() {
                tensor.dispose();
            }
        }
        self.closed = true;
    }
}
