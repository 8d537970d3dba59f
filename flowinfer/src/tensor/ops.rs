use anyhow::{anyhow, Result};

use super::{numel, Tensor, TensorData};

fn check_uniform(tensors: &[Tensor], what: &str) -> Result<()> {
    let first = &tensors[0];
    for tensor in &tensors[1..] {
        if tensor.dtype() != first.dtype() {
            return Err(anyhow!(
                "{}: dtype {} does not match {}",
                what,
                tensor.dtype(),
                first.dtype()
            ));
        }
    }
    Ok(())
}

fn join_data(tensors: &[Tensor]) -> Result<TensorData> {
    let mut out = TensorData::empty(tensors[0].dtype());
    for tensor in tensors {
        let data = tensor.data()?;
        match (&mut out, data.as_ref()) {
            (TensorData::F32(dst), TensorData::F32(src)) => dst.extend_from_slice(src),
            (TensorData::I32(dst), TensorData::I32(src)) => dst.extend_from_slice(src),
            (TensorData::Bool(dst), TensorData::Bool(src)) => dst.extend_from_slice(src),
            _ => return Err(anyhow!("cannot join tensors of mixed dtypes")),
        }
    }
    Ok(out)
}

/// Stack equally shaped tensors along a new leading axis.
pub fn stack(tensors: &[Tensor]) -> Result<Tensor> {
    if tensors.is_empty() {
        return Err(anyhow!("stack requires at least one tensor"));
    }
    check_uniform(tensors, "stack")?;
    let element_shape = tensors[0].shape().to_vec();
    if let Some(bad) = tensors.iter().find(|t| t.shape() != element_shape.as_slice()) {
        return Err(anyhow!(
            "stack: shape {:?} does not match {:?}",
            bad.shape(),
            element_shape
        ));
    }
    let mut shape = Vec::with_capacity(element_shape.len() + 1);
    shape.push(tensors.len());
    shape.extend(element_shape);
    Tensor::new(join_data(tensors)?, shape)
}

/// Concatenate tensors along their existing leading axis.
pub fn concat(tensors: &[Tensor]) -> Result<Tensor> {
    if tensors.is_empty() {
        return Err(anyhow!("concat requires at least one tensor"));
    }
    check_uniform(tensors, "concat")?;
    let first = tensors[0].shape();
    if first.is_empty() {
        return Err(anyhow!("concat requires tensors of rank >= 1"));
    }
    let tail = &first[1..];
    let mut leading = 0usize;
    for tensor in tensors {
        let shape = tensor.shape();
        if shape.is_empty() || &shape[1..] != tail {
            return Err(anyhow!(
                "concat: shape {:?} is incompatible with {:?}",
                shape,
                first
            ));
        }
        leading += shape[0];
    }
    let mut shape = Vec::with_capacity(first.len());
    shape.push(leading);
    shape.extend_from_slice(tail);
    Tensor::new(join_data(tensors)?, shape)
}

/// Split a tensor along its leading axis into `shape[0]` tensors of rank - 1.
pub fn unstack(tensor: &Tensor) -> Result<Vec<Tensor>> {
    let shape = tensor.shape();
    if shape.is_empty() {
        return Err(anyhow!("cannot unstack a scalar"));
    }
    let element_shape = shape[1..].to_vec();
    let stride = numel(&element_shape);
    let data = tensor.data()?;
    let mut out = Vec::with_capacity(shape[0]);
    for index in 0..shape[0] {
        let range = index * stride..(index + 1) * stride;
        let slice = match data.as_ref() {
            TensorData::F32(values) => TensorData::F32(values[range].to_vec()),
            TensorData::I32(values) => TensorData::I32(values[range].to_vec()),
            TensorData::Bool(values) => TensorData::Bool(values[range].to_vec()),
        };
        out.push(Tensor::new(slice, element_shape.clone())?);
    }
    Ok(out)
}
