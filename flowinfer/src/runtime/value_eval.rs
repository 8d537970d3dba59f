use anyhow::{anyhow, Result};

use crate::tensor::Tensor;

fn single<T: Copy>(values: &[T], what: &str, shape: &[usize]) -> Result<T> {
    match values {
        [value] => Ok(*value),
        _ => Err(anyhow!("{} must be a single value, got shape {:?}", what, shape)),
    }
}

/// Truth value of a single-element predicate tensor.
pub fn scalar_bool(tensor: &Tensor) -> Result<bool> {
    single(&tensor.to_bool_vec()?, "predicate", tensor.shape())
}

pub fn scalar_i32(tensor: &Tensor) -> Result<i32> {
    single(&tensor.to_i32_vec()?, "scalar", tensor.shape())
}

pub fn scalar_index(tensor: &Tensor) -> Result<usize> {
    let value = scalar_i32(tensor)?;
    usize::try_from(value).map_err(|_| anyhow!("index must be non-negative, got {}", value))
}

/// Flatten an integer tensor into non-negative indices.
pub fn index_list(tensor: &Tensor) -> Result<Vec<usize>> {
    tensor
        .to_i32_vec()?
        .into_iter()
        .map(|value| {
            usize::try_from(value).map_err(|_| anyhow!("index must be non-negative, got {}", value))
        })
        .collect()
}
