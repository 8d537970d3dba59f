use anyhow::{anyhow, Result};

/// Numpy-style broadcast of two shapes, aligned from the right.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let out_rank = a.len().max(b.len());
    let mut out = vec![1usize; out_rank];
    for (i, slot) in out.iter_mut().enumerate() {
        let a_dim = dim_from_right(a, out_rank, i);
        let b_dim = dim_from_right(b, out_rank, i);
        if a_dim == b_dim || a_dim == 1 || b_dim == 1 {
            *slot = if a_dim == 1 { b_dim } else { a_dim };
        } else {
            return Err(anyhow!(
                "incompatible broadcast shapes {:?} and {:?}",
                a,
                b
            ));
        }
    }
    Ok(out)
}

/// Apply `f` over the broadcast of `lhs` and `rhs`, producing row-major output.
pub fn broadcast_map<T: Copy, U>(
    lhs: (&[T], &[usize]),
    rhs: (&[T], &[usize]),
    out_shape: &[usize],
    f: impl Fn(T, T) -> U,
) -> Vec<U> {
    let out_rank = out_shape.len();
    let lhs_strides = broadcast_strides(lhs.1, out_rank);
    let rhs_strides = broadcast_strides(rhs.1, out_rank);
    let total = out_shape.iter().product::<usize>();
    let mut index = vec![0usize; out_rank];
    let mut out = Vec::with_capacity(total);
    for _ in 0..total {
        let a = lhs.0[linear_offset(&index, &lhs_strides)];
        let b = rhs.0[linear_offset(&index, &rhs_strides)];
        out.push(f(a, b));
        bump_index(&mut index, out_shape);
    }
    out
}

fn broadcast_strides(shape: &[usize], out_rank: usize) -> Vec<usize> {
    let mut strides = vec![0usize; shape.len()];
    let mut stride = 1;
    for (i, dim) in shape.iter().enumerate().rev() {
        strides[i] = stride;
        stride *= dim;
    }
    let offset = out_rank - shape.len();
    (0..out_rank)
        .map(|i| {
            if i < offset || shape[i - offset] == 1 {
                0
            } else {
                strides[i - offset]
            }
        })
        .collect()
}

fn dim_from_right(shape: &[usize], out_rank: usize, idx: usize) -> usize {
    let offset = out_rank - shape.len();
    if idx < offset {
        1
    } else {
        shape[idx - offset]
    }
}

fn linear_offset(indices: &[usize], strides: &[usize]) -> usize {
    indices
        .iter()
        .zip(strides.iter())
        .map(|(i, s)| i * s)
        .sum()
}

fn bump_index(index: &mut [usize], shape: &[usize]) {
    for (i, dim) in shape.iter().enumerate().rev() {
        index[i] += 1;
        if index[i] < *dim {
            return;
        }
        index[i] = 0;
    }
}
