pub fn numel(shape: &[usize]) -> usize {
    shape.iter().copied().product::<usize>()
}

/// Whether a concrete shape satisfies a declared one. Declared dimensions of
/// `-1` accept any size; ranks must agree.
pub fn shape_matches(declared: &[i64], actual: &[usize]) -> bool {
    declared.len() == actual.len()
        && declared
            .iter()
            .zip(actual.iter())
            .all(|(expected, dim)| *expected == -1 || *expected == *dim as i64)
}

pub(crate) fn to_declared(shape: &[usize]) -> Vec<i64> {
    shape.iter().map(|dim| *dim as i64).collect()
}
