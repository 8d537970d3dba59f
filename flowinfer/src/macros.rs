/// Build a [`crate::NamedTensors`] map from `name: tensor` pairs.
#[macro_export]
macro_rules! named_tensors {
    ({ $($name:ident : $value:expr),* $(,)? }) => {
        $crate::named_tensors!($($name : $value),*)
    };
    ($($name:ident : $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = $crate::NamedTensors::new();
        $( map.insert(stringify!($name).to_string(), $value); )*
        map
    }};
}

/// Bind named outputs to locals, panicking with the missing name.
#[macro_export]
macro_rules! fetch_outputs {
    ($outputs:expr, { $($name:ident),* $(,)? }) => {
        $(
            let $name: $crate::Tensor = $outputs
                .get(stringify!($name))
                .cloned()
                .unwrap_or_else(|| panic!("fetch_outputs failed for {}", stringify!($name)));
        )*
    };
}
