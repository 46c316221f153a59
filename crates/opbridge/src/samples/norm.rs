use super::space::ParameterSpace;
use super::{SampleArg, SampleContext, SampleInput, SampleIter, M, S};

/// `(input, normalized_shape, eps)`.
const LAYER_NORM_CASES: &[(&[usize], &[usize], f64)] = &[
    (&[1, 2, 3], &[1, 2, 3], 0.5),
    (&[2, 2, 3], &[2, 3], -0.5),
    (&[1], &[1], 1e-5),
    (&[1, 2], &[2], 1e-5),
    (&[0, 1], &[1], 1e-5),
];

/// Every case with weight and bias each present or absent.
pub fn sample_inputs_layer_norm(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    let space = ParameterSpace::new()
        .axis("case", 0..LAYER_NORM_CASES.len() as i64)
        .axis("bias", [true, false])
        .axis("weight", [true, false]);
    Box::new(space.into_iter().map(move |combo| {
        let (input, normalized, eps) = LAYER_NORM_CASES[combo.int("case").unwrap_or(0) as usize];
        let weight = (combo.bool("weight") == Some(true)).then(|| maker.make(normalized));
        let bias = (combo.bool("bias") == Some(true)).then(|| maker.make(normalized));
        SampleInput::new(maker.make(input), dtype)
            .arg(normalized.iter().map(|&d| d as i64).collect::<Vec<_>>())
            .arg(weight)
            .arg(bias)
            .arg(eps)
    }))
}

/// `(input, group, eps)`; `N`, `C` and `HxW` are read off the input shape.
const GROUP_NORM_CASES: &[([usize; 3], i64, f64)] = &[
    ([1, 6, 3], 2, 0.5),
    ([2, 6, 3], 3, -0.5),
    ([5, 5, 5], 1, 1e-5),
    ([5, 8, 10], 4, 1e-5),
    ([0, 6, 3], 3, 1e-5),
];

pub fn sample_inputs_native_group_norm(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    Box::new(GROUP_NORM_CASES.iter().map(move |&(input, group, eps)| {
        let [n, c, hxw] = input;
        let weight = maker.make(&[c]);
        let bias = maker.make(&[c]);
        SampleInput::new(maker.make(&input), dtype)
            .arg(weight)
            .arg(bias)
            .arg(n as i64)
            .arg(c as i64)
            .arg(hxw as i64)
            .kwarg("group", group)
            .kwarg("eps", eps)
    }))
}

const SOFTMAX_CASES: &[(&[usize], i64)] = &[
    (&[S], 0),
    (&[S, S], 0),
    (&[S, S], 1),
    (&[S, S], -1),
    (&[S, M, S], 2),
    (&[S, 0, 0], -1),
];

/// `half_to_float` stays false: the reference kernel has no CPU path for it.
pub fn sample_inputs_softmax(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    let space = ParameterSpace::new()
        .axis("case", 0..SOFTMAX_CASES.len() as i64)
        .axis("half_to_float", [false]);
    Box::new(space.into_iter().map(move |combo| {
        let (dims, dim) = SOFTMAX_CASES[combo.int("case").unwrap_or(0) as usize];
        SampleInput::new(maker.make(dims), dtype)
            .arg(dim)
            .kwarg(
                "half_to_float",
                SampleArg::Bool(combo.bool("half_to_float").unwrap_or(false)),
            )
    }))
}
