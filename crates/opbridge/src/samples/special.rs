use std::f64::consts::E;

use crate::ir::DType;

use super::make::literal_tensor;
use super::space::{ParamValue, ParameterSpace};
use super::{SampleArg, SampleContext, SampleInput, SampleIter, M, S};

/// Shape classes for elementwise special functions, boundary shapes first.
pub const SPECIAL_UNARY_SHAPES: &[&[usize]] = &[&[], &[0], &[S], &[S, S], &[2, 0, 3]];

fn shape_axis(shapes: &[&[usize]]) -> Vec<ParamValue> {
    shapes
        .iter()
        .map(|dims| ParamValue::Ints(dims.iter().map(|&dim| dim as i64).collect()))
        .collect()
}

fn unary_samples(ctx: &SampleContext, low: f64, high: f64) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    let space = ParameterSpace::new().axis("shape", shape_axis(SPECIAL_UNARY_SHAPES));
    Box::new(space.into_iter().map(move |combo| {
        let dims = combo.dims("shape");
        SampleInput::new(maker.make_range(&dims, low, high), dtype)
    }))
}

/// erf / erfc family: every shape class over the default value range.
pub fn sample_inputs_special_unary(ctx: &SampleContext) -> SampleIter {
    unary_samples(ctx, -9.0, 9.0)
}

/// erfcx is built on `1 - erf(x)`, which cancels catastrophically for large positive x;
/// the range stays where that composition is representable.
pub fn sample_inputs_erfcx(ctx: &SampleContext) -> SampleIter {
    unary_samples(ctx, -3.0, 2.0)
}

const XLOGY_SELF: [f64; 9] = [0.0, 0.0, 2.0, 3.0, -0.0, 1.0, f64::NAN, 0.0, 2.0];
const XLOGY_OTHER: [f64; 9] = [f64::NAN, 5.0, 1.0, E, 2.0, 0.0, 1.0, f64::INFINITY, -1.0];

/// Random tensor/tensor and tensor/scalar pairs, then fixed samples covering the NaN and zero table.
pub fn sample_inputs_xlogy(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    let space = ParameterSpace::new()
        .axis("shape", shape_axis(SPECIAL_UNARY_SHAPES))
        .axis("other", ["tensor", "scalar"]);
    let random = space.into_iter().map(move |combo| {
        let dims = combo.dims("shape");
        let input = maker.make(&dims);
        let other = match combo.str("other") {
            Some("scalar") => SampleArg::Float(2.5),
            _ => SampleArg::Tensor(maker.make_range(&dims, 0.0, 9.0)),
        };
        SampleInput::new(input, dtype).arg(other)
    });

    let table = SampleInput::new(
        literal_tensor(dtype, &[XLOGY_SELF.len()], &XLOGY_SELF),
        dtype,
    )
    .arg(literal_tensor(dtype, &[XLOGY_OTHER.len()], &XLOGY_OTHER));
    let zero_nan = SampleInput::new(literal_tensor(dtype, &[], &[0.0]), dtype)
        .arg(literal_tensor(dtype, &[], &[f64::NAN]));
    let zero_two = SampleInput::new(literal_tensor(dtype, &[], &[0.0]), dtype)
        .arg(literal_tensor(dtype, &[], &[2.0]));
    let broadcast = SampleInput::new(literal_tensor(dtype, &[2, 1], &[0.0, 3.0]), dtype)
        .arg(literal_tensor(dtype, &[3], &[1.0, E, f64::NAN]));

    Box::new(random.chain([table, zero_nan, zero_two, broadcast]))
}

const LOG_SOFTMAX_CASES: &[(&[usize], i64)] = &[
    (&[], 0),
    (&[], -1),
    (&[S], 0),
    (&[S, S], 1),
    (&[S, S], -1),
    (&[S, 0], 0),
    (&[S, M, S], 2),
];

/// `(shape, dim)` cases crossed with an explicit float32 `dtype` argument.
pub fn sample_inputs_log_softmax(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    let space = ParameterSpace::new()
        .axis("case", 0..LOG_SOFTMAX_CASES.len() as i64)
        .axis("dtype_kwarg", [false, true]);
    Box::new(space.into_iter().map(move |combo| {
        let (dims, dim) = LOG_SOFTMAX_CASES[combo.int("case").unwrap_or(0) as usize];
        let sample = SampleInput::new(maker.make(dims), dtype).arg(dim);
        if combo.bool("dtype_kwarg") == Some(true) {
            sample.kwarg("dtype", SampleArg::DType(DType::F32))
        } else {
            sample
        }
    }))
}
