use super::make::literal_tensor;
use super::space::ParameterSpace;
use super::{SampleArg, SampleContext, SampleInput, SampleIter, S};

const REDUCE_CASES: &[(&[usize], Option<&[i64]>)] = &[
    (&[S], None),
    (&[S], Some(&[0])),
    (&[3, 4], Some(&[1])),
    (&[3, 4], Some(&[-1, 0])),
    (&[2, 3, 4], Some(&[0, 2])),
    (&[2, 3, 4], None),
    (&[0, 3], Some(&[1])),
    (&[0, 3], Some(&[0])),
];

/// Shared by the onnxfn reductions. Payloads stay positive so `Log` of a sum is defined.
pub fn sample_inputs_reduce_composite(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    let space = ParameterSpace::new()
        .axis("case", 0..REDUCE_CASES.len() as i64)
        .axis("keepdims", [0i64, 1]);
    Box::new(space.into_iter().map(move |combo| {
        let (dims, axes) = REDUCE_CASES[combo.int("case").unwrap_or(0) as usize];
        let mut sample = SampleInput::new(maker.make_range(dims, 0.1, 2.0), dtype)
            .kwarg("keepdims", combo.int("keepdims").unwrap_or(1));
        if let Some(axes) = axes {
            sample = sample.kwarg("axes", axes.to_vec());
        }
        sample
    }))
}

const HARDMAX_CASES: &[(&[usize], i64)] = &[
    (&[S], 0),
    (&[3, 4], 1),
    (&[3, 4], 0),
    (&[2, 3, 4], -1),
    (&[0, 3], 1),
];

/// Random `(shape, axis)` cases plus a tied input: ties resolve to the first maximum.
pub fn sample_inputs_hardmax(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    let random = HARDMAX_CASES.iter().map(move |&(dims, axis)| {
        SampleInput::new(maker.make(dims), dtype).kwarg("axis", axis)
    });
    let ties = SampleInput::new(
        literal_tensor(dtype, &[2, 3], &[1.0, 3.0, 3.0, 2.0, 2.0, 1.0]),
        dtype,
    )
    .kwarg("axis", 1i64);
    Box::new(random.chain(std::iter::once(ties)))
}

const DEPTH_TO_SPACE_CASES: &[(&[usize], i64)] =
    &[(&[1, 8, 2, 3], 2), (&[2, 4, 3, 3], 2), (&[1, 9, 2, 2], 3), (&[0, 4, 2, 2], 2)];

pub fn sample_inputs_depth_to_space(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    let space = ParameterSpace::new()
        .axis("case", 0..DEPTH_TO_SPACE_CASES.len() as i64)
        .axis("mode", ["DCR", "CRD"]);
    Box::new(space.into_iter().map(move |combo| {
        let (dims, blocksize) = DEPTH_TO_SPACE_CASES[combo.int("case").unwrap_or(0) as usize];
        SampleInput::new(maker.make(dims), dtype)
            .kwarg("blocksize", blocksize)
            .kwarg("mode", SampleArg::Str(combo.str("mode").unwrap_or("DCR").to_string()))
    }))
}

const SPACE_TO_DEPTH_CASES: &[(&[usize], i64)] =
    &[(&[1, 2, 4, 6], 2), (&[2, 1, 6, 6], 3), (&[1, 3, 2, 2], 2), (&[0, 1, 2, 2], 2)];

pub fn sample_inputs_space_to_depth(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    Box::new(SPACE_TO_DEPTH_CASES.iter().map(move |&(dims, blocksize)| {
        SampleInput::new(maker.make(dims), dtype).kwarg("blocksize", blocksize)
    }))
}
