use super::space::ParameterSpace;
use super::{SampleArg, SampleContext, SampleInput, SampleIter, S};

const LOCAL_SCALAR_SHAPES: &[&[usize]] = &[
    &[],
    &[1],
    &[3],
    &[1, 1],
    &[1, 2],
    &[2, 1],
    &[1, 1, 1],
    &[2, 2, 2],
];

pub fn sample_inputs_local_scalar_dense(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    Box::new(
        LOCAL_SCALAR_SHAPES
            .iter()
            .map(move |dims| SampleInput::new(maker.make_range(dims, 0.0, 1.0), dtype)),
    )
}

/// Only `p = 0` is sampled: a lowered graph draws its mask from its own generator.
pub fn sample_inputs_native_dropout(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    let shapes: [&[usize]; 3] = [&[S, S], &[S], &[]];
    let space = ParameterSpace::new()
        .axis("shape", shapes.map(|dims| dims.iter().map(|&d| d as i64).collect::<Vec<_>>()))
        .axis("p", [0.0])
        .axis("train", [true, false]);
    Box::new(space.into_iter().map(move |combo| {
        SampleInput::new(maker.make(&combo.dims("shape")), dtype)
            .kwarg("p", combo.float("p").unwrap_or(0.0))
            .kwarg("train", combo.bool("train").unwrap_or(true))
    }))
}

const BERNOULLI_SHAPES: &[&[usize]] = &[&[3], &[], &[3, 2], &[2, 3, 2]];

fn bernoulli_samples(ctx: &SampleContext, probabilities: &'static [f64]) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    Box::new(BERNOULLI_SHAPES.iter().flat_map(move |dims| {
        probabilities
            .iter()
            .flat_map(|&p| {
                let input = maker.make_range(dims, 0.0, 1.0);
                let p = if p.fract() == 0.0 {
                    SampleArg::Int(p as i64)
                } else {
                    SampleArg::Float(p)
                };
                [
                    SampleInput::new(input.clone(), dtype).arg(p.clone()),
                    SampleInput::new(input, dtype).kwarg("p", p),
                ]
            })
            .collect::<Vec<_>>()
    }))
}

/// Every shape with `p` in `{0, 0.5, 1}`, passed positionally and by keyword.
pub fn sample_inputs_bernoulli_p(ctx: &SampleContext) -> SampleIter {
    bernoulli_samples(ctx, &[0.0, 0.5, 1.0])
}

/// The `p` values whose draws are fully determined.
pub fn sample_inputs_bernoulli_p_deterministic(ctx: &SampleContext) -> SampleIter {
    bernoulli_samples(ctx, &[0.0, 1.0])
}

fn scalar_samples(ctx: &SampleContext, values: [SampleArg; 2]) -> SampleIter {
    let dtype = ctx.dtype;
    Box::new(
        values
            .into_iter()
            .map(move |value| SampleInput::new(value, dtype).kwarg("dtype", SampleArg::DType(dtype))),
    )
}

pub fn sample_inputs_tensor_bool(ctx: &SampleContext) -> SampleIter {
    scalar_samples(ctx, [SampleArg::Bool(true), SampleArg::Bool(false)])
}

pub fn sample_inputs_tensor_float(ctx: &SampleContext) -> SampleIter {
    scalar_samples(ctx, [SampleArg::Float(3.0), SampleArg::Float(-1.0)])
}

pub fn sample_inputs_tensor_int(ctx: &SampleContext) -> SampleIter {
    scalar_samples(ctx, [SampleArg::Int(2), SampleArg::Int(-5)])
}

pub fn sample_inputs_stft(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    let mut samples = vec![
        SampleInput::new(maker.make(&[100]), dtype)
            .kwarg("n_fft", 10i64)
            .kwarg("return_complex", true),
        SampleInput::new(maker.make(&[100]), dtype)
            .kwarg("n_fft", 10i64)
            .kwarg("return_complex", false),
    ];
    if dtype.is_complex() {
        samples.push(SampleInput::new(maker.make(&[100]), dtype).kwarg("n_fft", 10i64));
    }
    samples.push(
        SampleInput::new(maker.make(&[10]), dtype)
            .kwarg("n_fft", 7i64)
            .kwarg("return_complex", true),
    );
    samples.push(
        SampleInput::new(maker.make(&[10, 100]), dtype)
            .kwarg("n_fft", 16i64)
            .kwarg("hop_length", 4i64)
            .kwarg("return_complex", true),
    );

    let window = maker.make_range(&[16], 0.5, 2.0);
    for batch in [2, 3] {
        samples.push(
            SampleInput::new(maker.make(&[batch, 100]), dtype)
                .kwarg("n_fft", 16i64)
                .kwarg("window", window.clone())
                .kwarg("return_complex", true),
        );
    }
    if !dtype.is_complex() {
        samples.push(
            SampleInput::new(maker.make(&[10, 100]), dtype)
                .kwarg("n_fft", 16i64)
                .kwarg("window", window)
                .kwarg("onesided", false)
                .kwarg("return_complex", true),
        );
    }
    samples.push(
        SampleInput::new(maker.make(&[0, 100]), dtype)
            .kwarg("n_fft", 16i64)
            .kwarg("return_complex", true),
    );
    Box::new(samples.into_iter())
}

pub fn sample_inputs_scaled_dot_product_flash_attention(ctx: &SampleContext) -> SampleIter {
    const BATCH: usize = 4;
    const SEQ_Q: usize = 3;
    const SEQ_KV: usize = 6;
    const NUM_HEADS: usize = 4;
    const HEAD_DIM: usize = 8;

    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    // The second non-causal sample is the attention-mask case, which passes no mask.
    let cases = [(BATCH, true), (BATCH, false), (BATCH, false), (0, true)];
    Box::new(cases.into_iter().map(move |(batch, is_causal)| {
        let q_dims = [batch, NUM_HEADS, SEQ_Q, HEAD_DIM];
        let kv_dims = [batch, NUM_HEADS, SEQ_KV, HEAD_DIM];
        SampleInput::new(maker.make(&q_dims), dtype)
            .arg(maker.make(&kv_dims))
            .arg(maker.make(&kv_dims))
            .kwarg("is_causal", is_causal)
            .kwarg("dropout_p", 0.0)
    }))
}
