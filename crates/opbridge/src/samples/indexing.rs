use super::{SampleArg, SampleContext, SampleInput, SampleIter, S};

/// Index list patterns applied to a `(S, S, S, S)` input: `0` leaves the axis unindexed,
/// `1..=3` selects the 1-D `(2,)`, 2-D `(S+1, 2)` or 3-D `(S+2, S+1, 2)` index tensor.
const INDEX_PATTERNS: &[&[u8]] = &[
    &[1],
    &[0, 1],
    &[0, 0, 0, 1],
    &[1, 0],
    &[1, 0, 0],
    &[0, 1, 0, 1],
    &[1, 0, 1, 0],
    &[0, 1, 1, 0],
    &[2],
    &[0, 2],
    &[0, 0, 0, 2],
    &[2, 0],
    &[2, 0, 0],
    &[0, 2, 0, 2],
    &[2, 0, 2, 0],
    &[0, 2, 2, 0],
    &[3],
    &[0, 3],
    &[0, 0, 0, 3],
    &[3, 0],
    &[3, 0, 0],
    &[0, 3, 0, 3],
    &[3, 0, 3, 0],
    &[0, 3, 3, 0],
    &[0, 3, 1, 2],
    &[2, 3, 1],
    &[2, 3, 1, 2],
];

/// Applied to an input whose leading axis is empty.
const EMPTY_LEADING_PATTERN: &[u8] = &[0, 1];

pub fn sample_inputs_index(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    let indices = [
        maker.make_long(&[2], 0, S as i64),
        maker.make_long(&[S + 1, 2], 0, S as i64),
        maker.make_long(&[S + 2, S + 1, 2], 0, S as i64),
    ];
    let cases = INDEX_PATTERNS
        .iter()
        .map(|&pattern| ([S, S, S, S], pattern))
        .chain(std::iter::once(([0, S, S, S], EMPTY_LEADING_PATTERN)));
    Box::new(cases.map(move |(dims, pattern)| {
        let list = pattern
            .iter()
            .map(|&slot| match slot {
                0 => None,
                rank => Some(indices[usize::from(rank) - 1].clone()),
            })
            .collect();
        SampleInput::new(maker.make(&dims), dtype).arg(SampleArg::TensorList(list))
    }))
}

/// `target_end == 1`: a single window along `dimension`, plus an empty-batch input.
pub fn sample_inputs_unfold(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    let cases: [&[usize]; 2] = [&[2, 3, 4], &[0, 3, 4]];
    Box::new(cases.into_iter().map(move |dims| {
        SampleInput::new(maker.make(dims), dtype)
            .arg(1i64)
            .arg(2i64)
            .arg(2i64)
    }))
}

const L: usize = 20;

/// `(input, src, [dim, start, end, step])`.
type SliceScatterCase = ([usize; 3], [usize; 3], [i64; 4]);

const SLICE_SCATTER_CASES: &[SliceScatterCase] = &[
    ([L, L, L], [L, L, L], [0, 0, L as i64, 1]),
    ([L, L, L], [L / 2, L, L], [0, L as i64 / 2, L as i64, 1]),
    ([L, L, L], [L / 4, L, L], [0, L as i64 / 2, L as i64, 2]),
    ([L, L, L], [L, L, L], [1, 0, L as i64, 1]),
    ([L, L, L], [L, L / 2, L], [1, L as i64 / 2, L as i64, 1]),
    ([L, L, L], [L, L / 4, L], [1, L as i64 / 2, L as i64, 2]),
    ([L, L, L], [L, L, L], [2, 0, L as i64, 1]),
    ([L, L, L], [L, L, L / 2], [2, L as i64 / 2, L as i64, 1]),
    ([L, L, L], [L, L, L / 4], [2, L as i64 / 2, L as i64, 2]),
    // end past the extent
    ([L, L, L], [L, L / 2, L], [1, L as i64 / 2, L as i64 * 2, 1]),
    ([L, L, L], [L, L, L], [-2, 0, L as i64, 1]),
    ([L, L, L], [L, L, L / 4], [-1, L as i64 / 2, L as i64 * 2, 2]),
    ([0, 4, 3], [0, 2, 3], [1, 0, 4, 2]),
];

pub fn sample_inputs_slice_scatter(ctx: &SampleContext) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    Box::new(
        SLICE_SCATTER_CASES
            .iter()
            .map(move |&(input, src, [dim, start, end, step])| {
                let input = maker.make(&input);
                SampleInput::new(input, dtype)
                    .arg(maker.make(&src))
                    .arg(dim)
                    .arg(start)
                    .arg(end)
                    .arg(step)
            }),
    )
}
