use crate::ir::DType;

use super::make::literal_tensor;
use super::space::{Combination, ParameterSpace};
use super::{SampleContext, SampleInput, SampleIter, M, S};

fn per_sample_weights_without_sum(combo: &Combination) -> bool {
    combo.bool("per_sample_weights") == Some(true) && combo.int("mode") != Some(0)
}

fn max_mode_with_2d_indices(combo: &Combination) -> bool {
    combo.int("mode") == Some(2) && combo.int("index_rank") == Some(2)
}

/// Base space shared by every embedding_bag variant.
///
/// `mode` follows the reference encoding: 0 = sum, 1 = mean, 2 = max.
pub fn embedding_bag_space(offsets: &[&[i64]]) -> ParameterSpace {
    ParameterSpace::new()
        .axis("offsets", offsets.iter().map(|values| values.to_vec()))
        .axis("include_last_offset", [true, false])
        .axis("per_sample_weights", [true, false])
        .axis("mode", [0i64, 1, 2])
        .exclude(
            "per_sample_weights_requires_sum",
            "per_sample_weights is only supported with mode='sum'",
            per_sample_weights_without_sum,
        )
        .exclude(
            "max_mode_crashes_with_2d_indices",
            "mode='max' with a 2-D index tensor crashes the reference kernel",
            max_mode_with_2d_indices,
        )
}

fn embedding_bag_samples(ctx: &SampleContext, space: ParameterSpace) -> SampleIter {
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    // The first combination is replayed once more against a zero-width table.
    let zero_width = space.iter().next().map(|combo| (combo, 0));
    let combos = space
        .into_iter()
        .map(|combo| (combo, S))
        .chain(zero_width);
    Box::new(combos.map(move |(combo, width)| {
        // `noncontiguous` changes only the reference framework's memory layout; payloads are dense here.
        let index_dims: &[usize] = if combo.int("index_rank") == Some(2) {
            &[S, S]
        } else {
            &[S]
        };
        let indices = maker.make_long(index_dims, 0, M as i64);
        let weights = (combo.bool("per_sample_weights") == Some(true))
            .then(|| maker.make(&[indices.len()]));
        let offsets = combo.ints("offsets").unwrap_or(&[]);
        let offsets = literal_tensor(
            DType::Si64,
            &[offsets.len()],
            &offsets.iter().map(|&v| v as f64).collect::<Vec<_>>(),
        );

        let mut sample = SampleInput::new(maker.make(&[M, width]), dtype)
            .arg(indices)
            .kwarg("offsets", offsets)
            .kwarg("mode", combo.int("mode").unwrap_or(0))
            .kwarg("per_sample_weights", weights)
            .kwarg(
                "include_last_offset",
                combo.bool("include_last_offset").unwrap_or(false),
            );
        if let Some(padding_idx) = combo.int("padding_idx") {
            sample = sample
                .kwarg("scale_grad_by_freq", false)
                .kwarg("sparse", false)
                .kwarg("padding_idx", padding_idx);
        }
        sample
    }))
}

pub fn sample_inputs_embedding_bag(ctx: &SampleContext) -> SampleIter {
    let space = embedding_bag_space(&[&[0, 2, 3], &[0, 0, 2], &[0, 2, 2, 4]])
        .axis("index_rank", [1i64, 2])
        .axis("noncontiguous", [false, true]);
    embedding_bag_samples(ctx, space)
}

/// Offsets with an empty leading bag are left out for this overload.
pub fn sample_inputs_embedding_bag_padding_idx(ctx: &SampleContext) -> SampleIter {
    let space = embedding_bag_space(&[&[0, 2, 3]])
        .axis("padding_idx", [-1i64, 0, 1, 2, 3])
        .axis("index_rank", [1i64])
        .axis("noncontiguous", [false, true]);
    embedding_bag_samples(ctx, space)
}
