use tracing::warn;

use super::space::{ParamValue, ParameterSpace};
use super::{SampleArg, SampleContext, SampleInput, SampleIter};

/// Number of pooled spatial axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolRank {
    One,
    Two,
    Three,
}

impl PoolRank {
    /// Reads the rank off operator names such as `ops.aten.max_pool2d`.
    pub fn from_op_name(name: &str) -> Option<Self> {
        if name.contains("max_pool1d") {
            Some(PoolRank::One)
        } else if name.contains("max_pool2d") {
            Some(PoolRank::Two)
        } else if name.contains("max_pool3d") {
            Some(PoolRank::Three)
        } else {
            None
        }
    }
}

/// How the base space samples `stride`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrideStyle {
    /// An explicit empty stride list, which the operator reads as `stride = kernel_size`.
    Empty,
    /// `stride = 2` or omitted.
    WithIndices,
}

const SHAPE_AXES: [&str; 5] = ["batch", "channels", "spatial_0", "spatial_1", "spatial_2"];

/// Input extents come first so they vary slowest across the product.
fn shape_space(rank: PoolRank) -> ParameterSpace {
    let space = ParameterSpace::new()
        .axis(
            "batch",
            [
                ParamValue::Int(1),
                ParamValue::Int(2),
                ParamValue::Int(0),
                ParamValue::None,
            ],
        )
        .axis("channels", [2i64])
        .axis("spatial_0", [3i64, 6]);
    match rank {
        PoolRank::One => space,
        PoolRank::Two => space.axis("spatial_1", [6i64]),
        PoolRank::Three => space.axis("spatial_1", [6i64]).axis("spatial_2", [5i64]),
    }
}

fn base_space(rank: PoolRank, style: StrideStyle) -> ParameterSpace {
    let stride = match style {
        StrideStyle::Empty => vec![ParamValue::Ints(Vec::new())],
        StrideStyle::WithIndices => vec![ParamValue::Int(2), ParamValue::None],
    };
    shape_space(rank)
        .axis("kernel_size", [3i64])
        .axis("stride", stride)
        .axis("ceil_mode", [true, false])
        .axis("padding", [0i64, 1])
        .axis("dilation", [1i64])
}

/// Shared max-pool space, extended with per-rank tuple values.
pub fn max_pool_space(rank: PoolRank, style: StrideStyle) -> ParameterSpace {
    let space = base_space(rank, style);
    match rank {
        PoolRank::One => space
            .extend_axis("kernel_size", [vec![3i64]])
            .extend_axis("stride", [vec![2i64]])
            .extend_axis("padding", [vec![1i64]])
            .extend_axis("dilation", [vec![1i64]]),
        PoolRank::Two => space
            .extend_axis("kernel_size", [vec![3i64, 2]])
            .extend_axis("stride", [vec![2i64, 1]])
            .extend_axis("padding", [vec![1i64, 1]])
            .extend_axis("dilation", [vec![1i64, 2]]),
        PoolRank::Three => space
            .extend_axis("kernel_size", [vec![3i64, 2, 3]])
            .extend_axis("stride", [vec![2i64, 1, 2]])
            .extend_axis("dilation", [vec![1i64, 2, 1]]),
    }
}

fn param_to_arg(value: &ParamValue) -> SampleArg {
    match value {
        ParamValue::Bool(value) => SampleArg::Bool(*value),
        ParamValue::Int(value) => SampleArg::Int(*value),
        ParamValue::Float(value) => SampleArg::Float(*value),
        ParamValue::Ints(values) => SampleArg::Ints(values.clone()),
        ParamValue::Str(value) => SampleArg::Str((*value).to_string()),
        ParamValue::None => SampleArg::None,
    }
}

fn max_pool_samples(ctx: &SampleContext, style: StrideStyle) -> SampleIter {
    let Some(rank) = PoolRank::from_op_name(&ctx.op_name) else {
        warn!(op = %ctx.op_name, "no max-pool rank in operator name; yielding no samples");
        return Box::new(std::iter::empty());
    };
    let dtype = ctx.dtype;
    let mut maker = ctx.maker();
    Box::new(max_pool_space(rank, style).into_iter().map(move |combo| {
        // A `None` batch drops the leading axis.
        let dims: Vec<usize> = SHAPE_AXES
            .iter()
            .filter_map(|axis| combo.int(axis))
            .map(|extent| extent as usize)
            .collect();
        let mut sample = SampleInput::new(maker.make(&dims), dtype);
        for (name, value) in combo.entries() {
            if !SHAPE_AXES.contains(name) {
                sample = sample.kwarg(name, param_to_arg(value));
            }
        }
        sample
    }))
}

pub fn sample_inputs_max_pool_empty_strides(ctx: &SampleContext) -> SampleIter {
    max_pool_samples(ctx, StrideStyle::Empty)
}

pub fn sample_inputs_max_pool_with_indices(ctx: &SampleContext) -> SampleIter {
    max_pool_samples(ctx, StrideStyle::WithIndices)
}
