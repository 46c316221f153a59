//! Neural-network and tensor-construction operators.
//!
//! Statistics (mean, variance) are computed with explicit sum reductions and a
//! reciprocal-count scale so that every lowering stays inside the closed
//! primitive vocabulary.

use crate::graph::GraphBuilder;
use crate::ir::{ComparisonOp, DType, ValueId};
use crate::lowering::{CallArg, LowerResult, Lowering, LoweringRegistry, OpCall};

use super::common::{extent, with_scalar_rank, wrap_dim};

pub const SOFTMAX: Lowering = Lowering::new("nn.softmax", lower_softmax);
pub const LAYER_NORM: Lowering = Lowering::new("nn.layer_norm", lower_layer_norm);
pub const NATIVE_GROUP_NORM: Lowering = Lowering::new("nn.native_group_norm", lower_native_group_norm);
pub const NATIVE_DROPOUT: Lowering = Lowering::new("nn.native_dropout", lower_native_dropout);
pub const BERNOULLI_P: Lowering = Lowering::new("nn.bernoulli_p", lower_bernoulli_p);
pub const LOCAL_SCALAR_DENSE: Lowering = Lowering::new("nn.local_scalar_dense", lower_local_scalar_dense);
pub const SCALAR_TENSOR: Lowering = Lowering::new("nn.scalar_tensor", lower_scalar_tensor);
pub const UNFOLD: Lowering = Lowering::new("nn.unfold", lower_unfold);
pub const SLICE_SCATTER: Lowering = Lowering::new("nn.slice_scatter", lower_slice_scatter);

pub(crate) fn register(registry: &mut LoweringRegistry) -> LowerResult<()> {
    registry.register_lowering(&["aten::_softmax"], SOFTMAX)?;
    registry.register_lowering(&["aten::layer_norm"], LAYER_NORM)?;
    registry.register_lowering(&["aten::native_group_norm"], NATIVE_GROUP_NORM)?;
    registry.register_lowering(&["aten::native_dropout"], NATIVE_DROPOUT)?;
    registry.register_lowering(&["aten::bernoulli.p"], BERNOULLI_P)?;
    registry.register_lowering(&["aten::_local_scalar_dense"], LOCAL_SCALAR_DENSE)?;
    registry.register_lowering(
        &["aten::tensor.bool", "aten::tensor.float", "aten::tensor.int"],
        SCALAR_TENSOR,
    )?;
    registry.register_lowering(&["aten::unfold"], UNFOLD)?;
    registry.register_lowering(&["aten::slice_scatter"], SLICE_SCATTER)?;
    Ok(())
}

/// `_softmax(self, dim, half_to_float)`.
pub fn lower_softmax(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "self")?;
    let dim = call.int(1, "dim")?;
    let half_to_float = call.bool_or(2, "half_to_float", false)?;
    let out = with_scalar_rank(builder, call, x, dim, |builder, value, axis| {
        Ok(builder.softmax(value, axis)?)
    })?;
    let out = if half_to_float {
        builder.cast(out, DType::F32)?
    } else {
        out
    };
    Ok(vec![out])
}

/// Mean over `axes` (kept as size-1 dims) and the centred input.
fn centre(
    builder: &mut GraphBuilder,
    x: ValueId,
    axes: &[usize],
    count: usize,
) -> LowerResult<(ValueId, ValueId)> {
    let dims = builder.dims(x)?;
    let sum = builder.reduce_sum(x, axes, true)?;
    let inv_count = builder.scalar_like(sum, 1.0 / count.max(1) as f64)?;
    let mean = builder.mul(sum, inv_count)?;
    let mean_full = builder.broadcast_to(mean, &dims)?;
    let centred = builder.sub(x, mean_full)?;
    Ok((mean, centred))
}

/// Biased variance of an already centred tensor.
fn variance(
    builder: &mut GraphBuilder,
    centred: ValueId,
    axes: &[usize],
    count: usize,
) -> LowerResult<ValueId> {
    let squared = builder.mul(centred, centred)?;
    let sum = builder.reduce_sum(squared, axes, true)?;
    let inv_count = builder.scalar_like(sum, 1.0 / count.max(1) as f64)?;
    Ok(builder.mul(sum, inv_count)?)
}

/// `rsqrt(var + eps)`.
fn inverse_std(builder: &mut GraphBuilder, var: ValueId, eps: f64) -> LowerResult<ValueId> {
    let eps = builder.scalar_like(var, eps)?;
    let shifted = builder.add(var, eps)?;
    Ok(builder.rsqrt(shifted)?)
}

fn ensure_float(call: &OpCall, builder: &GraphBuilder, value: ValueId) -> LowerResult<DType> {
    let dtype = builder.dtype(value)?;
    if dtype.is_float() {
        Ok(dtype)
    } else {
        Err(call.invalid(format!("expected a floating-point input, got {dtype}")))
    }
}

/// `layer_norm(input, normalized_shape, weight?, bias?, eps)`:
/// normalises over the trailing `len(normalized_shape)` axes with biased variance.
pub fn lower_layer_norm(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "input")?;
    ensure_float(call, builder, x)?;
    let normalized_shape = call.ints(1, "normalized_shape")?;
    let weight = call.opt_tensor(2, "weight")?;
    let bias = call.opt_tensor(3, "bias")?;
    let eps = call.float_or(4, "eps", 1e-5)?;

    let dims = builder.dims(x)?;
    let k = normalized_shape.len();
    if k == 0 || k > dims.len() {
        return Err(call.invalid(format!(
            "normalized_shape {normalized_shape:?} does not fit input of rank {}",
            dims.len()
        )));
    }
    let lead = dims.len() - k;
    let trailing = dims[lead..].iter().map(|&d| d as i64).collect::<Vec<_>>();
    if trailing != normalized_shape {
        return Err(call.invalid(format!(
            "normalized_shape {normalized_shape:?} does not match trailing dims {trailing:?}"
        )));
    }
    let axes = (lead..dims.len()).collect::<Vec<_>>();
    let count = dims[lead..].iter().product::<usize>();

    let (_, centred) = centre(builder, x, &axes, count)?;
    let var = variance(builder, centred, &axes, count)?;
    let inv_std = inverse_std(builder, var, eps)?;
    let inv_std = builder.broadcast_to(inv_std, &dims)?;
    let mut out = builder.mul(centred, inv_std)?;
    if let Some(weight) = weight {
        let weight = builder.broadcast_to(weight, &dims)?;
        out = builder.mul(out, weight)?;
    }
    if let Some(bias) = bias {
        let bias = builder.broadcast_to(bias, &dims)?;
        out = builder.add(out, bias)?;
    }
    Ok(vec![out])
}

/// `native_group_norm(input, weight?, bias?, N, C, HxW, group, eps)` returning
/// `(out, mean[N, group], rstd[N, group])`.
pub fn lower_native_group_norm(
    builder: &mut GraphBuilder,
    call: &OpCall,
) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "input")?;
    ensure_float(call, builder, x)?;
    let weight = call.opt_tensor(1, "weight")?;
    let bias = call.opt_tensor(2, "bias")?;
    let n = extent(call, call.int(3, "N")?, "N")?;
    let c = extent(call, call.int(4, "C")?, "C")?;
    let hxw = extent(call, call.int(5, "HxW")?, "HxW")?;
    let group = extent(call, call.int(6, "group")?, "group")?;
    let eps = call.float_or(7, "eps", 1e-5)?;

    let dims = builder.dims(x)?;
    if group == 0 || c % group != 0 {
        return Err(call.invalid(format!("C={c} is not divisible into {group} groups")));
    }
    if dims.len() < 2 || dims[0] != n || dims[1] != c || dims[2..].iter().product::<usize>() != hxw
    {
        return Err(call.invalid(format!(
            "input dims {dims:?} do not match N={n}, C={c}, HxW={hxw}"
        )));
    }

    let per_group = c / group * hxw;
    let grouped = builder.reshape(x, &[n, group, per_group])?;
    let (mean, centred) = centre(builder, grouped, &[2], per_group)?;
    let var = variance(builder, centred, &[2], per_group)?;
    let rstd = inverse_std(builder, var, eps)?;
    let rstd_full = builder.broadcast_to(rstd, &[n, group, per_group])?;
    let normalized = builder.mul(centred, rstd_full)?;
    let mut out = builder.reshape(normalized, &dims)?;

    let mut channel_dims = vec![1; dims.len()];
    channel_dims[1] = c;
    if let Some(weight) = weight {
        let weight = builder.reshape(weight, &channel_dims)?;
        let weight = builder.broadcast_to(weight, &dims)?;
        out = builder.mul(out, weight)?;
    }
    if let Some(bias) = bias {
        let bias = builder.reshape(bias, &channel_dims)?;
        let bias = builder.broadcast_to(bias, &dims)?;
        out = builder.add(out, bias)?;
    }
    let mean = builder.reshape(mean, &[n, group])?;
    let rstd = builder.reshape(rstd, &[n, group])?;
    Ok(vec![out, mean, rstd])
}

fn all_true(builder: &mut GraphBuilder, dims: &[usize]) -> LowerResult<ValueId> {
    let flag = builder.constant_scalar(DType::I1, 1.0)?;
    Ok(builder.broadcast_to(flag, dims)?)
}

/// `native_dropout(input, p, train)` returning `(output, mask)`.
///
/// Inference (`train = false`) and `p = 0` are the identity with an all-true
/// mask; `p = 1` drops everything. Otherwise the mask keeps elements whose
/// uniform draw is `>= p` and survivors are scaled by `1 / (1 - p)`.
pub fn lower_native_dropout(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "input")?;
    let p = call.float(1, "p")?;
    let train = call.bool_or(2, "train", true)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(call.invalid(format!("dropout probability must be in [0, 1], got {p}")));
    }
    let dims = builder.dims(x)?;
    if !train || p == 0.0 {
        let mask = all_true(builder, &dims)?;
        return Ok(vec![x, mask]);
    }

    let dtype = ensure_float(call, builder, x)?;
    if p == 1.0 {
        let zeros = builder.scalar_like(x, 0.0)?;
        let flag = builder.constant_scalar(DType::I1, 0.0)?;
        let mask = builder.broadcast_to(flag, &dims)?;
        return Ok(vec![zeros, mask]);
    }
    let draws = builder.rng_uniform(&dims, dtype)?;
    let threshold = builder.scalar_like(draws, p)?;
    let mask = builder.compare(ComparisonOp::GreaterEqual, draws, threshold)?;
    let keep = builder.cast(mask, dtype)?;
    let kept = builder.mul(x, keep)?;
    let scale = builder.scalar_like(kept, 1.0 / (1.0 - p))?;
    Ok(vec![builder.mul(kept, scale)?, mask])
}

/// `bernoulli(self, p)`: `Cast(uniform < p)`; `p` of 0 or 1 makes the draw irrelevant.
pub fn lower_bernoulli_p(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "self")?;
    let p = call.float(1, "p")?;
    if !(0.0..=1.0).contains(&p) {
        return Err(call.invalid(format!("bernoulli probability must be in [0, 1], got {p}")));
    }
    let spec = builder.spec(x)?.clone();
    let draw_dtype = if spec.dtype.is_float() {
        spec.dtype
    } else {
        DType::F32
    };
    let draws = builder.rng_uniform(spec.dims(), draw_dtype)?;
    let threshold = builder.scalar_like(draws, p)?;
    let hits = builder.compare(ComparisonOp::Less, draws, threshold)?;
    Ok(vec![builder.cast(hits, spec.dtype)?])
}

/// `_local_scalar_dense(self)`: the first element, as a rank-0 tensor.
pub fn lower_local_scalar_dense(
    builder: &mut GraphBuilder,
    call: &OpCall,
) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "self")?;
    let spec = builder.spec(x)?.clone();
    if spec.element_count() == 0 {
        return Err(call.invalid("cannot read a scalar out of an empty tensor"));
    }
    if spec.rank() == 0 {
        return Ok(vec![x]);
    }
    let flat = builder.reshape(x, &[spec.element_count()])?;
    let first = builder.slice(flat, &[0], &[1])?;
    Ok(vec![builder.reshape(first, &[])?])
}

/// `tensor(t, dtype=None)` for a Python bool, float or int scalar.
pub fn lower_scalar_tensor(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let (value, inferred) = match call.param(0, "t") {
        Some(CallArg::Bool(flag)) => (f64::from(u8::from(*flag)), DType::I1),
        Some(CallArg::Float(value)) => (*value, DType::F32),
        Some(CallArg::Int(value)) => (*value as f64, DType::Si64),
        Some(_) => return Err(call.invalid("'t' must be a bool, float or int scalar")),
        None => return Err(call.invalid("missing argument 't' (position 0)")),
    };
    let dtype = call.opt_dtype(1, "dtype")?.unwrap_or(inferred);
    Ok(vec![builder.constant_scalar(dtype, value)?])
}

/// `unfold(self, dimension, size, step)`: every window along `dimension`
/// becomes a new trailing axis of length `size`.
pub fn lower_unfold(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "self")?;
    let dimension = call.int(1, "dimension")?;
    let size = extent(call, call.int(2, "size")?, "size")?;
    let step = extent(call, call.int(3, "step")?, "step")?;
    if step == 0 {
        return Err(call.invalid("'step' must be positive"));
    }

    let rank = builder.rank(x)?;
    let (source, axis) = if rank == 0 {
        wrap_dim(call, dimension, 1)?;
        (builder.unsqueeze(x, &[0])?, 0)
    } else {
        (x, wrap_dim(call, dimension, rank)?)
    };
    let dims = builder.dims(source)?;
    if size > dims[axis] {
        return Err(call.invalid(format!(
            "window size {size} exceeds extent {} of dimension {axis}",
            dims[axis]
        )));
    }
    let windows = (dims[axis] - size) / step + 1;
    let mut perm = (0..dims.len()).filter(|&d| d != axis).collect::<Vec<_>>();
    perm.push(axis);

    let mut pieces = Vec::with_capacity(windows);
    for window in 0..windows {
        let slice = builder.slice_axis(source, axis, window * step, size)?;
        let moved = builder.transpose(slice, &perm)?;
        pieces.push(builder.unsqueeze(moved, &[axis])?);
    }
    let out = builder.concat(&pieces, axis)?;
    let out = if rank == 0 {
        builder.squeeze(out, &[0])?
    } else {
        out
    };
    Ok(vec![out])
}

/// Contiguous run along the scatter axis, taken from `self` or from `src`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run {
    Input { start: usize, len: usize },
    Source { start: usize, len: usize },
}

/// Splits `0..extent` into runs, taking positions `start, start+step, … < end` from `src`.
fn scatter_runs(extent: usize, start: usize, end: usize, step: usize) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    let mut src_index = 0;
    for position in 0..extent {
        let from_source = position >= start && position < end && (position - start) % step == 0;
        match (runs.last_mut(), from_source) {
            (Some(Run::Source { len, .. }), true) if step == 1 => *len += 1,
            (Some(Run::Input { len, .. }), false) => *len += 1,
            (_, true) => runs.push(Run::Source {
                start: src_index,
                len: 1,
            }),
            (_, false) => runs.push(Run::Input {
                start: position,
                len: 1,
            }),
        }
        if from_source {
            src_index += 1;
        }
    }
    runs
}

fn clamp_index(value: i64, extent: usize) -> usize {
    let extent = extent as i64;
    let wrapped = if value < 0 { value + extent } else { value };
    wrapped.clamp(0, extent) as usize
}

/// `slice_scatter(self, src, dim, start, end, step)`.
pub fn lower_slice_scatter(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "self")?;
    let src = call.tensor(1, "src")?;
    let dims = builder.dims(x)?;
    if dims.is_empty() {
        return Err(call.invalid("slice_scatter needs an input of rank >= 1"));
    }
    let axis = wrap_dim(call, call.int_or(2, "dim", 0)?, dims.len())?;
    let extent_len = dims[axis];
    let start = clamp_index(call.opt_int(3, "start")?.unwrap_or(0), extent_len);
    let end = match call.opt_int(4, "end")? {
        Some(end) => clamp_index(end, extent_len),
        None => extent_len,
    }
    .max(start);
    let step = extent(call, call.int_or(5, "step", 1)?, "step")?;
    if step == 0 {
        return Err(call.invalid("'step' must be positive"));
    }

    let selected = (end - start).div_ceil(step);
    let mut expected = dims.clone();
    expected[axis] = selected;
    let src_dims = builder.dims(src)?;
    if src_dims != expected {
        return Err(call.invalid(format!(
            "src dims {src_dims:?} do not match the slice dims {expected:?}"
        )));
    }
    let dtype = builder.dtype(x)?;
    let src = builder.cast(src, dtype)?;
    if selected == 0 {
        return Ok(vec![x]);
    }

    let runs = scatter_runs(extent_len, start, end, step);
    let mut pieces = Vec::with_capacity(runs.len());
    for run in runs {
        let piece = match run {
            Run::Input { start, len } => builder.slice_axis(x, axis, start, len)?,
            Run::Source { start, len } => builder.slice_axis(src, axis, start, len)?,
        };
        pieces.push(piece);
    }
    Ok(vec![builder.concat(&pieces, axis)?])
}

#[cfg(test)]
mod tests {
    use super::{scatter_runs, Run};

    #[test]
    fn strided_runs_interleave_input_and_source() {
        let runs = scatter_runs(6, 1, 6, 2);
        assert_eq!(
            runs,
            vec![
                Run::Input { start: 0, len: 1 },
                Run::Source { start: 0, len: 1 },
                Run::Input { start: 2, len: 1 },
                Run::Source { start: 1, len: 1 },
                Run::Input { start: 4, len: 1 },
                Run::Source { start: 2, len: 1 },
            ]
        );
    }

    #[test]
    fn unit_step_merges_the_source_run() {
        let runs = scatter_runs(5, 1, 3, 1);
        assert_eq!(
            runs,
            vec![
                Run::Input { start: 0, len: 1 },
                Run::Source { start: 0, len: 2 },
                Run::Input { start: 3, len: 2 },
            ]
        );
    }
}
