//! ONNX function-library composites, addressed in the `onnxfn` namespace.
//!
//! - Reductions take `axes` (default: every axis, an empty list means the same)
//!   and `keepdims` (default 1).
//! - `Hardmax` takes `axis` (default -1).
//! - `DepthToSpace` / `SpaceToDepth` take `blocksize`; `DepthToSpace` also takes
//!   `mode` (`DCR` by default, or `CRD`).

use crate::graph::GraphBuilder;
use crate::ir::ValueId;
use crate::lowering::{LowerResult, Lowering, LoweringRegistry, OpCall};

use super::common::{extent, reduction_axes, wrap_dim};

pub const REDUCE_SUM_SQUARE: Lowering =
    Lowering::new("onnxfn.reduce_sum_square", lower_reduce_sum_square);
pub const REDUCE_L1: Lowering = Lowering::new("onnxfn.reduce_l1", lower_reduce_l1);
pub const REDUCE_L2: Lowering = Lowering::new("onnxfn.reduce_l2", lower_reduce_l2);
pub const REDUCE_LOG_SUM: Lowering = Lowering::new("onnxfn.reduce_log_sum", lower_reduce_log_sum);
pub const REDUCE_LOG_SUM_EXP: Lowering =
    Lowering::new("onnxfn.reduce_log_sum_exp", lower_reduce_log_sum_exp);
pub const HARDMAX: Lowering = Lowering::new("onnxfn.hardmax", lower_hardmax);
pub const DEPTH_TO_SPACE: Lowering = Lowering::new("onnxfn.depth_to_space", lower_depth_to_space);
pub const SPACE_TO_DEPTH: Lowering = Lowering::new("onnxfn.space_to_depth", lower_space_to_depth);

pub(crate) fn register(registry: &mut LoweringRegistry) -> LowerResult<()> {
    registry.register_lowering(&["onnxfn::ReduceSumSquare"], REDUCE_SUM_SQUARE)?;
    registry.register_lowering(&["onnxfn::ReduceL1"], REDUCE_L1)?;
    registry.register_lowering(&["onnxfn::ReduceL2"], REDUCE_L2)?;
    registry.register_lowering(&["onnxfn::ReduceLogSum"], REDUCE_LOG_SUM)?;
    registry.register_lowering(&["onnxfn::ReduceLogSumExp"], REDUCE_LOG_SUM_EXP)?;
    registry.register_lowering(&["onnxfn::Hardmax"], HARDMAX)?;
    registry.register_lowering(&["onnxfn::DepthToSpace"], DEPTH_TO_SPACE)?;
    registry.register_lowering(&["onnxfn::SpaceToDepth"], SPACE_TO_DEPTH)?;
    Ok(())
}

/// `ReduceSum(pre(x), axes, keepdims)` with the attribute handling shared by the family.
fn reduce_sum_of<F>(builder: &mut GraphBuilder, call: &OpCall, pre: F) -> LowerResult<ValueId>
where
    F: FnOnce(&mut GraphBuilder, ValueId) -> LowerResult<ValueId>,
{
    let x = call.tensor(0, "data")?;
    let axes = call.opt_ints(1, "axes")?.filter(|axes| !axes.is_empty());
    let keepdims = call.int_or(2, "keepdims", 1)? != 0;
    let rank = builder.rank(x)?;
    let axes = reduction_axes(call, axes, rank)?;
    let input = pre(builder, x)?;
    Ok(builder.reduce_sum(input, &axes, keepdims)?)
}

pub fn lower_reduce_sum_square(
    builder: &mut GraphBuilder,
    call: &OpCall,
) -> LowerResult<Vec<ValueId>> {
    let out = reduce_sum_of(builder, call, |builder, x| Ok(builder.mul(x, x)?))?;
    Ok(vec![out])
}

pub fn lower_reduce_l1(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let out = reduce_sum_of(builder, call, |builder, x| Ok(builder.abs(x)?))?;
    Ok(vec![out])
}

pub fn lower_reduce_l2(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let sum = reduce_sum_of(builder, call, |builder, x| Ok(builder.mul(x, x)?))?;
    Ok(vec![builder.sqrt(sum)?])
}

pub fn lower_reduce_log_sum(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let sum = reduce_sum_of(builder, call, |_, x| Ok(x))?;
    Ok(vec![builder.log(sum)?])
}

/// Follows the function-library body literally: no max subtraction, so large
/// inputs overflow `Exp` the same way the composite does.
pub fn lower_reduce_log_sum_exp(
    builder: &mut GraphBuilder,
    call: &OpCall,
) -> LowerResult<Vec<ValueId>> {
    let sum = reduce_sum_of(builder, call, |builder, x| Ok(builder.exp(x)?))?;
    Ok(vec![builder.log(sum)?])
}

/// One-hot of the first maximum along `axis`, in the input dtype.
pub fn lower_hardmax(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "input")?;
    let spec = builder.spec(x)?.clone();
    if spec.rank() == 0 {
        return Err(call.invalid("Hardmax needs an input of rank >= 1"));
    }
    let axis = wrap_dim(call, call.int_or(1, "axis", -1)?, spec.rank())?;
    let depth = spec.dims()[axis];
    let indices = builder.argmax(x, axis, false)?;
    Ok(vec![builder.one_hot(indices, depth, axis, spec.dtype, (0.0, 1.0))?])
}

fn blocked_nchw(call: &OpCall, builder: &GraphBuilder, x: ValueId) -> LowerResult<[usize; 4]> {
    let dims = builder.dims(x)?;
    let [b, c, h, w] = dims[..] else {
        return Err(call.invalid(format!("expected a rank-4 NCHW input, got dims {dims:?}")));
    };
    Ok([b, c, h, w])
}

fn blocksize(call: &OpCall) -> LowerResult<usize> {
    let size = extent(call, call.int(1, "blocksize")?, "blocksize")?;
    if size == 0 {
        return Err(call.invalid("'blocksize' must be positive"));
    }
    Ok(size)
}

/// Moves channel blocks into spatial positions.
pub fn lower_depth_to_space(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "input")?;
    let [b, c, h, w] = blocked_nchw(call, builder, x)?;
    let s = blocksize(call)?;
    if c % (s * s) != 0 {
        return Err(call.invalid(format!(
            "channel count {c} is not divisible by blocksize² = {}",
            s * s
        )));
    }
    let depth = c / (s * s);
    let (split, perm) = match call.opt_str(2, "mode")?.unwrap_or("DCR") {
        "DCR" => ([b, s, s, depth, h, w], [0, 3, 4, 1, 5, 2]),
        "CRD" => ([b, depth, s, s, h, w], [0, 1, 4, 2, 5, 3]),
        other => return Err(call.invalid(format!("unknown DepthToSpace mode '{other}'"))),
    };
    let split = builder.reshape(x, &split)?;
    let moved = builder.transpose(split, &perm)?;
    Ok(vec![builder.reshape(moved, &[b, depth, h * s, w * s])?])
}

/// Inverse of `DepthToSpace` in DCR order.
pub fn lower_space_to_depth(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "input")?;
    let [b, c, h, w] = blocked_nchw(call, builder, x)?;
    let s = blocksize(call)?;
    if h % s != 0 || w % s != 0 {
        return Err(call.invalid(format!(
            "spatial dims {h}x{w} are not divisible by blocksize {s}"
        )));
    }
    let split = builder.reshape(x, &[b, c, h / s, s, w / s, s])?;
    let moved = builder.transpose(split, &[0, 3, 5, 1, 2, 4])?;
    Ok(vec![builder.reshape(moved, &[b, c * s * s, h / s, w / s])?])
}
