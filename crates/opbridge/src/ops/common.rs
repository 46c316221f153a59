//! Helpers shared by lowerings: axis handling, scalar promotion and rank-0 normalisation.

use crate::graph::{normalize_axis, GraphBuilder};
use crate::ir::ValueId;
use crate::lowering::{CallArg, LowerResult, OpCall};

/// Wraps a user-facing axis, reporting out-of-range values as an invalid argument.
pub(crate) fn wrap_dim(call: &OpCall, dim: i64, rank: usize) -> LowerResult<usize> {
    normalize_axis(dim, rank).map_err(|err| call.invalid(format!("{err:#}")))
}

/// Runs an axis-based primitive on a rank-0 input by viewing it as rank 1.
///
/// The high-level operators accept `dim` in `[-1, 0]` on scalars; the
/// primitives require rank >= 1, so the input is unsqueezed, `op` runs on axis
/// 0 and the result is squeezed back. Rank >= 1 inputs go straight through with
/// the wrapped `dim`.
pub(crate) fn with_scalar_rank<F>(
    builder: &mut GraphBuilder,
    call: &OpCall,
    value: ValueId,
    dim: i64,
    op: F,
) -> LowerResult<ValueId>
where
    F: FnOnce(&mut GraphBuilder, ValueId, usize) -> LowerResult<ValueId>,
{
    let rank = builder.rank(value)?;
    if rank > 0 {
        let axis = wrap_dim(call, dim, rank)?;
        return op(builder, value, axis);
    }
    wrap_dim(call, dim, 1)?;
    let lifted = builder.unsqueeze(value, &[0])?;
    let result = op(builder, lifted, 0)?;
    Ok(builder.squeeze(result, &[0])?)
}

/// Reads a tensor-or-number operand, materialising numbers as constants of `like`'s dtype.
pub(crate) fn tensor_or_scalar(
    builder: &mut GraphBuilder,
    call: &OpCall,
    index: usize,
    name: &str,
    like: ValueId,
) -> LowerResult<ValueId> {
    let dtype = builder.dtype(like)?;
    match call.param(index, name) {
        Some(CallArg::Tensor(value)) => Ok(builder.cast(*value, dtype)?),
        Some(CallArg::Float(value)) => Ok(builder.constant_scalar(dtype, *value)?),
        Some(CallArg::Int(value)) => Ok(builder.constant_scalar(dtype, *value as f64)?),
        Some(CallArg::Bool(value)) => Ok(builder.constant_scalar(dtype, f64::from(u8::from(*value)))?),
        Some(_) => Err(call.invalid(format!("argument '{name}' must be a tensor or a number"))),
        None => Err(call.invalid(format!("missing argument '{name}' (position {index})"))),
    }
}

/// Resolves an optional `axes` list against `rank`; absent means every axis.
pub(crate) fn reduction_axes(
    call: &OpCall,
    axes: Option<Vec<i64>>,
    rank: usize,
) -> LowerResult<Vec<usize>> {
    match axes {
        None => Ok((0..rank).collect()),
        Some(axes) => {
            let mut wrapped = axes
                .into_iter()
                .map(|axis| wrap_dim(call, axis, rank))
                .collect::<LowerResult<Vec<_>>>()?;
            wrapped.sort_unstable();
            wrapped.dedup();
            Ok(wrapped)
        }
    }
}

/// Reads a non-negative size-like argument.
pub(crate) fn extent(call: &OpCall, value: i64, name: &str) -> LowerResult<usize> {
    usize::try_from(value).map_err(|_| call.invalid(format!("'{name}' must be non-negative, got {value}")))
}
