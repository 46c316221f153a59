//! Special functions: the error-function family, `xlogy` and `log_softmax`.
//!
//! Derived functions are composed from the lowering they are defined by
//! (`erfc` calls the `erf` lowering, `erfcx` calls `erfc`) so that every
//! member of a family shares one numerical path.

use anyhow::anyhow;

use crate::graph::GraphBuilder;
use crate::ir::{ComparisonOp, ValueId};
use crate::lowering::{LowerResult, Lowering, LoweringRegistry, OpCall};

use super::common::{tensor_or_scalar, with_scalar_rank};

pub const ERF: Lowering = Lowering::new("special.erf", lower_erf);
pub const ERFC: Lowering = Lowering::new("special.erfc", lower_erfc);
pub const ERFCX: Lowering = Lowering::new("special.erfcx", lower_erfcx);
pub const XLOGY: Lowering = Lowering::new("special.xlogy", lower_xlogy);
pub const LOG_SOFTMAX: Lowering = Lowering::new("special.log_softmax", lower_log_softmax);

/// Operators of the special-function namespace that are catalogued without a lowering.
pub const PENDING_SPECIAL: &[&str] = &[
    "aten::special_airy_ai",
    "aten::special_bessel_j0",
    "aten::special_bessel_j1",
    "aten::special_bessel_y0",
    "aten::special_bessel_y1",
    "aten::special_chebyshev_polynomial_t",
    "aten::special_chebyshev_polynomial_u",
    "aten::special_chebyshev_polynomial_v",
    "aten::special_chebyshev_polynomial_w",
    "aten::special_digamma",
    "aten::special_entr",
    "aten::special_erfinv",
    "aten::special_exp2",
    "aten::special_expit",
    "aten::special_expm1",
    "aten::special_gammainc",
    "aten::special_gammaincc",
    "aten::special_gammaln",
    "aten::special_hermite_polynomial_h",
    "aten::special_hermite_polynomial_he",
    "aten::special_i0",
    "aten::special_i0e",
    "aten::special_i1",
    "aten::special_i1e",
    "aten::special_laguerre_polynomial_l",
    "aten::special_legendre_polynomial_p",
    "aten::special_log1p",
    "aten::special_log_ndtr",
    "aten::special_logit",
    "aten::special_logsumexp",
    "aten::special_modified_bessel_i0",
    "aten::special_modified_bessel_i1",
    "aten::special_modified_bessel_k0",
    "aten::special_modified_bessel_k1",
    "aten::special_multigammaln",
    "aten::special_ndtr",
    "aten::special_ndtri",
    "aten::special_polygamma",
    "aten::special_psi",
    "aten::special_round",
    "aten::special_scaled_modified_bessel_k0",
    "aten::special_scaled_modified_bessel_k1",
    "aten::special_shifted_chebyshev_polynomial_t",
    "aten::special_shifted_chebyshev_polynomial_u",
    "aten::special_shifted_chebyshev_polynomial_v",
    "aten::special_shifted_chebyshev_polynomial_w",
    "aten::special_sinc",
    "aten::special_spherical_bessel_j0",
    "aten::special_xlog1py",
    "aten::special_zeta",
];

pub(crate) fn register(registry: &mut LoweringRegistry) -> LowerResult<()> {
    registry.register_lowering(&["aten::erf", "aten::special_erf"], ERF)?;
    registry.register_lowering(&["aten::erfc", "aten::special_erfc"], ERFC)?;
    registry.register_lowering(&["aten::special_erfcx"], ERFCX)?;
    registry.register_lowering(&["aten::xlogy", "aten::special_xlogy"], XLOGY)?;
    registry.register_lowering(&["aten::log_softmax", "aten::special_log_softmax"], LOG_SOFTMAX)?;
    registry.acknowledge_gap(
        PENDING_SPECIAL,
        "special function without a primitive decomposition yet",
    )?;
    Ok(())
}

/// `erf(self)`.
pub fn lower_erf(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "self")?;
    Ok(vec![builder.erf(x)?])
}

/// `1 - erf(self)`.
pub fn lower_erfc(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let erf = single(lower_erf(builder, call)?)?;
    let one = builder.scalar_like(erf, 1.0)?;
    Ok(vec![builder.sub(one, erf)?])
}

/// Scaled complementary error function, `erfcx(x) = exp(x²) · erfc(x)`.
///
/// Inherits the cancellation of `1 - erf(x)`: for large positive inputs the
/// erfc factor underflows to zero long before the exact result does.
pub fn lower_erfcx(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let erfc = single(lower_erfc(builder, call)?)?;
    let x = call.tensor(0, "self")?;
    let square = builder.mul(x, x)?;
    let scale = builder.exp(square)?;
    Ok(vec![builder.mul(scale, erfc)?])
}

/// `self * log(other)` with the decision table, first match wins:
/// - `other` is NaN: NaN;
/// - `self == 0` (either sign): `self`, which keeps the sign of the zero;
/// - otherwise `self * log(other)`.
///
/// `other` may be a tensor or a number; operands broadcast against each other.
pub fn lower_xlogy(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let a = call.tensor(0, "self")?;
    let b = tensor_or_scalar(builder, call, 1, "other", a)?;
    let (a, b) = builder.broadcast_pair(a, b)?;

    let b_is_nan = builder.is_nan(b)?;
    let zero = builder.scalar_like(a, 0.0)?;
    let a_is_zero = builder.compare(ComparisonOp::Equal, a, zero)?;
    let log_b = builder.log(b)?;
    let product = builder.mul(a, log_b)?;
    let finite_branch = builder.select(a_is_zero, a, product)?;
    Ok(vec![builder.select(b_is_nan, b, finite_branch)?])
}

/// `log_softmax(self, dim, dtype=None)`; rank-0 inputs go through a rank-1 view.
pub fn lower_log_softmax(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "self")?;
    let dim = call.int(1, "dim")?;
    let dtype = match call.opt_dtype(2, "dtype")? {
        Some(dtype) => dtype,
        None => builder.dtype(x)?,
    };
    if !dtype.is_float() {
        return Err(call.invalid(format!("log_softmax needs a floating dtype, got {dtype}")));
    }
    let out = with_scalar_rank(builder, call, x, dim, |builder, value, axis| {
        let value = builder.cast(value, dtype)?;
        Ok(builder.log_softmax(value, axis)?)
    })?;
    Ok(vec![out])
}

fn single(outputs: Vec<ValueId>) -> LowerResult<ValueId> {
    outputs
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("composed lowering produced no outputs").into())
}
