//! Catalogued operators that are acknowledged gaps: known identities whose
//! lowering needs primitives outside the current instruction set.

use crate::lowering::{LowerResult, LoweringRegistry};

/// `(identities, reason)` pairs, one entry per missing capability.
pub const PENDING: &[(&[&str], &str)] = &[
    (&["aten::col2im"], "needs a scatter-add primitive"),
    (
        &["aten::embedding_bag", "aten::embedding_bag.padding_idx"],
        "needs gather and segmented reductions",
    ),
    (
        &["aten::conv3d", "aten::convolution"],
        "needs a convolution primitive",
    ),
    (&["aten::index.Tensor"], "needs a gather primitive"),
    (
        &[
            "aten::max_pool1d",
            "aten::max_pool2d",
            "aten::max_pool3d",
            "aten::max_pool1d_with_indices",
            "aten::max_pool2d_with_indices",
            "aten::max_pool3d_with_indices",
        ],
        "needs a windowed reduction primitive",
    ),
    (&["aten::stft"], "needs complex dtypes and an FFT primitive"),
    (
        &["aten::_scaled_dot_product_flash_attention"],
        "needs a batched matmul primitive",
    ),
];

pub(crate) fn register(registry: &mut LoweringRegistry) -> LowerResult<()> {
    for (names, reason) in PENDING {
        registry.acknowledge_gap(names, reason)?;
    }
    Ok(())
}
