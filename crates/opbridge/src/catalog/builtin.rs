//! The built-in descriptor catalogue.
//!
//! The first group mirrors the extra operator database of the reference test
//! suite (names, dtype groups and capability flags); the rest cover the special
//! functions and the function-library composites.

use crate::ir::DType;
use crate::lowering::{IdentityParseError, OperatorIdentity};
use crate::samples::{self, SampleGenerator};

use super::descriptor::{DTypeSet, OperatorDescriptor};
use super::error::CatalogError;
use super::table::DescriptorTable;

fn descriptor(
    name: &str,
    identity: &str,
    dtypes: DTypeSet,
    generator: SampleGenerator,
) -> Result<OperatorDescriptor, IdentityParseError> {
    Ok(OperatorDescriptor::new(
        name,
        OperatorIdentity::parse(identity)?,
        dtypes,
        generator,
    ))
}

/// Descriptors of the reference suite's extra operator database.
fn reference_suite() -> Result<Vec<OperatorDescriptor>, IdentityParseError> {
    use DType::{Bf16, F16, Si64, I1};

    let mut descriptors = vec![
        descriptor(
            "ops.aten._local_scalar_dense",
            "aten::_local_scalar_dense",
            DTypeSet::all_types(),
            samples::sample_inputs_local_scalar_dense,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten.col2im",
            "aten::col2im",
            DTypeSet::floating_and_complex_types_and(&[F16, Bf16]),
            samples::sample_inputs_col2im,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten.embedding_bag",
            "aten::embedding_bag",
            DTypeSet::floating_types_and_half(),
            samples::sample_inputs_embedding_bag,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten.embedding_bag.padding_idx",
            "aten::embedding_bag.padding_idx",
            DTypeSet::floating_types_and_half(),
            samples::sample_inputs_embedding_bag_padding_idx,
        )?
        .supports_out(false),
        descriptor(
            "nn.functional.conv3d",
            "aten::conv3d",
            DTypeSet::floating_and_complex_types_and(&[Si64, Bf16]),
            samples::sample_inputs_conv3d,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten.convolution",
            "aten::convolution",
            DTypeSet::floating_and_complex_types_and(&[Si64, Bf16]),
            samples::sample_inputs_convolution,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten.index.Tensor",
            "aten::index.Tensor",
            DTypeSet::all_types_and_complex_and(&[I1, F16, Bf16]),
            samples::sample_inputs_index,
        )?,
        descriptor(
            "ops.aten.layer_norm",
            "aten::layer_norm",
            DTypeSet::floating_and_complex_types_and(&[Si64, Bf16]),
            samples::sample_inputs_layer_norm,
        )?
        .supports_out(false),
    ];

    for (name, identity) in [
        ("ops.aten.max_pool1d", "aten::max_pool1d"),
        ("ops.aten.max_pool2d", "aten::max_pool2d"),
        ("ops.aten.max_pool3d", "aten::max_pool3d"),
    ] {
        descriptors.push(
            descriptor(
                name,
                identity,
                DTypeSet::floating_types_and(&[Bf16]),
                samples::sample_inputs_max_pool_empty_strides,
            )?
            .variant("empty_strides")
            .supports_out(false),
        );
    }

    descriptors.extend([
        descriptor(
            "ops.aten.native_dropout",
            "aten::native_dropout",
            DTypeSet::all_types_and_half(),
            samples::sample_inputs_native_dropout,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten.native_group_norm",
            "aten::native_group_norm",
            DTypeSet::floating_and_complex_types_and(&[F16, Bf16]),
            samples::sample_inputs_native_group_norm,
        )?
        .supports_out(false),
    ]);

    for (name, identity) in [
        (
            "nn.functional.max_pool1d_with_indices",
            "aten::max_pool1d_with_indices",
        ),
        (
            "nn.functional.max_pool2d_with_indices",
            "aten::max_pool2d_with_indices",
        ),
        (
            "nn.functional.max_pool3d_with_indices",
            "aten::max_pool3d_with_indices",
        ),
    ] {
        descriptors.push(
            descriptor(
                name,
                identity,
                DTypeSet::floating_types_and(&[Bf16]),
                samples::sample_inputs_max_pool_with_indices,
            )?
            .supports_out(false),
        );
    }

    descriptors.extend([
        descriptor(
            "ops.aten.stft",
            "aten::stft",
            DTypeSet::floating_and_complex_types_and(&[F16, Bf16]),
            samples::sample_inputs_stft,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten.tensor.bool",
            "aten::tensor.bool",
            DTypeSet::all_types_and(&[F16, Bf16]),
            samples::sample_inputs_tensor_bool,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten.tensor.float",
            "aten::tensor.float",
            DTypeSet::all_types_and(&[F16, Bf16]),
            samples::sample_inputs_tensor_float,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten.tensor.int",
            "aten::tensor.int",
            DTypeSet::all_types_and(&[F16, Bf16]),
            samples::sample_inputs_tensor_int,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten.bernoulli.p",
            "aten::bernoulli.p",
            DTypeSet::all_types(),
            samples::sample_inputs_bernoulli_p,
        )?
        .supports_out(false)
        .deterministic(false),
        descriptor(
            "ops.aten.bernoulli.p_deterministic",
            "aten::bernoulli.p",
            DTypeSet::all_types(),
            samples::sample_inputs_bernoulli_p_deterministic,
        )?
        .supports_out(false),
        descriptor(
            "unfold_extra",
            "aten::unfold",
            DTypeSet::all_types(),
            samples::sample_inputs_unfold,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten.slice_scatter",
            "aten::slice_scatter",
            DTypeSet::all_types_and(&[Bf16, F16, I1]),
            samples::sample_inputs_slice_scatter,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten._softmax",
            "aten::_softmax",
            DTypeSet::floating_types_and_half(),
            samples::sample_inputs_softmax,
        )?
        .supports_out(false),
        descriptor(
            "ops.aten._scaled_dot_product_flash_attention",
            "aten::_scaled_dot_product_flash_attention",
            DTypeSet::floating_types_and(&[Bf16]),
            samples::sample_inputs_scaled_dot_product_flash_attention,
        )?
        .supports_out(false)
        .supports_forward_ad(false)
        .supports_fwgrad_bwgrad(true)
        .check_batched_forward_grad(false),
    ]);
    Ok(descriptors)
}

/// Special functions, under both their base and `special_` spellings.
fn special_functions() -> Result<Vec<OperatorDescriptor>, IdentityParseError> {
    use DType::{Bf16, F16};

    let half_floats = || DTypeSet::floating_types_and(&[F16, Bf16]);
    Ok(vec![
        descriptor("erf", "aten::erf", half_floats(), samples::sample_inputs_special_unary)?,
        descriptor(
            "special.erf",
            "aten::special_erf",
            half_floats(),
            samples::sample_inputs_special_unary,
        )?,
        descriptor("erfc", "aten::erfc", half_floats(), samples::sample_inputs_special_unary)?,
        descriptor(
            "special.erfc",
            "aten::special_erfc",
            half_floats(),
            samples::sample_inputs_special_unary,
        )?,
        descriptor(
            "special.erfcx",
            "aten::special_erfcx",
            DTypeSet::floating_types(),
            samples::sample_inputs_erfcx,
        )?
        .supports_out(false),
        descriptor("xlogy", "aten::xlogy", half_floats(), samples::sample_inputs_xlogy)?,
        descriptor(
            "special.xlogy",
            "aten::special_xlogy",
            half_floats(),
            samples::sample_inputs_xlogy,
        )?,
        descriptor(
            "log_softmax",
            "aten::log_softmax",
            half_floats(),
            samples::sample_inputs_log_softmax,
        )?
        .supports_out(false),
        descriptor(
            "special.log_softmax",
            "aten::special_log_softmax",
            half_floats(),
            samples::sample_inputs_log_softmax,
        )?
        .supports_out(false),
    ])
}

/// Function-library composites; they have no out= form and no gradient checks.
fn composites() -> Result<Vec<OperatorDescriptor>, IdentityParseError> {
    let reductions = [
        ("onnxfn.ReduceSumSquare", "onnxfn::ReduceSumSquare"),
        ("onnxfn.ReduceL1", "onnxfn::ReduceL1"),
        ("onnxfn.ReduceL2", "onnxfn::ReduceL2"),
        ("onnxfn.ReduceLogSum", "onnxfn::ReduceLogSum"),
        ("onnxfn.ReduceLogSumExp", "onnxfn::ReduceLogSumExp"),
    ];
    let others: [(&str, &str, SampleGenerator); 3] = [
        (
            "onnxfn.Hardmax",
            "onnxfn::Hardmax",
            samples::sample_inputs_hardmax,
        ),
        (
            "onnxfn.DepthToSpace",
            "onnxfn::DepthToSpace",
            samples::sample_inputs_depth_to_space,
        ),
        (
            "onnxfn.SpaceToDepth",
            "onnxfn::SpaceToDepth",
            samples::sample_inputs_space_to_depth,
        ),
    ];
    let generators = reductions
        .into_iter()
        .map(|(name, identity)| {
            (
                name,
                identity,
                samples::sample_inputs_reduce_composite as SampleGenerator,
            )
        })
        .chain(others);

    generators
        .map(|(name, identity, generator)| -> Result<_, IdentityParseError> {
            Ok(descriptor(
                name,
                identity,
                DTypeSet::floating_types_and_half(),
                generator,
            )?
            .supports_out(false)
            .supports_autograd(false))
        })
        .collect()
}

/// Builds the full descriptor table, validating every entry on insertion.
pub fn builtin_descriptors() -> Result<DescriptorTable, CatalogError> {
    let mut table = DescriptorTable::new();
    let groups = [reference_suite(), special_functions(), composites()];
    for group in groups {
        for descriptor in group? {
            table.push(descriptor)?;
        }
    }
    Ok(table)
}
