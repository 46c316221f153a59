use opbridge::graph::GraphBuilder;
use opbridge::ir::{
    ComparisonOp, CompareSpec, DType, ElementwiseBinaryOp, ElementwiseUnaryOp, Function, Operand,
    Operation, TensorSpec,
};
use opbridge::lowering::{CallArg, LowerError, LowerResult, OpCall, OperatorIdentity};
use opbridge::ops;

fn lower(
    name: &str,
    inputs: &[TensorSpec],
    extra: impl FnOnce(OpCall) -> OpCall,
) -> LowerResult<Function> {
    let registry = ops::builtin_registry()?;
    let mut builder = GraphBuilder::new();
    let mut call = OpCall::new(OperatorIdentity::parse(name)?);
    for spec in inputs {
        call = call.arg(CallArg::Tensor(builder.parameter(spec.clone())));
    }
    registry.lower_call(builder, &extra(call))
}

fn f32(dims: &[usize]) -> TensorSpec {
    TensorSpec::new(DType::F32, dims.to_vec())
}

fn mnemonics(function: &Function) -> Vec<&'static str> {
    function.body.iter().map(|inst| inst.op.mnemonic()).collect()
}

fn producer<'a>(function: &'a Function, operand: &Operand) -> &'a Operation {
    let Operand::Value(id) = operand else {
        panic!("expected a value operand");
    };
    &function
        .body
        .iter()
        .find(|inst| inst.id == *id)
        .expect("operand is produced in the body")
        .op
}

#[test]
fn xlogy_checks_nan_before_zero() {
    let function = lower("aten::xlogy", &[f32(&[3]), f32(&[3])], |call| call).unwrap();
    let outer = function.body.last().unwrap();
    assert_eq!(outer.op, Operation::Select);
    assert_eq!(producer(&function, &outer.operands[0]), &Operation::IsNan);

    let inner = producer(&function, &outer.operands[2]);
    assert_eq!(inner, &Operation::Select);
    let inner_inst = function
        .body
        .iter()
        .find(|inst| Operand::Value(inst.id) == outer.operands[2])
        .unwrap();
    assert_eq!(
        producer(&function, &inner_inst.operands[0]),
        &Operation::Compare(CompareSpec {
            op: ComparisonOp::Equal
        })
    );
}

#[test]
fn xlogy_accepts_a_scalar_other_and_broadcasts() {
    let function = lower("aten::special_xlogy", &[f32(&[2, 3])], |call| {
        call.arg(CallArg::Float(2.5))
    })
    .unwrap();
    assert_eq!(function.results, vec![f32(&[2, 3])]);

    let broadcast = lower("aten::xlogy", &[f32(&[2, 1]), f32(&[3])], |call| call).unwrap();
    assert_eq!(broadcast.results, vec![f32(&[2, 3])]);
}

#[test]
fn erfc_is_one_minus_the_erf_lowering() {
    let function = lower("aten::erfc", &[f32(&[4])], |call| call).unwrap();
    let erf_count = function.count_ops(|op| {
        matches!(op, Operation::ElementwiseUnary(ElementwiseUnaryOp::Erf))
    });
    assert_eq!(erf_count, 1);
    let last = function.body.last().unwrap();
    assert_eq!(
        last.op,
        Operation::ElementwiseBinary(ElementwiseBinaryOp::Sub)
    );
    let alias = lower("aten::special_erfc", &[f32(&[4])], |call| call).unwrap();
    assert_eq!(alias.body, function.body);
}

#[test]
fn erfcx_reuses_erfc() {
    let function = lower("aten::special_erfcx", &[f32(&[])], |call| call).unwrap();
    assert_eq!(
        function.count_ops(|op| matches!(op, Operation::ElementwiseUnary(ElementwiseUnaryOp::Erf))),
        1
    );
    assert_eq!(
        function.count_ops(|op| matches!(op, Operation::ElementwiseUnary(ElementwiseUnaryOp::Exp))),
        1
    );
    assert_eq!(function.results, vec![f32(&[])]);
}

#[test]
fn log_softmax_on_a_scalar_goes_through_rank_one() {
    for dim in [0, -1] {
        let function = lower("aten::log_softmax", &[f32(&[])], |call| {
            call.arg(CallArg::Int(dim))
        })
        .unwrap();
        assert_eq!(mnemonics(&function), ["unsqueeze", "log_softmax", "squeeze"]);
        assert_eq!(function.results, vec![f32(&[])]);
    }
}

#[test]
fn log_softmax_rejects_out_of_range_dims_on_scalars() {
    let err = lower("aten::log_softmax", &[f32(&[])], |call| call.arg(CallArg::Int(1)))
        .unwrap_err();
    assert!(matches!(err, LowerError::InvalidArgument { .. }), "{err}");
}

#[test]
fn log_softmax_casts_before_reducing() {
    let function = lower(
        "aten::special_log_softmax",
        &[TensorSpec::new(DType::F16, vec![5, 5])],
        |call| call.arg(CallArg::Int(1)).kwarg("dtype", CallArg::DType(DType::F32)),
    )
    .unwrap();
    assert_eq!(mnemonics(&function), ["cast", "log_softmax"]);
    assert_eq!(function.results, vec![f32(&[5, 5])]);
}

#[test]
fn softmax_half_to_float_widens_the_result() {
    let function = lower(
        "aten::_softmax",
        &[TensorSpec::new(DType::F16, vec![5, 0, 0])],
        |call| call.arg(CallArg::Int(-1)).arg(CallArg::Bool(true)),
    )
    .unwrap();
    assert_eq!(function.results, vec![f32(&[5, 0, 0])]);
}

#[test]
fn layer_norm_normalises_trailing_axes() {
    let function = lower("aten::layer_norm", &[f32(&[2, 3, 4])], |call| {
        call.arg(CallArg::Ints(vec![3, 4]))
    })
    .unwrap();
    assert_eq!(function.results, vec![f32(&[2, 3, 4])]);
    let reductions = function.body.iter().filter_map(|inst| match &inst.op {
        Operation::Reduce(spec) => Some(spec.axes.clone()),
        _ => None,
    });
    assert!(reductions.into_iter().all(|axes| axes == vec![1, 2]));
}

#[test]
fn layer_norm_rejects_mismatched_normalized_shape() {
    let err = lower("aten::layer_norm", &[f32(&[2, 3])], |call| {
        call.arg(CallArg::Ints(vec![4]))
    })
    .unwrap_err();
    assert!(matches!(err, LowerError::InvalidArgument { .. }), "{err}");

    let int_input = lower(
        "aten::layer_norm",
        &[TensorSpec::new(DType::Si64, vec![2, 3])],
        |call| call.arg(CallArg::Ints(vec![3])),
    )
    .unwrap_err();
    assert!(matches!(int_input, LowerError::InvalidArgument { .. }));
}

#[test]
fn group_norm_returns_statistics_per_group() {
    let function = lower(
        "aten::native_group_norm",
        &[f32(&[2, 6, 3]), f32(&[6]), f32(&[6])],
        |call| {
            call.arg(CallArg::Int(2))
                .arg(CallArg::Int(6))
                .arg(CallArg::Int(3))
                .kwarg("group", CallArg::Int(3))
                .kwarg("eps", CallArg::Float(1e-5))
        },
    )
    .unwrap();
    assert_eq!(
        function.results,
        vec![f32(&[2, 6, 3]), f32(&[2, 3]), f32(&[2, 3])]
    );
}

#[test]
fn inference_dropout_is_the_identity_with_a_full_mask() {
    let function = lower("aten::native_dropout", &[f32(&[5, 5])], |call| {
        call.kwarg("p", CallArg::Float(0.5))
            .kwarg("train", CallArg::Bool(false))
    })
    .unwrap();
    assert_eq!(function.result_ids[0], function.parameter_ids[0]);
    assert_eq!(function.results[1], TensorSpec::new(DType::I1, vec![5, 5]));
    assert_eq!(function.count_ops(|op| matches!(op, Operation::RngUniform(_))), 0);
}

#[test]
fn training_dropout_draws_a_mask() {
    let function = lower("aten::native_dropout", &[f32(&[3])], |call| {
        call.arg(CallArg::Float(0.25)).arg(CallArg::Bool(true))
    })
    .unwrap();
    assert_eq!(function.count_ops(|op| matches!(op, Operation::RngUniform(_))), 1);
    assert_eq!(function.results[1].dtype, DType::I1);
}

#[test]
fn bernoulli_keeps_the_input_dtype() {
    let function = lower(
        "aten::bernoulli.p",
        &[TensorSpec::new(DType::Si64, vec![3, 2])],
        |call| call.arg(CallArg::Int(1)),
    )
    .unwrap();
    assert_eq!(function.results, vec![TensorSpec::new(DType::Si64, vec![3, 2])]);
}

#[test]
fn local_scalar_dense_reads_the_first_element() {
    let function = lower("aten::_local_scalar_dense", &[f32(&[2, 2, 2])], |call| call).unwrap();
    assert_eq!(mnemonics(&function), ["reshape", "slice", "reshape"]);
    assert_eq!(function.results, vec![f32(&[])]);

    let err = lower("aten::_local_scalar_dense", &[f32(&[0, 3])], |call| call).unwrap_err();
    assert!(matches!(err, LowerError::InvalidArgument { .. }));
}

#[test]
fn scalar_tensors_honour_the_requested_dtype() {
    let registry = ops::builtin_registry().unwrap();
    let call = OpCall::new(OperatorIdentity::aten("tensor.int"))
        .arg(CallArg::Int(-5))
        .kwarg("dtype", CallArg::DType(DType::F16));
    let function = registry.lower_call(GraphBuilder::new(), &call).unwrap();
    assert_eq!(function.results, vec![TensorSpec::new(DType::F16, vec![])]);

    let call = OpCall::new(OperatorIdentity::aten("tensor.bool")).arg(CallArg::Bool(true));
    let function = registry.lower_call(GraphBuilder::new(), &call).unwrap();
    assert_eq!(function.results, vec![TensorSpec::new(DType::I1, vec![])]);
}

#[test]
fn unfold_appends_the_window_axis() {
    let args = |call: OpCall| {
        call.arg(CallArg::Int(1))
            .arg(CallArg::Int(2))
            .arg(CallArg::Int(2))
    };
    let single = lower("aten::unfold", &[f32(&[2, 3, 4])], args).unwrap();
    assert_eq!(single.results, vec![f32(&[2, 1, 4, 2])]);

    let double = lower("aten::unfold", &[f32(&[2, 5, 4])], args).unwrap();
    assert_eq!(double.results, vec![f32(&[2, 2, 4, 2])]);

    let empty = lower("aten::unfold", &[f32(&[0, 3, 4])], args).unwrap();
    assert_eq!(empty.results, vec![f32(&[0, 1, 4, 2])]);
}

#[test]
fn slice_scatter_keeps_the_input_shape() {
    let function = lower(
        "aten::slice_scatter",
        &[f32(&[20, 20]), f32(&[20, 10])],
        |call| {
            call.arg(CallArg::Int(-1))
                .arg(CallArg::Int(0))
                .arg(CallArg::Int(20))
                .arg(CallArg::Int(2))
        },
    )
    .unwrap();
    assert_eq!(function.results, vec![f32(&[20, 20])]);

    let mismatch = lower(
        "aten::slice_scatter",
        &[f32(&[20, 20]), f32(&[20, 9])],
        |call| call.arg(CallArg::Int(1)).arg(CallArg::Int(0)).arg(CallArg::Int(20)).arg(CallArg::Int(2)),
    )
    .unwrap_err();
    assert!(matches!(mismatch, LowerError::InvalidArgument { .. }));
}

#[test]
fn slice_scatter_clamps_the_end() {
    let function = lower(
        "aten::slice_scatter",
        &[f32(&[8, 4]), f32(&[3, 4])],
        |call| {
            call.arg(CallArg::Int(0))
                .arg(CallArg::Int(5))
                .arg(CallArg::Int(100))
        },
    )
    .unwrap();
    assert_eq!(function.results, vec![f32(&[8, 4])]);
}

#[test]
fn onnx_reductions_honour_axes_and_keepdims() {
    let kept = lower("onnxfn::ReduceL2", &[f32(&[2, 3, 4])], |call| {
        call.kwarg("axes", CallArg::Ints(vec![0, -1]))
            .kwarg("keepdims", CallArg::Int(1))
    })
    .unwrap();
    assert_eq!(kept.results, vec![f32(&[1, 3, 1])]);

    let dropped = lower("onnxfn::ReduceLogSumExp", &[f32(&[2, 3, 4])], |call| {
        call.kwarg("keepdims", CallArg::Int(0))
    })
    .unwrap();
    assert_eq!(dropped.results, vec![f32(&[])]);
}

#[test]
fn hardmax_is_a_one_hot_of_the_argmax() {
    let function = lower("onnxfn::Hardmax", &[f32(&[3, 4])], |call| {
        call.kwarg("axis", CallArg::Int(0))
    })
    .unwrap();
    assert_eq!(mnemonics(&function), ["argmax", "one_hot"]);
    assert_eq!(function.results, vec![f32(&[3, 4])]);
}

#[test]
fn depth_and_space_rearrangements_have_the_expected_shapes() {
    for mode in ["DCR", "CRD"] {
        let function = lower("onnxfn::DepthToSpace", &[f32(&[1, 8, 2, 3])], |call| {
            call.kwarg("blocksize", CallArg::Int(2))
                .kwarg("mode", CallArg::Str(mode.to_string()))
        })
        .unwrap();
        assert_eq!(function.results, vec![f32(&[1, 2, 4, 6])]);
    }

    let function = lower("onnxfn::SpaceToDepth", &[f32(&[2, 1, 6, 6])], |call| {
        call.kwarg("blocksize", CallArg::Int(3))
    })
    .unwrap();
    assert_eq!(function.results, vec![f32(&[2, 9, 2, 2])]);

    let err = lower("onnxfn::DepthToSpace", &[f32(&[1, 3, 2, 2])], |call| {
        call.kwarg("blocksize", CallArg::Int(2))
    })
    .unwrap_err();
    assert!(matches!(err, LowerError::InvalidArgument { .. }));
}

#[test]
fn pending_operators_report_not_lowered() {
    let err = lower("aten::col2im", &[f32(&[1, 12, 12])], |call| call).unwrap_err();
    assert!(err.is_not_lowered(), "{err}");
    let err = lower("aten::special_zeta", &[f32(&[3])], |call| call).unwrap_err();
    assert!(err.is_not_lowered(), "{err}");
}
