use approx::assert_relative_eq;
use opbridge::ir::{
    ComparisonOp, DType, ElementwiseUnaryOp, Function, Instruction, Operand, Operation,
    TensorSpec, ValueId,
};
use opbridge::samples::HostTensor;
use opbridge::GraphBuilder;
use opbridge_conformance::interpreter::evaluate;
use opbridge_conformance::InterpretError;

fn tensor(dtype: DType, dims: &[usize], values: &[f64]) -> HostTensor {
    HostTensor::from_f64(dtype, dims, values.to_vec()).unwrap()
}

#[test]
fn erf_matches_libm_after_rounding() {
    let mut builder = GraphBuilder::new();
    let x = builder.parameter(TensorSpec::new(DType::F32, vec![3]));
    let y = builder.erf(x).unwrap();
    let function = builder.finish("erf", vec![y]).unwrap();

    let inputs = [tensor(DType::F32, &[3], &[-0.5, 0.0, 1.25])];
    let out = evaluate(&function, &inputs, 0).unwrap();
    assert_eq!(out.len(), 1);
    for (value, x) in out[0].to_f64_vec().into_iter().zip([-0.5f64, 0.0, 1.25]) {
        assert_relative_eq!(value, libm::erf(x), epsilon = 1e-7);
        assert_eq!(value, f64::from(value as f32));
    }
}

#[test]
fn every_instruction_rounds_to_its_dtype() {
    let mut builder = GraphBuilder::new();
    let x = builder.parameter(TensorSpec::new(DType::F16, vec![1]));
    let tiny = builder.scalar_like(x, 1e-4).unwrap();
    let sum = builder.add(x, tiny).unwrap();
    let back = builder.sub(sum, x).unwrap();
    let function = builder.finish("rounding", vec![sum, back]).unwrap();

    let out = evaluate(&function, &[tensor(DType::F16, &[1], &[1.0])], 0).unwrap();
    assert_eq!(out[0].to_f64_vec(), vec![1.0]);
    assert_eq!(out[1].to_f64_vec(), vec![0.0]);
}

#[test]
fn layout_primitives_move_values() {
    let mut builder = GraphBuilder::new();
    let x = builder.parameter(TensorSpec::new(DType::F64, vec![2, 3]));
    let transposed = builder.transpose(x, &[1, 0]).unwrap();
    let sliced = builder.slice(transposed, &[1, 0], &[2, 2]).unwrap();
    let joined = builder.concat(&[sliced, sliced], 1).unwrap();
    let row = builder.slice(x, &[0, 0], &[1, 3]).unwrap();
    let spread = builder.broadcast_to(row, &[2, 3]).unwrap();
    let function = builder
        .finish("layout", vec![transposed, sliced, joined, spread])
        .unwrap();

    let input = tensor(DType::F64, &[2, 3], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    let out = evaluate(&function, &[input], 0).unwrap();
    assert_eq!(out[0].dims(), &[3, 2]);
    assert_eq!(out[0].to_f64_vec(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    assert_eq!(out[1].to_f64_vec(), vec![1.0, 4.0, 2.0, 5.0]);
    assert_eq!(out[2].dims(), &[2, 4]);
    assert_eq!(
        out[2].to_f64_vec(),
        vec![1.0, 4.0, 1.0, 4.0, 2.0, 5.0, 2.0, 5.0]
    );
    assert_eq!(out[3].to_f64_vec(), vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
}

#[test]
fn reductions_keep_or_drop_axes_and_propagate_nan() {
    let mut builder = GraphBuilder::new();
    let x = builder.parameter(TensorSpec::new(DType::F32, vec![2, 3]));
    let kept = builder.reduce_sum(x, &[1], true).unwrap();
    let dropped = builder.reduce_sum(x, &[0], false).unwrap();
    let max = builder
        .reduce(opbridge::ir::ReduceKind::Max, x, &[1], false)
        .unwrap();
    let function = builder.finish("reduce", vec![kept, dropped, max]).unwrap();

    let input = tensor(DType::F32, &[2, 3], &[1.0, 2.0, 3.0, 4.0, f64::NAN, 6.0]);
    let out = evaluate(&function, &[input], 0).unwrap();
    assert_eq!(out[0].dims(), &[2, 1]);
    let sums = out[0].to_f64_vec();
    assert_eq!(sums[0], 6.0);
    assert!(sums[1].is_nan());
    assert_eq!(out[1].dims(), &[3]);
    assert_eq!(out[1].to_f64_vec()[0], 5.0);
    let max = out[2].to_f64_vec();
    assert_eq!(max[0], 3.0);
    assert!(max[1].is_nan());
}

#[test]
fn argmax_takes_the_first_maximum_and_one_hot_expands_it() {
    let mut builder = GraphBuilder::new();
    let x = builder.parameter(TensorSpec::new(DType::F32, vec![2, 3]));
    let indices = builder.argmax(x, 1, false).unwrap();
    let hot = builder.one_hot(indices, 3, 1, DType::F32, (0.0, 1.0)).unwrap();
    let function = builder.finish("hardmax", vec![indices, hot]).unwrap();

    let input = tensor(DType::F32, &[2, 3], &[1.0, 3.0, 3.0, 2.0, 2.0, 1.0]);
    let out = evaluate(&function, &[input], 0).unwrap();
    assert_eq!(out[0].dtype(), DType::Si64);
    assert_eq!(out[0].to_i64_vec(), vec![1, 0]);
    assert_eq!(
        out[1].to_f64_vec(),
        vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0]
    );
}

#[test]
fn select_and_compare_follow_the_predicate() {
    let mut builder = GraphBuilder::new();
    let a = builder.parameter(TensorSpec::new(DType::F64, vec![4]));
    let b = builder.parameter(TensorSpec::new(DType::F64, vec![4]));
    let less = builder.compare(ComparisonOp::Less, a, b).unwrap();
    let nan = builder.is_nan(a).unwrap();
    let smaller = builder.select(less, a, b).unwrap();
    let function = builder.finish("min", vec![less, nan, smaller]).unwrap();

    let inputs = [
        tensor(DType::F64, &[4], &[1.0, 5.0, f64::NAN, -2.0]),
        tensor(DType::F64, &[4], &[2.0, 4.0, 0.0, -2.0]),
    ];
    let out = evaluate(&function, &inputs, 0).unwrap();
    assert_eq!(out[0].dtype(), DType::I1);
    assert_eq!(out[0].to_i64_vec(), vec![1, 0, 0, 0]);
    assert_eq!(out[1].to_i64_vec(), vec![0, 0, 1, 0]);
    assert_eq!(out[2].to_f64_vec(), vec![1.0, 4.0, 0.0, -2.0]);
}

#[test]
fn softmax_rows_sum_to_one() {
    let mut builder = GraphBuilder::new();
    let x = builder.parameter(TensorSpec::new(DType::F64, vec![2, 4]));
    let soft = builder.softmax(x, 1).unwrap();
    let log = builder.log_softmax(x, 1).unwrap();
    let function = builder.finish("softmax", vec![soft, log]).unwrap();

    let input = tensor(
        DType::F64,
        &[2, 4],
        &[1000.0, 1001.0, 1002.0, 1003.0, -1.0, 0.0, 1.0, 2.0],
    );
    let out = evaluate(&function, &[input], 0).unwrap();
    let soft = out[0].to_f64_vec();
    let log = out[1].to_f64_vec();
    for row in soft.chunks(4) {
        assert_relative_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }
    for (s, l) in soft.iter().zip(&log) {
        assert_relative_eq!(s.ln(), *l, epsilon = 1e-12);
    }
    assert_relative_eq!(soft[0], soft[4], epsilon = 1e-12);
}

#[test]
fn uniform_draws_replay_per_seed() {
    let mut builder = GraphBuilder::new();
    let draws = builder.rng_uniform(&[64], DType::F16).unwrap();
    let function = builder.finish("rng", vec![draws]).unwrap();

    let first = evaluate(&function, &[], 11).unwrap();
    let again = evaluate(&function, &[], 11).unwrap();
    let other = evaluate(&function, &[], 12).unwrap();
    assert_eq!(first, again);
    assert_ne!(first, other);
    assert!(first[0]
        .to_f64_vec()
        .iter()
        .all(|v| (0.0..1.0).contains(v)));
}

#[test]
fn results_may_name_parameters_directly() {
    let mut builder = GraphBuilder::new();
    let x = builder.parameter(TensorSpec::new(DType::Si32, vec![2]));
    let function = builder.finish("identity", vec![x]).unwrap();
    let input = tensor(DType::Si32, &[2], &[7.0, -3.0]);
    assert_eq!(evaluate(&function, &[input.clone()], 0).unwrap(), vec![input]);
}

#[test]
fn inputs_must_match_the_signature() {
    let mut builder = GraphBuilder::new();
    let x = builder.parameter(TensorSpec::new(DType::F32, vec![2]));
    let y = builder.neg(x).unwrap();
    let function = builder.finish("neg", vec![y]).unwrap();

    assert!(matches!(
        evaluate(&function, &[], 0),
        Err(InterpretError::Arity {
            expected: 1,
            actual: 0,
            ..
        })
    ));
    let wrong = tensor(DType::F64, &[2], &[1.0, 2.0]);
    assert!(matches!(
        evaluate(&function, &[wrong], 0),
        Err(InterpretError::InputMismatch { index: 0, .. })
    ));
}

#[test]
fn complex_payloads_are_rejected() {
    let mut builder = GraphBuilder::new();
    let x = builder.parameter(TensorSpec::new(DType::Cf32, vec![2]));
    let function = builder.finish("complex", vec![x]).unwrap();
    let input = tensor(DType::Cf32, &[2], &[1.0, 2.0]);
    assert!(matches!(
        evaluate(&function, &[input], 0),
        Err(InterpretError::UnsupportedDType {
            dtype: DType::Cf32,
            ..
        })
    ));
}

#[test]
fn errors_name_the_failing_instruction() {
    let spec = TensorSpec::new(DType::F32, vec![1]);
    let function = Function {
        name: "broken".to_string(),
        parameter_ids: vec![ValueId(0)],
        parameters: vec![spec.clone()],
        body: vec![Instruction {
            id: ValueId(1),
            op: Operation::ElementwiseUnary(ElementwiseUnaryOp::Neg),
            operands: vec![Operand::Value(ValueId(7))],
            output: spec.clone(),
        }],
        result_ids: vec![ValueId(1)],
        results: vec![spec],
    };
    let err = evaluate(&function, &[tensor(DType::F32, &[1], &[1.0])], 0).unwrap_err();
    match &err {
        InterpretError::Instruction {
            function,
            index,
            mnemonic,
            id,
            ..
        } => {
            assert_eq!(function, "broken");
            assert_eq!(*index, 0);
            assert_eq!(*mnemonic, "neg");
            assert_eq!(*id, ValueId(1));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("%7"), "{err}");
}
