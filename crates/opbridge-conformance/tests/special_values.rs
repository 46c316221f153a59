//! Lowered special functions evaluated on fixed inputs with known results.

use approx::assert_relative_eq;
use opbridge::samples::{HostTensor, SampleInput};
use opbridge::{catalog, DType, LowerError, OperatorIdentity};
use opbridge_conformance::interpreter::evaluate;

fn tensor(dtype: DType, dims: &[usize], values: &[f64]) -> HostTensor {
    HostTensor::from_f64(dtype, dims, values.to_vec()).unwrap()
}

fn run(identity: &str, sample: &SampleInput) -> Vec<HostTensor> {
    let identity = OperatorIdentity::parse(identity).unwrap();
    let function = catalog()
        .unwrap()
        .registry
        .lower_sample(&identity, sample)
        .unwrap();
    let inputs = sample.tensors().into_iter().cloned().collect::<Vec<_>>();
    evaluate(&function, &inputs, 0).unwrap()
}

#[test]
fn xlogy_follows_the_nan_then_zero_table() {
    let e = std::f64::consts::E;
    let sample = SampleInput::new(tensor(DType::F32, &[5], &[0.0, 0.0, 2.0, 3.0, -0.0]), DType::F32)
        .arg(tensor(DType::F32, &[5], &[f64::NAN, 5.0, 1.0, e, 2.0]));
    let out = run("aten::xlogy", &sample).remove(0).to_f64_vec();

    assert!(out[0].is_nan());
    assert_eq!(out[1], 0.0);
    assert!(out[1].is_sign_positive());
    assert_eq!(out[2], 0.0);
    assert_relative_eq!(out[3], 3.0, epsilon = 1e-6);
    assert_eq!(out[4], 0.0);
    assert!(out[4].is_sign_negative());
}

#[test]
fn erfc_is_one_minus_erf_in_single_precision() {
    let xs = [-3.0, -1.0, -0.5, 0.0, 0.25, 1.0, 2.5, 4.0];
    let sample = SampleInput::new(tensor(DType::F32, &[xs.len()], &xs), DType::F32);
    let erf = run("aten::erf", &sample).remove(0).to_f64_vec();
    let erfc = run("aten::erfc", &sample).remove(0).to_f64_vec();

    for ((x, erf), erfc) in xs.iter().zip(erf).zip(erfc) {
        let expected = 1.0f32 - erf as f32;
        assert_eq!((erfc as f32).to_bits(), expected.to_bits(), "erfc({x})");
    }
}

#[test]
fn erfcx_is_the_scaled_complementary_error_function() {
    let sample = SampleInput::new(tensor(DType::F64, &[2], &[1.0, 0.0]), DType::F64);
    let out = run("aten::special_erfcx", &sample).remove(0).to_f64_vec();
    assert_relative_eq!(out[0], 0.427_583_576, epsilon = 1e-6);
    assert_eq!(out[1], 1.0);
}

#[test]
fn scalar_log_softmax_accepts_dim_zero_and_minus_one() {
    for dim in [0i64, -1] {
        let sample = SampleInput::new(tensor(DType::F32, &[], &[1.5]), DType::F32).arg(dim);
        let out = run("aten::log_softmax", &sample).remove(0);
        assert!(out.dims().is_empty(), "dim {dim}");
        assert_eq!(out.to_f64_vec(), vec![0.0], "dim {dim}");
    }
}

#[test]
fn scalar_log_softmax_rejects_dim_one() {
    let sample = SampleInput::new(tensor(DType::F32, &[], &[1.5]), DType::F32).arg(1i64);
    let identity = OperatorIdentity::parse("aten::log_softmax").unwrap();
    let err = catalog()
        .unwrap()
        .registry
        .lower_sample(&identity, &sample)
        .unwrap_err();
    assert!(
        matches!(err, LowerError::InvalidArgument { .. }),
        "{err:?}"
    );
}
