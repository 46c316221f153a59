use opbridge::lowering::{LowerError, LowerResult, Lowering, LoweringRegistry, OpCall};
use opbridge::samples::sample_inputs_layer_norm;
use opbridge::{
    catalog, Catalog, DType, DTypeSet, DescriptorTable, GraphBuilder, OperatorDescriptor,
    OperatorIdentity, ValueId,
};
use opbridge_conformance::{
    init_tracing, run_catalog, run_descriptor, run_operator, OperatorReport, RunOptions,
    SampleOutcome,
};

fn setup() -> (&'static Catalog, RunOptions) {
    init_tracing();
    let catalog = catalog().unwrap();
    let options = RunOptions::from_env().unwrap().with_seed(0);
    (catalog, options)
}

fn failures(report: &OperatorReport) -> String {
    report
        .samples
        .iter()
        .filter(|sample| {
            matches!(
                sample.outcome,
                SampleOutcome::Mismatch(_) | SampleOutcome::Failed(_)
            )
        })
        .map(|sample| {
            format!(
                "{} [{}] #{} {}: {}",
                report.name, sample.dtype, sample.index, sample.summary, sample.outcome
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn assert_passes(name: &str, dtypes: &[DType]) -> OperatorReport {
    let (catalog, options) = setup();
    let report = run_operator(catalog, name, &options.with_dtypes(dtypes)).unwrap();
    let counts = report.counts();
    assert!(counts.is_clean(), "{}", failures(&report));
    assert!(
        report.outcomes().any(SampleOutcome::is_passed),
        "{name} ran no samples"
    );
    report
}

#[test]
fn special_functions_agree_with_reference() {
    for name in [
        "erf",
        "special.erf",
        "erfc",
        "special.erfc",
        "special.erfcx",
        "xlogy",
        "special.xlogy",
        "log_softmax",
        "special.log_softmax",
    ] {
        let report = assert_passes(name, &[DType::F32, DType::F64]);
        assert_eq!(report.counts().skipped, 0, "{name}");
    }
}

#[test]
fn half_precision_special_functions_stay_within_tolerance() {
    for name in ["erf", "erfc", "xlogy", "log_softmax"] {
        assert_passes(name, &[DType::F16, DType::Bf16]);
    }
}

#[test]
fn function_library_composites_agree_with_reference() {
    for name in [
        "onnxfn.ReduceSumSquare",
        "onnxfn.ReduceL1",
        "onnxfn.ReduceL2",
        "onnxfn.ReduceLogSum",
        "onnxfn.ReduceLogSumExp",
        "onnxfn.Hardmax",
        "onnxfn.DepthToSpace",
        "onnxfn.SpaceToDepth",
    ] {
        assert_passes(name, &[DType::F32, DType::F64]);
    }
}

#[test]
fn reference_suite_operators_agree_with_reference() {
    for name in [
        "ops.aten.layer_norm",
        "ops.aten.native_group_norm",
        "ops.aten.native_dropout",
        "ops.aten._softmax",
        "ops.aten._local_scalar_dense",
        "ops.aten.tensor.bool",
        "ops.aten.tensor.float",
        "ops.aten.tensor.int",
        "ops.aten.slice_scatter",
        "unfold_extra",
        "ops.aten.bernoulli.p_deterministic",
    ] {
        assert_passes(name, &[DType::F32]);
    }
}

#[test]
fn data_movement_is_exact_for_integers() {
    for name in ["ops.aten.slice_scatter", "unfold_extra", "ops.aten._local_scalar_dense"] {
        assert_passes(name, &[DType::Si32, DType::I1]);
    }
}

#[test]
fn random_operators_only_compare_shapes() {
    for seed in [0, 7] {
        let (catalog, options) = setup();
        let report = run_operator(
            catalog,
            "ops.aten.bernoulli.p",
            &options.with_seed(seed).with_dtypes(&[DType::F32, DType::F64]),
        )
        .unwrap();
        assert!(!report.deterministic);
        assert!(report.counts().is_clean(), "{}", failures(&report));
    }
}

#[test]
fn invalid_integer_normalisation_is_rejected_by_both_sides() {
    let (catalog, options) = setup();
    let report = run_operator(
        catalog,
        "ops.aten.layer_norm",
        &options.with_dtypes(&[DType::Si64]),
    )
    .unwrap();
    let counts = report.counts();
    assert!(counts.total() > 0);
    assert_eq!(counts.passed, counts.total(), "{}", failures(&report));
}

fn failing_layer_norm(_: &mut GraphBuilder, _: &OpCall) -> LowerResult<Vec<ValueId>> {
    Err(LowerError::Graph(anyhow::anyhow!("reduce rejected its operands")))
}

#[test]
fn invalid_samples_need_an_argument_rejection_from_the_lowering() {
    init_tracing();
    let mut registry = LoweringRegistry::new();
    registry
        .register_lowering(
            &["aten::layer_norm"],
            Lowering::new("failing_layer_norm", failing_layer_norm),
        )
        .unwrap();
    let mut descriptors = DescriptorTable::new();
    descriptors
        .push(OperatorDescriptor::new(
            "ops.aten.layer_norm",
            OperatorIdentity::parse("aten::layer_norm").unwrap(),
            DTypeSet::from_dtypes(&[DType::Si64]),
            sample_inputs_layer_norm,
        ))
        .unwrap();
    let catalog = Catalog {
        registry,
        descriptors,
    };

    let descriptor = catalog.descriptors.lookup("ops.aten.layer_norm").unwrap();
    let report = run_descriptor(&catalog, descriptor, &RunOptions::default().with_seed(0));
    let counts = report.counts();
    assert!(counts.total() > 0);
    assert_eq!(counts.failed, counts.total());
    assert!(report.outcomes().all(|outcome| match outcome {
        SampleOutcome::Failed(reason) => reason.contains("reduce rejected its operands"),
        _ => false,
    }));
}

#[test]
fn complex_samples_are_skipped() {
    let (catalog, options) = setup();
    let report = run_operator(
        catalog,
        "ops.aten.layer_norm",
        &options.with_dtypes(&[DType::Cf32]),
    )
    .unwrap();
    let counts = report.counts();
    assert!(counts.total() > 0);
    assert_eq!(counts.skipped, counts.total());
}

#[test]
fn pending_operators_skip_every_sample() {
    for name in ["ops.aten.col2im", "ops.aten.stft", "ops.aten.index.Tensor"] {
        let (catalog, options) = setup();
        let report = run_operator(catalog, name, &options).unwrap();
        let counts = report.counts();
        assert!(counts.total() > 0, "{name}");
        assert_eq!(counts.skipped, counts.total(), "{name}");
        assert!(report.outcomes().all(|outcome| match outcome {
            SampleOutcome::Skipped(reason) => !reason.is_empty(),
            _ => false,
        }));
    }
}

#[test]
fn unknown_operators_are_reported() {
    let (catalog, options) = setup();
    assert!(run_operator(catalog, "ops.aten.no_such_op", &options).is_err());
}

#[test]
fn single_precision_catalogue_is_clean() {
    let (catalog, options) = setup();
    let report = run_catalog(catalog, &options.with_dtypes(&[DType::F32, DType::F64]));
    let failures = report
        .operators
        .iter()
        .map(failures)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>();
    assert!(report.totals.is_clean(), "{}", failures.join("\n"));
    assert!(report.totals.passed > 0);
    assert!(report.totals.skipped > 0);
    assert_eq!(report.operators.len(), catalog.descriptors.len());
    assert!(report.operator("onnxfn.Hardmax").is_some());
}

#[test]
fn reports_serialise_to_json() {
    let (catalog, options) = setup();
    let report = run_catalog(catalog, &options.with_dtypes(&[DType::F64]));
    let text = report.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(
        value["totals"]["passed"].as_u64(),
        Some(report.totals.passed as u64)
    );
    let operators = value["operators"].as_array().unwrap();
    assert_eq!(operators.len(), report.operators.len());

    let erf = operators
        .iter()
        .find(|op| op["name"] == "erf")
        .unwrap();
    assert_eq!(erf["deterministic"], true);
    assert_eq!(erf["samples"][0]["dtype"], "float64");
    assert_eq!(erf["samples"][0]["outcome"]["status"], "passed");

    let col2im = operators
        .iter()
        .find(|op| op["name"] == "ops.aten.col2im")
        .unwrap();
    assert_eq!(col2im["samples"][0]["outcome"]["status"], "skipped");
    assert!(col2im["samples"][0]["outcome"]["detail"].is_string());
}

#[test]
fn tracing_installs_once() {
    init_tracing();
    assert!(!init_tracing());
}
