use std::fs;
use std::path::Path;

use opbridge::DType;
use opbridge_conformance::tolerance::{matches_pattern, ToleranceConfig, ATOL, RTOL};
use opbridge_conformance::Tolerance;
use proptest::prelude::*;

#[test]
fn integer_results_compare_exactly() {
    assert_eq!(Tolerance::for_dtype(DType::Si64), Tolerance::EXACT);
    assert_eq!(Tolerance::for_dtype(DType::I1), Tolerance::EXACT);
    assert_eq!(
        Tolerance::for_dtype(DType::F32),
        Tolerance {
            atol: ATOL,
            rtol: RTOL
        }
    );
    assert!(Tolerance::for_dtype(DType::Bf16).atol > Tolerance::for_dtype(DType::F16).atol);
}

#[test]
fn nan_and_infinity_need_exact_counterparts() {
    let tol = Tolerance::for_dtype(DType::F32);
    assert!(tol.allows(f64::NAN, f64::NAN));
    assert!(!tol.allows(f64::NAN, 0.0));
    assert!(!tol.allows(0.0, f64::NAN));
    assert!(tol.allows(f64::INFINITY, f64::INFINITY));
    assert!(!tol.allows(f64::INFINITY, f64::NEG_INFINITY));
    assert!(!tol.allows(f64::INFINITY, f64::MAX));
}

#[test]
fn closeness_scales_with_magnitude() {
    let tol = Tolerance {
        atol: 1e-3,
        rtol: 1e-2,
    };
    assert!(tol.allows(0.0, 1e-3));
    assert!(!tol.allows(0.0, 2e-3));
    assert!(tol.allows(100.0, 100.9));
    assert!(!tol.allows(100.0, 102.5));
    assert!(Tolerance::EXACT.allows(3.0, 3.0));
    assert!(!Tolerance::EXACT.allows(3.0, 3.0 + f64::EPSILON * 4.0));
}

#[test]
fn patterns_support_wildcards() {
    assert!(matches_pattern("ops.aten.layer_norm", "ops.aten.layer_norm"));
    assert!(!matches_pattern("ops.aten.layer_norm", "ops.aten.layer"));
    assert!(matches_pattern("ops.aten.layer_norm", "ops.aten.*"));
    assert!(matches_pattern("special.xlogy", "*xlogy"));
    assert!(matches_pattern("onnxfn.ReduceL1", "onnxfn.Reduce*"));
    assert!(matches_pattern("onnxfn.ReduceL1", "*Reduce*1"));
    assert!(matches_pattern("anything", "*"));
    assert!(!matches_pattern("a", "a*a"));
    assert!(!matches_pattern("xlogy_extra", "*xlogy"));
}

#[test]
fn more_specific_rules_take_precedence() {
    let config = ToleranceConfig::from_json(
        r#"{
            "default": { "atol": 1.0 },
            "rules": [
                { "operator": "erf", "dtype": "float32", "atol": 4.0 },
                { "operator": "erf", "atol": 3.0, "rtol": 0.3 },
                { "dtype": "float32", "atol": 2.0, "rtol": 0.2 },
                { "dtype": "float*", "rtol": 0.25 }
            ]
        }"#,
    )
    .unwrap();

    let erf = config.resolve("erf", DType::F32);
    assert_eq!(erf.atol, 4.0);
    assert_eq!(erf.rtol, 0.3);

    let erf64 = config.resolve("erf", DType::F64);
    assert_eq!(erf64.atol, 3.0);
    assert_eq!(erf64.rtol, 0.3);

    let other = config.resolve("erfc", DType::F32);
    assert_eq!(other.atol, 1.0);
    assert_eq!(other.rtol, 0.25);

    let ints = config.resolve("erfc", DType::Si32);
    assert_eq!(ints.atol, 1.0);
    assert_eq!(ints.rtol, 0.0);
}

#[test]
fn malformed_config_is_an_error() {
    assert!(ToleranceConfig::from_json("{ \"rules\": 3 }").is_err());
    assert_eq!(
        ToleranceConfig::from_json("{}").unwrap(),
        ToleranceConfig::default()
    );
}

#[test]
fn missing_files_are_only_fine_when_optional() {
    let path = std::env::temp_dir().join(format!(
        "opbridge-conformance-missing-{}.json",
        std::process::id()
    ));
    assert_eq!(
        ToleranceConfig::from_path(&path, true).unwrap(),
        ToleranceConfig::default()
    );
    assert!(ToleranceConfig::from_path(&path, false).is_err());
}

#[test]
fn config_files_are_read_from_disk() {
    let path = std::env::temp_dir().join(format!(
        "opbridge-conformance-rules-{}.json",
        std::process::id()
    ));
    fs::write(&path, r#"{ "rules": [ { "dtype": "bfloat16", "atol": 0.5 } ] }"#).unwrap();
    let config = ToleranceConfig::from_path(&path, false).unwrap();
    fs::remove_file(&path).unwrap();
    assert_eq!(config.resolve("erf", DType::Bf16).atol, 0.5);
    assert_eq!(config.resolve("erf", DType::F16), Tolerance::for_dtype(DType::F16));
}

#[test]
fn shipped_config_widens_half_precision_norms() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/conformance.json");
    let config = ToleranceConfig::from_path(&path, false).unwrap();
    let norm = config.resolve("ops.aten.layer_norm", DType::F16);
    assert!(norm.atol > Tolerance::for_dtype(DType::F16).atol);
    assert_eq!(
        config.resolve("ops.aten.layer_norm", DType::F32),
        Tolerance::for_dtype(DType::F32)
    );
}

proptest! {
    #[test]
    fn allows_is_symmetric(a in -1e6f64..1e6, b in -1e6f64..1e6) {
        let tol = Tolerance::for_dtype(DType::F16);
        prop_assert_eq!(tol.allows(a, b), tol.allows(b, a));
    }

    #[test]
    fn finite_values_match_themselves(a in proptest::num::f64::NORMAL) {
        prop_assert!(Tolerance::EXACT.allows(a, a));
    }
}
