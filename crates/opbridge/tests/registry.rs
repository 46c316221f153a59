use opbridge::graph::GraphBuilder;
use opbridge::ir::{DType, TensorSpec};
use opbridge::lowering::{
    BindingStatus, CallArg, LowerError, LowerResult, Lowering, LoweringRegistry, OpCall,
    OperatorIdentity,
};
use opbridge::ops;
use opbridge::ValueId;

fn identity_lowering(_: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    Ok(vec![call.tensor(0, "self")?])
}

fn negate_lowering(builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
    let x = call.tensor(0, "self")?;
    Ok(vec![builder.neg(x)?])
}

const IDENTITY: Lowering = Lowering::new("test.identity", identity_lowering);
const NEGATE: Lowering = Lowering::new("test.negate", negate_lowering);

#[test]
fn identity_text_form_round_trips() {
    let identity = OperatorIdentity::parse("aten::index.Tensor").unwrap();
    assert_eq!(identity.namespace(), "aten");
    assert_eq!(identity.name(), "index");
    assert_eq!(identity.overload(), Some("Tensor"));
    assert_eq!(identity.to_string(), "aten::index.Tensor");
    assert_eq!(
        OperatorIdentity::parse("aten::erf").unwrap(),
        OperatorIdentity::aten("erf")
    );
}

#[test]
fn malformed_identities_are_rejected() {
    for text in ["erf", "::erf", "aten::", "aten::a.b.c", "aten::erf."] {
        assert!(OperatorIdentity::parse(text).is_err(), "{text} should not parse");
    }
}

#[test]
fn aliases_resolve_to_the_same_lowering() {
    let mut registry = LoweringRegistry::new();
    registry
        .register_lowering(&["aten::erf", "aten::special_erf"], IDENTITY)
        .unwrap();
    let base = registry.resolve_name("aten::erf").unwrap();
    let alias = registry.resolve_name("aten::special_erf").unwrap();
    assert_eq!(base.name(), alias.name());
}

#[test]
fn re_registering_the_same_lowering_is_a_no_op() {
    let mut registry = LoweringRegistry::new();
    registry.register_lowering(&["aten::erf"], IDENTITY).unwrap();
    registry.register_lowering(&["aten::erf"], IDENTITY).unwrap();
    assert_eq!(registry.len(), 1);
}

#[test]
fn conflicting_registration_fails_without_partial_bindings() {
    let mut registry = LoweringRegistry::new();
    registry.register_lowering(&["aten::erf"], IDENTITY).unwrap();

    let err = registry
        .register_lowering(&["aten::erfc", "aten::erf"], NEGATE)
        .unwrap_err();
    match err {
        LowerError::DuplicateBinding {
            identity,
            existing,
            attempted,
        } => {
            assert_eq!(identity.to_string(), "aten::erf");
            assert_eq!(existing, "test.identity");
            assert_eq!(attempted, "test.negate");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!registry.contains(&OperatorIdentity::aten("erfc")));
    assert_eq!(registry.len(), 1);
}

#[test]
fn gaps_and_unknown_identities_are_distinguishable() {
    let mut registry = LoweringRegistry::new();
    registry
        .acknowledge_gap(&["aten::special_zeta"], "no primitive yet")
        .unwrap();

    let pending = registry.resolve_name("aten::special_zeta").unwrap_err();
    assert!(pending.is_not_lowered());
    assert!(pending.to_string().contains("no primitive yet"));

    let unknown = registry.resolve_name("aten::special_nope").unwrap_err();
    assert!(unknown.is_unbound());

    assert_eq!(
        registry.status(&OperatorIdentity::aten("special_zeta")),
        BindingStatus::Pending
    );
    assert_eq!(
        registry.status(&OperatorIdentity::aten("special_nope")),
        BindingStatus::Unbound
    );
}

#[test]
fn a_gap_cannot_be_rebound_to_a_lowering() {
    let mut registry = LoweringRegistry::new();
    registry.acknowledge_gap(&["aten::stft"], "fft").unwrap();
    let err = registry.register_lowering(&["aten::stft"], IDENTITY).unwrap_err();
    assert!(matches!(err, LowerError::DuplicateBinding { .. }));
}

#[test]
fn overloads_do_not_fall_back_to_the_base_name() {
    let mut registry = LoweringRegistry::new();
    registry.register_lowering(&["aten::bernoulli.p"], IDENTITY).unwrap();
    assert!(registry.resolve_name("aten::bernoulli").unwrap_err().is_unbound());
}

#[test]
fn lower_call_seals_the_lowering_outputs() {
    let mut registry = LoweringRegistry::new();
    registry.register_lowering(&["aten::neg"], NEGATE).unwrap();

    let mut builder = GraphBuilder::new();
    let x = builder.parameter(TensorSpec::new(DType::F32, vec![2, 3]));
    let call = OpCall::new(OperatorIdentity::aten("neg")).arg(CallArg::Tensor(x));
    let function = registry.lower_call(builder, &call).unwrap();

    assert_eq!(function.name, "aten::neg");
    assert_eq!(function.parameters.len(), 1);
    assert_eq!(function.body.len(), 1);
    assert_eq!(function.results, vec![TensorSpec::new(DType::F32, vec![2, 3])]);
}

#[test]
fn missing_arguments_are_invalid_calls() {
    let registry = ops::builtin_registry().unwrap();
    let call = OpCall::new(OperatorIdentity::aten("erf"));
    let err = registry.lower_call(GraphBuilder::new(), &call).unwrap_err();
    assert!(matches!(err, LowerError::InvalidArgument { .. }), "{err}");
}

#[test]
fn builtin_registry_lists_identities_in_order() {
    let registry = ops::builtin_registry().unwrap();
    let identities = registry.identities();
    assert!(identities.windows(2).all(|pair| pair[0] < pair[1]));
    for name in ["aten::erfc", "aten::special_erfcx", "onnxfn::Hardmax"] {
        let identity = OperatorIdentity::parse(name).unwrap();
        assert_eq!(registry.status(&identity), BindingStatus::Lowered, "{name}");
    }
    for name in ["aten::special_zeta", "aten::col2im", "aten::max_pool2d_with_indices"] {
        let identity = OperatorIdentity::parse(name).unwrap();
        assert_eq!(registry.status(&identity), BindingStatus::Pending, "{name}");
    }
}
