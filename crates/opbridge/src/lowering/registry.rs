use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::graph::GraphBuilder;
use crate::ir::{Function, ValueId};
use crate::samples::SampleInput;

use super::call::OpCall;
use super::error::{LowerError, LowerResult};
use super::identity::OperatorIdentity;

/// Signature shared by every lowering implementation.
pub type LoweringFn = fn(&mut GraphBuilder, &OpCall) -> LowerResult<Vec<ValueId>>;

/// Named pure rewrite of one high-level call into primitive instructions.
///
/// Two lowerings are the same binding when their names match; aliases register
/// the same `Lowering` under several identities.
#[derive(Clone, Copy)]
pub struct Lowering {
    name: &'static str,
    func: LoweringFn,
}

impl Lowering {
    pub const fn new(name: &'static str, func: LoweringFn) -> Self {
        Self { name, func }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the lowering against an already-bound call.
    pub fn apply(&self, builder: &mut GraphBuilder, call: &OpCall) -> LowerResult<Vec<ValueId>> {
        (self.func)(builder, call)
    }
}

impl fmt::Debug for Lowering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lowering").field(&self.name).finish()
    }
}

#[derive(Debug, Clone)]
enum Binding {
    Lowered(Lowering),
    Pending { reason: String },
}

impl Binding {
    fn label(&self) -> String {
        match self {
            Binding::Lowered(lowering) => lowering.name().to_string(),
            Binding::Pending { reason } => format!("<not lowered: {reason}>"),
        }
    }

    fn same_as(&self, other: &Binding) -> bool {
        match (self, other) {
            (Binding::Lowered(lhs), Binding::Lowered(rhs)) => lhs.name() == rhs.name(),
            (Binding::Pending { reason: lhs }, Binding::Pending { reason: rhs }) => lhs == rhs,
            _ => false,
        }
    }
}

/// Resolution outcome for an identity, without the error plumbing of [`LoweringRegistry::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStatus {
    Lowered,
    Pending,
    Unbound,
}

/// Maps operator identities to lowerings or acknowledged gaps. Aliasing is explicit:
/// there is no fallback from an overload to its base name.
#[derive(Debug, Default)]
pub struct LoweringRegistry {
    bindings: HashMap<OperatorIdentity, Binding>,
}

impl LoweringRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds every identity to `lowering`. Either all identities are bound or none are.
    pub fn register(
        &mut self,
        identities: &[OperatorIdentity],
        lowering: Lowering,
    ) -> LowerResult<()> {
        self.bind_all(identities, Binding::Lowered(lowering))
    }

    /// Parses `names` and binds them to `lowering`.
    pub fn register_lowering(&mut self, names: &[&str], lowering: Lowering) -> LowerResult<()> {
        let identities = parse_names(names)?;
        self.register(&identities, lowering)
    }

    /// Records identities that are known but intentionally not lowered yet.
    pub fn acknowledge_gap(&mut self, names: &[&str], reason: &str) -> LowerResult<()> {
        let identities = parse_names(names)?;
        self.bind_all(
            &identities,
            Binding::Pending {
                reason: reason.to_string(),
            },
        )
    }

    fn bind_all(&mut self, identities: &[OperatorIdentity], binding: Binding) -> LowerResult<()> {
        for identity in identities {
            if let Some(existing) = self.bindings.get(identity) {
                if !existing.same_as(&binding) {
                    return Err(LowerError::DuplicateBinding {
                        identity: identity.clone(),
                        existing: existing.label(),
                        attempted: binding.label(),
                    });
                }
            }
        }
        for identity in identities {
            debug!(identity = %identity, binding = %binding.label(), "bound operator");
            self.bindings.insert(identity.clone(), binding.clone());
        }
        Ok(())
    }

    pub fn resolve(&self, identity: &OperatorIdentity) -> LowerResult<&Lowering> {
        match self.bindings.get(identity) {
            Some(Binding::Lowered(lowering)) => Ok(lowering),
            Some(Binding::Pending { reason }) => Err(LowerError::NotLowered {
                identity: identity.clone(),
                reason: reason.clone(),
            }),
            None => Err(LowerError::UnboundOperator(identity.clone())),
        }
    }

    pub fn resolve_name(&self, name: &str) -> LowerResult<&Lowering> {
        let identity = OperatorIdentity::parse(name)?;
        self.resolve(&identity)
    }

    pub fn status(&self, identity: &OperatorIdentity) -> BindingStatus {
        match self.bindings.get(identity) {
            Some(Binding::Lowered(_)) => BindingStatus::Lowered,
            Some(Binding::Pending { .. }) => BindingStatus::Pending,
            None => BindingStatus::Unbound,
        }
    }

    pub fn contains(&self, identity: &OperatorIdentity) -> bool {
        self.bindings.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// All bound identities in sorted order.
    pub fn identities(&self) -> Vec<&OperatorIdentity> {
        let mut identities = self.bindings.keys().collect::<Vec<_>>();
        identities.sort();
        identities
    }

    /// Resolves `call.identity` and lowers the call in `builder`, sealing the result into a function.
    pub fn lower_call(&self, mut builder: GraphBuilder, call: &OpCall) -> LowerResult<Function> {
        let lowering = self.resolve(&call.identity)?;
        let outputs = lowering.apply(&mut builder, call)?;
        let function = builder.finish(call.identity.to_string(), outputs)?;
        if crate::env::dump_graphs_enabled() {
            debug!(lowering = lowering.name(), "lowered function:\n{function}");
        }
        Ok(function)
    }

    /// Lowers `sample` for `identity`, importing the sample's tensors as parameters.
    pub fn lower_sample(
        &self,
        identity: &OperatorIdentity,
        sample: &SampleInput,
    ) -> LowerResult<Function> {
        self.resolve(identity)?;
        let mut builder = GraphBuilder::new();
        let call = OpCall::bind_sample(identity.clone(), sample, &mut builder);
        self.lower_call(builder, &call)
    }
}

fn parse_names(names: &[&str]) -> LowerResult<Vec<OperatorIdentity>> {
    names
        .iter()
        .map(|name| OperatorIdentity::parse(name).map_err(LowerError::from))
        .collect()
}
