use std::collections::BTreeSet;
use std::fmt;

use crate::ir::DType;
use crate::lowering::OperatorIdentity;
use crate::samples::{SampleContext, SampleGenerator, SampleIter};

/// Ordered set of dtypes an operator is exercised with.
///
/// The named constructors mirror the dtype groups of the reference test suite:
/// - `all_types`: every integer width plus `float32` / `float64` (no bool, no half types);
/// - `floating_types`: `float32` / `float64`;
/// - the `_and` forms add the listed extras, the `complex` forms add `complex64` / `complex128`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DTypeSet {
    dtypes: BTreeSet<DType>,
}

const INTEGER_TYPES: [DType; 5] = [DType::Ui8, DType::Si8, DType::Si16, DType::Si32, DType::Si64];
const FLOATING_TYPES: [DType; 2] = [DType::F32, DType::F64];
const COMPLEX_TYPES: [DType; 2] = [DType::Cf32, DType::Cf64];

impl DTypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dtypes(dtypes: &[DType]) -> Self {
        Self {
            dtypes: dtypes.iter().copied().collect(),
        }
    }

    fn with(mut self, dtypes: &[DType]) -> Self {
        self.dtypes.extend(dtypes.iter().copied());
        self
    }

    pub fn floating_types() -> Self {
        Self::from_dtypes(&FLOATING_TYPES)
    }

    pub fn floating_types_and(extra: &[DType]) -> Self {
        Self::floating_types().with(extra)
    }

    pub fn floating_types_and_half() -> Self {
        Self::floating_types().with(&[DType::F16])
    }

    pub fn floating_and_complex_types_and(extra: &[DType]) -> Self {
        Self::floating_types().with(&COMPLEX_TYPES).with(extra)
    }

    pub fn all_types() -> Self {
        Self::from_dtypes(&INTEGER_TYPES).with(&FLOATING_TYPES)
    }

    pub fn all_types_and(extra: &[DType]) -> Self {
        Self::all_types().with(extra)
    }

    pub fn all_types_and_half() -> Self {
        Self::all_types().with(&[DType::F16])
    }

    pub fn all_types_and_complex_and(extra: &[DType]) -> Self {
        Self::all_types().with(&COMPLEX_TYPES).with(extra)
    }

    pub fn contains(&self, dtype: DType) -> bool {
        self.dtypes.contains(&dtype)
    }

    pub fn len(&self) -> usize {
        self.dtypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dtypes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DType> + '_ {
        self.dtypes.iter().copied()
    }
}

impl fmt::Display for DTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, dtype) in self.dtypes.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dtype}")?;
        }
        f.write_str("}")
    }
}

/// One catalogued operator under test.
///
/// `(name, variant)` is unique within a table. Capability flags default to
/// the reference test suite's defaults and are adjusted with the builder-style
/// setters.
#[derive(Debug, Clone)]
pub struct OperatorDescriptor {
    pub name: String,
    pub variant: Option<String>,
    pub identity: OperatorIdentity,
    pub dtypes: DTypeSet,
    pub generator: SampleGenerator,
    pub supports_out: bool,
    pub supports_autograd: bool,
    pub supports_forward_ad: bool,
    pub supports_fwgrad_bwgrad: bool,
    pub check_batched_forward_grad: bool,
    /// False when outputs depend on random draws; the runner then compares shape and dtype only.
    pub deterministic: bool,
}

impl OperatorDescriptor {
    pub fn new(
        name: impl Into<String>,
        identity: OperatorIdentity,
        dtypes: DTypeSet,
        generator: SampleGenerator,
    ) -> Self {
        Self {
            name: name.into(),
            variant: None,
            identity,
            dtypes,
            generator,
            supports_out: true,
            supports_autograd: true,
            supports_forward_ad: false,
            supports_fwgrad_bwgrad: false,
            check_batched_forward_grad: true,
            deterministic: true,
        }
    }

    pub fn variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn supports_out(mut self, value: bool) -> Self {
        self.supports_out = value;
        self
    }

    pub fn supports_autograd(mut self, value: bool) -> Self {
        self.supports_autograd = value;
        self
    }

    pub fn supports_forward_ad(mut self, value: bool) -> Self {
        self.supports_forward_ad = value;
        self
    }

    pub fn supports_fwgrad_bwgrad(mut self, value: bool) -> Self {
        self.supports_fwgrad_bwgrad = value;
        self
    }

    pub fn check_batched_forward_grad(mut self, value: bool) -> Self {
        self.check_batched_forward_grad = value;
        self
    }

    pub fn deterministic(mut self, value: bool) -> Self {
        self.deterministic = value;
        self
    }

    pub fn key(&self) -> (&str, Option<&str>) {
        (self.name.as_str(), self.variant.as_deref())
    }

    /// Name used in reports: `name` or `name_variant`.
    pub fn full_name(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{}_{variant}", self.name),
            None => self.name.clone(),
        }
    }

    /// Context handed to the generator for `dtype`.
    pub fn context(&self, dtype: DType) -> SampleContext {
        SampleContext::new(self.name.clone(), dtype)
    }

    /// Runs the generator for `dtype` with the process-wide seed.
    pub fn samples(&self, dtype: DType) -> SampleIter {
        (self.generator)(&self.context(dtype))
    }
}
