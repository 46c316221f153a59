use tracing::debug;

use crate::ir::DType;

use super::descriptor::OperatorDescriptor;
use super::error::CatalogError;

/// Dtypes the conformance runner can exercise. Quantized and fp8 types are excluded.
pub const RUNNER_DTYPES: [DType; 12] = [
    DType::I1,
    DType::Ui8,
    DType::Si8,
    DType::Si16,
    DType::Si32,
    DType::Si64,
    DType::F16,
    DType::Bf16,
    DType::F32,
    DType::F64,
    DType::Cf32,
    DType::Cf64,
];

pub fn in_runner_universe(dtype: DType) -> bool {
    RUNNER_DTYPES.contains(&dtype)
}

/// Append-only, insertion-ordered catalogue of operator descriptors.
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    descriptors: Vec<OperatorDescriptor>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and appends `descriptor`; a rejected descriptor leaves the table unchanged.
    pub fn push(&mut self, descriptor: OperatorDescriptor) -> Result<(), CatalogError> {
        if self
            .descriptors
            .iter()
            .any(|existing| existing.key() == descriptor.key())
        {
            return Err(CatalogError::DuplicateDescriptor {
                name: descriptor.name,
                variant: descriptor.variant,
            });
        }
        if descriptor.dtypes.is_empty() {
            return Err(CatalogError::EmptyDTypeSet(descriptor.full_name()));
        }
        if let Some(dtype) = descriptor.dtypes.iter().find(|&dtype| !in_runner_universe(dtype)) {
            return Err(CatalogError::DTypeOutsideUniverse {
                name: descriptor.full_name(),
                dtype,
            });
        }
        debug!(
            descriptor = %descriptor.full_name(),
            identity = %descriptor.identity,
            dtypes = %descriptor.dtypes,
            "catalogued descriptor"
        );
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// First descriptor named `name`, whatever its variant.
    pub fn lookup(&self, name: &str) -> Result<&OperatorDescriptor, CatalogError> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.name == name)
            .ok_or_else(|| CatalogError::UnknownOperator(name.to_string()))
    }

    pub fn lookup_variant(
        &self,
        name: &str,
        variant: Option<&str>,
    ) -> Result<&OperatorDescriptor, CatalogError> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.key() == (name, variant))
            .ok_or_else(|| match variant {
                Some(variant) => CatalogError::UnknownOperator(format!("{name} ({variant})")),
                None => CatalogError::UnknownOperator(name.to_string()),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperatorDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
