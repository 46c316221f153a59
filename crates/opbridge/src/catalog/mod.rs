//! Process-wide catalogue: the lowering registry paired with the descriptor table.
//!
//! Built once on first access and read-only afterwards. Construction validates
//! that every catalogued identity is either lowered or an acknowledged gap.

mod builtin;
mod descriptor;
mod error;
mod table;

use std::sync::OnceLock;

use tracing::info;

use crate::lowering::{BindingStatus, LoweringRegistry};
use crate::ops;

pub use builtin::builtin_descriptors;
pub use descriptor::{DTypeSet, OperatorDescriptor};
pub use error::CatalogError;
pub use table::{in_runner_universe, DescriptorTable, RUNNER_DTYPES};

#[derive(Debug)]
pub struct Catalog {
    pub registry: LoweringRegistry,
    pub descriptors: DescriptorTable,
}

impl Catalog {
    /// Builds and validates a fresh catalogue without touching the process-wide one.
    pub fn build() -> Result<Self, CatalogError> {
        let registry = ops::builtin_registry()?;
        let descriptors = builtin_descriptors()?;
        let catalog = Self::from_parts(registry, descriptors)?;
        let lowered = catalog
            .descriptors
            .iter()
            .filter(|descriptor| catalog.status(descriptor) == BindingStatus::Lowered)
            .count();
        info!(
            bindings = catalog.registry.len(),
            descriptors = catalog.descriptors.len(),
            lowered,
            "operator catalogue initialised"
        );
        Ok(catalog)
    }

    /// Pairs a registry with a table, rejecting descriptors whose identity has no binding.
    pub fn from_parts(
        registry: LoweringRegistry,
        descriptors: DescriptorTable,
    ) -> Result<Self, CatalogError> {
        for descriptor in descriptors.iter() {
            if !registry.contains(&descriptor.identity) {
                return Err(CatalogError::UnresolvedDescriptor {
                    name: descriptor.full_name(),
                    identity: descriptor.identity.clone(),
                });
            }
        }
        Ok(Self {
            registry,
            descriptors,
        })
    }

    pub fn status(&self, descriptor: &OperatorDescriptor) -> BindingStatus {
        self.registry.status(&descriptor.identity)
    }
}

static CATALOG: OnceLock<Result<Catalog, String>> = OnceLock::new();

/// The process-wide catalogue, built on first access.
///
/// A construction failure is sticky: every later call reports the same error.
pub fn catalog() -> Result<&'static Catalog, CatalogError> {
    CATALOG
        .get_or_init(|| Catalog::build().map_err(|err| err.to_string()))
        .as_ref()
        .map_err(|message| CatalogError::Initialization(message.clone()))
}
