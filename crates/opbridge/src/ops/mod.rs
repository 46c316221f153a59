//! Lowering implementations grouped by operator family.

mod common;
pub mod composite;
pub mod nn;
pub mod pending;
pub mod special;

use tracing::debug;

use crate::lowering::{LowerResult, LoweringRegistry};

/// Registers every lowering and acknowledged gap into `registry`.
pub fn register_all(registry: &mut LoweringRegistry) -> LowerResult<()> {
    special::register(registry)?;
    nn::register(registry)?;
    composite::register(registry)?;
    pending::register(registry)?;
    debug!(bindings = registry.len(), "registered operator bindings");
    Ok(())
}

/// Fresh registry holding every built-in binding.
pub fn builtin_registry() -> LowerResult<LoweringRegistry> {
    let mut registry = LoweringRegistry::new();
    register_all(&mut registry)?;
    Ok(registry)
}
