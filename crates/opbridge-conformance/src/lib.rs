//! Conformance harness for opbridge lowerings: a host interpreter for lowered
//! functions, direct reference semantics, tolerance policy and the runner
//! that ties them to the operator catalogue.

pub mod interpreter;
pub mod logging;
pub mod reference;
pub mod runner;
pub mod tolerance;

pub use interpreter::InterpretError;
pub use logging::init_tracing;
pub use reference::ReferenceError;
pub use runner::{
    run_catalog, run_descriptor, run_operator, ConformanceReport, OperatorReport, OutcomeCounts,
    RunOptions, SampleOutcome, SampleReport, SemanticMismatch,
};
pub use tolerance::{Tolerance, ToleranceConfig};
