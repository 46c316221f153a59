//! Lowerings from high-level tensor operators to a closed primitive instruction
//! set, plus the sample generators and descriptor catalogue that drive
//! conformance checks against reference semantics.

pub mod catalog;
mod env;
pub mod graph;
pub mod hashing;
pub mod ir;
pub mod lowering;
pub mod ops;
pub mod samples;

pub use catalog::{catalog, Catalog, CatalogError, DTypeSet, DescriptorTable, OperatorDescriptor};
pub use env::sample_seed;
pub use graph::GraphBuilder;
pub use ir::{DType, Function, Shape, TensorSpec, ValueId};
pub use lowering::{
    BindingStatus, CallArg, LowerError, LowerResult, Lowering, LoweringRegistry, OpCall,
    OperatorIdentity,
};
pub use samples::{SampleArg, SampleContext, SampleGenerator, SampleInput, SampleIter};
