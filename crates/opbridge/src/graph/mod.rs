//! Graph construction API consumed by lowerings.

mod builder;

pub use builder::{broadcast_shapes, normalize_axis, GraphBuilder};
