//! Primitive instruction set: dtypes, shapes, literals and the closed operation vocabulary.

mod text;
mod types;

pub use types::*;
