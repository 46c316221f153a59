//! Sample protocol and per-operator sample generators.
//!
//! A generator is a plain function from a [`SampleContext`] to a lazy,
//! finite iterator of [`SampleInput`]s. Calling it again with an equal
//! context replays the same sequence: combinatorial structure comes from a
//! [`ParameterSpace`], and random payloads draw from an rng seeded by the
//! context.

mod composite;
mod conv;
mod embedding;
mod indexing;
mod make;
mod misc;
mod norm;
mod pooling;
mod space;
mod special;
mod tensor;

use std::collections::BTreeMap;
use std::fmt::Write as _;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::hashing::sample_seed;
use crate::ir::{DType, Shape};

pub use composite::{
    sample_inputs_depth_to_space, sample_inputs_hardmax, sample_inputs_reduce_composite,
    sample_inputs_space_to_depth,
};
pub use conv::{sample_inputs_col2im, sample_inputs_conv3d, sample_inputs_convolution};
pub use embedding::{
    embedding_bag_space, sample_inputs_embedding_bag, sample_inputs_embedding_bag_padding_idx,
};
pub use indexing::{sample_inputs_index, sample_inputs_slice_scatter, sample_inputs_unfold};
pub use make::TensorMaker;
pub use misc::{
    sample_inputs_bernoulli_p, sample_inputs_bernoulli_p_deterministic,
    sample_inputs_local_scalar_dense, sample_inputs_native_dropout,
    sample_inputs_scaled_dot_product_flash_attention, sample_inputs_stft,
    sample_inputs_tensor_bool, sample_inputs_tensor_float, sample_inputs_tensor_int,
};
pub use norm::{
    sample_inputs_layer_norm, sample_inputs_native_group_norm, sample_inputs_softmax,
};
pub use pooling::{
    max_pool_space, sample_inputs_max_pool_empty_strides, sample_inputs_max_pool_with_indices,
    PoolRank, StrideStyle,
};
pub use space::{
    Axis, Combination, Exclusion, InvalidParameterCombination, ParamValue, ParameterSpace,
    SpaceIter,
};
pub use special::{
    sample_inputs_erfcx, sample_inputs_log_softmax, sample_inputs_special_unary,
    sample_inputs_xlogy, SPECIAL_UNARY_SHAPES,
};
pub use tensor::{convert_value, round_float, wrap_integer, HostTensor, TensorData};

/// Shared small extent used by the generators.
pub const S: usize = 5;
/// Shared medium extent used by the generators.
pub const M: usize = 10;

/// One argument slot of a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleArg {
    Tensor(HostTensor),
    TensorList(Vec<Option<HostTensor>>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Ints(Vec<i64>),
    Str(String),
    DType(DType),
    None,
}

impl SampleArg {
    pub fn as_tensor(&self) -> Option<&HostTensor> {
        match self {
            SampleArg::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    fn describe(&self, out: &mut String) {
        let _ = match self {
            SampleArg::Tensor(tensor) => write!(out, "{}[{}]", tensor.dtype(), tensor.shape()),
            SampleArg::TensorList(list) => {
                out.push('[');
                for (idx, slot) in list.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    match slot {
                        Some(tensor) => {
                            let _ = write!(out, "{}[{}]", tensor.dtype(), tensor.shape());
                        }
                        None => out.push_str("None"),
                    }
                }
                out.push(']');
                Ok(())
            }
            SampleArg::Int(value) => write!(out, "{value}"),
            SampleArg::Float(value) => write!(out, "{value:?}"),
            SampleArg::Bool(value) => write!(out, "{value}"),
            SampleArg::Ints(values) => write!(out, "{values:?}"),
            SampleArg::Str(value) => write!(out, "{value:?}"),
            SampleArg::DType(dtype) => write!(out, "{dtype}"),
            SampleArg::None => write!(out, "None"),
        };
    }
}

impl From<HostTensor> for SampleArg {
    fn from(tensor: HostTensor) -> Self {
        SampleArg::Tensor(tensor)
    }
}

impl From<Option<HostTensor>> for SampleArg {
    fn from(tensor: Option<HostTensor>) -> Self {
        tensor.map_or(SampleArg::None, SampleArg::Tensor)
    }
}

impl From<i64> for SampleArg {
    fn from(value: i64) -> Self {
        SampleArg::Int(value)
    }
}

impl From<f64> for SampleArg {
    fn from(value: f64) -> Self {
        SampleArg::Float(value)
    }
}

impl From<bool> for SampleArg {
    fn from(value: bool) -> Self {
        SampleArg::Bool(value)
    }
}

impl From<Vec<i64>> for SampleArg {
    fn from(values: Vec<i64>) -> Self {
        SampleArg::Ints(values)
    }
}

impl From<&str> for SampleArg {
    fn from(value: &str) -> Self {
        SampleArg::Str(value.to_string())
    }
}

/// One concrete call: primary payload, positional arguments, keyword arguments and the dtype under test.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleInput {
    pub input: SampleArg,
    pub args: Vec<SampleArg>,
    pub kwargs: BTreeMap<String, SampleArg>,
    pub dtype: DType,
}

impl SampleInput {
    pub fn new(input: impl Into<SampleArg>, dtype: DType) -> Self {
        Self {
            input: input.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            dtype,
        }
    }

    pub fn arg(mut self, arg: impl Into<SampleArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn kwarg(mut self, name: &str, arg: impl Into<SampleArg>) -> Self {
        self.kwargs.insert(name.to_string(), arg.into());
        self
    }

    /// Shape of the primary payload; rank 0 for scalar payloads.
    pub fn shape(&self) -> Shape {
        match &self.input {
            SampleArg::Tensor(tensor) => tensor.shape().clone(),
            _ => Shape::scalar(),
        }
    }

    /// True when the primary payload is empty or rank 0.
    pub fn has_boundary_shape(&self) -> bool {
        let shape = self.shape();
        shape.rank() == 0 || shape.is_empty()
    }

    pub fn tensors(&self) -> Vec<&HostTensor> {
        let mut tensors = Vec::new();
        let all = std::iter::once(&self.input)
            .chain(self.args.iter())
            .chain(self.kwargs.values());
        for arg in all {
            match arg {
                SampleArg::Tensor(tensor) => tensors.push(tensor),
                SampleArg::TensorList(list) => tensors.extend(list.iter().flatten()),
                _ => {}
            }
        }
        tensors
    }

    /// Compact one-line description for reports, e.g. `float32[5x5], 1, dim=0`.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        self.input.describe(&mut out);
        for arg in &self.args {
            out.push_str(", ");
            arg.describe(&mut out);
        }
        for (name, arg) in &self.kwargs {
            let _ = write!(out, ", {name}=");
            arg.describe(&mut out);
        }
        out
    }
}

/// Per-invocation context handed to a generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleContext {
    pub op_name: String,
    pub dtype: DType,
    pub requires_grad: bool,
    pub seed: u64,
}

impl SampleContext {
    pub fn new(op_name: impl Into<String>, dtype: DType) -> Self {
        Self {
            op_name: op_name.into(),
            dtype,
            requires_grad: false,
            seed: crate::env::sample_seed(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    /// Fresh rng for this context; every call starts from the same state.
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(sample_seed(self.seed, &self.op_name, self.dtype.name()))
    }

    pub fn maker(&self) -> TensorMaker {
        TensorMaker::new(self)
    }
}

/// Lazy, finite sequence of samples.
pub type SampleIter = Box<dyn Iterator<Item = SampleInput> + Send>;

/// Generator entry point stored in descriptors.
pub type SampleGenerator = fn(&SampleContext) -> SampleIter;
