use std::collections::BTreeMap;

use crate::graph::GraphBuilder;
use crate::ir::{DType, ValueId};
use crate::samples::{SampleArg, SampleInput};

use super::error::{LowerError, LowerResult};
use super::identity::OperatorIdentity;

/// Argument as seen by a lowering: tensors are graph values, everything else is a compile-time constant.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    Tensor(ValueId),
    TensorList(Vec<Option<ValueId>>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Ints(Vec<i64>),
    Str(String),
    DType(DType),
    None,
}

impl CallArg {
    fn kind(&self) -> &'static str {
        match self {
            CallArg::Tensor(_) => "tensor",
            CallArg::TensorList(_) => "tensor list",
            CallArg::Int(_) => "int",
            CallArg::Float(_) => "float",
            CallArg::Bool(_) => "bool",
            CallArg::Ints(_) => "int list",
            CallArg::Str(_) => "string",
            CallArg::DType(_) => "dtype",
            CallArg::None => "None",
        }
    }
}

/// One high-level call: positional arguments followed by keyword arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct OpCall {
    pub identity: OperatorIdentity,
    pub args: Vec<CallArg>,
    pub kwargs: BTreeMap<String, CallArg>,
}

impl OpCall {
    pub fn new(identity: OperatorIdentity) -> Self {
        Self {
            identity,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: CallArg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, arg: CallArg) -> Self {
        self.kwargs.insert(name.into(), arg);
        self
    }

    /// Declares every tensor in `sample` as a graph parameter, in payload, args, kwargs order.
    pub fn bind_sample(
        identity: OperatorIdentity,
        sample: &SampleInput,
        builder: &mut GraphBuilder,
    ) -> Self {
        let mut call = OpCall::new(identity);
        call.args.push(bind_arg(&sample.input, builder));
        for arg in &sample.args {
            call.args.push(bind_arg(arg, builder));
        }
        for (name, arg) in &sample.kwargs {
            call.kwargs.insert(name.clone(), bind_arg(arg, builder));
        }
        call
    }

    /// Looks up a parameter by position, then by keyword; explicit `None` counts as absent.
    pub fn param(&self, index: usize, name: &str) -> Option<&CallArg> {
        self.args
            .get(index)
            .or_else(|| self.kwargs.get(name))
            .filter(|arg| !matches!(arg, CallArg::None))
    }

    pub fn keyword(&self, name: &str) -> Option<&CallArg> {
        self.kwargs
            .get(name)
            .filter(|arg| !matches!(arg, CallArg::None))
    }

    pub fn invalid(&self, message: impl Into<String>) -> LowerError {
        LowerError::invalid_argument(&self.identity, message)
    }

    fn missing(&self, index: usize, name: &str) -> LowerError {
        self.invalid(format!("missing argument '{name}' (position {index})"))
    }

    fn wrong_kind(&self, name: &str, expected: &str, got: &CallArg) -> LowerError {
        self.invalid(format!(
            "argument '{name}' must be {expected}, got {}",
            got.kind()
        ))
    }

    pub fn tensor(&self, index: usize, name: &str) -> LowerResult<ValueId> {
        self.opt_tensor(index, name)?
            .ok_or_else(|| self.missing(index, name))
    }

    pub fn opt_tensor(&self, index: usize, name: &str) -> LowerResult<Option<ValueId>> {
        match self.param(index, name) {
            None => Ok(None),
            Some(CallArg::Tensor(value)) => Ok(Some(*value)),
            Some(other) => Err(self.wrong_kind(name, "a tensor", other)),
        }
    }

    pub fn int(&self, index: usize, name: &str) -> LowerResult<i64> {
        self.opt_int(index, name)?
            .ok_or_else(|| self.missing(index, name))
    }

    pub fn opt_int(&self, index: usize, name: &str) -> LowerResult<Option<i64>> {
        match self.param(index, name) {
            None => Ok(None),
            Some(CallArg::Int(value)) => Ok(Some(*value)),
            Some(CallArg::Bool(value)) => Ok(Some(i64::from(*value))),
            Some(CallArg::Ints(values)) if values.len() == 1 => Ok(Some(values[0])),
            Some(other) => Err(self.wrong_kind(name, "an int", other)),
        }
    }

    pub fn int_or(&self, index: usize, name: &str, default: i64) -> LowerResult<i64> {
        Ok(self.opt_int(index, name)?.unwrap_or(default))
    }

    pub fn float(&self, index: usize, name: &str) -> LowerResult<f64> {
        self.opt_float(index, name)?
            .ok_or_else(|| self.missing(index, name))
    }

    pub fn opt_float(&self, index: usize, name: &str) -> LowerResult<Option<f64>> {
        match self.param(index, name) {
            None => Ok(None),
            Some(CallArg::Float(value)) => Ok(Some(*value)),
            Some(CallArg::Int(value)) => Ok(Some(*value as f64)),
            Some(other) => Err(self.wrong_kind(name, "a float", other)),
        }
    }

    pub fn float_or(&self, index: usize, name: &str, default: f64) -> LowerResult<f64> {
        Ok(self.opt_float(index, name)?.unwrap_or(default))
    }

    pub fn bool_or(&self, index: usize, name: &str, default: bool) -> LowerResult<bool> {
        match self.param(index, name) {
            None => Ok(default),
            Some(CallArg::Bool(value)) => Ok(*value),
            Some(CallArg::Int(value)) => Ok(*value != 0),
            Some(other) => Err(self.wrong_kind(name, "a bool", other)),
        }
    }

    /// Int list; a bare int is accepted as a one-element list.
    pub fn opt_ints(&self, index: usize, name: &str) -> LowerResult<Option<Vec<i64>>> {
        match self.param(index, name) {
            None => Ok(None),
            Some(CallArg::Ints(values)) => Ok(Some(values.clone())),
            Some(CallArg::Int(value)) => Ok(Some(vec![*value])),
            Some(other) => Err(self.wrong_kind(name, "an int list", other)),
        }
    }

    pub fn ints(&self, index: usize, name: &str) -> LowerResult<Vec<i64>> {
        self.opt_ints(index, name)?
            .ok_or_else(|| self.missing(index, name))
    }

    pub fn opt_str(&self, index: usize, name: &str) -> LowerResult<Option<&str>> {
        match self.param(index, name) {
            None => Ok(None),
            Some(CallArg::Str(value)) => Ok(Some(value.as_str())),
            Some(other) => Err(self.wrong_kind(name, "a string", other)),
        }
    }

    pub fn opt_dtype(&self, index: usize, name: &str) -> LowerResult<Option<DType>> {
        match self.param(index, name) {
            None => Ok(None),
            Some(CallArg::DType(dtype)) => Ok(Some(*dtype)),
            Some(other) => Err(self.wrong_kind(name, "a dtype", other)),
        }
    }
}

fn bind_arg(arg: &SampleArg, builder: &mut GraphBuilder) -> CallArg {
    match arg {
        SampleArg::Tensor(tensor) => CallArg::Tensor(builder.parameter(tensor.spec())),
        SampleArg::TensorList(tensors) => CallArg::TensorList(
            tensors
                .iter()
                .map(|slot| {
                    slot.as_ref()
                        .map(|tensor| builder.parameter(tensor.spec()))
                })
                .collect(),
        ),
        SampleArg::Int(value) => CallArg::Int(*value),
        SampleArg::Float(value) => CallArg::Float(*value),
        SampleArg::Bool(value) => CallArg::Bool(*value),
        SampleArg::Ints(values) => CallArg::Ints(values.clone()),
        SampleArg::Str(value) => CallArg::Str(value.clone()),
        SampleArg::DType(dtype) => CallArg::DType(*dtype),
        SampleArg::None => CallArg::None,
    }
}
