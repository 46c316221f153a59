use std::sync::Arc;

use anyhow::{ensure, Result};

use crate::ir::{DType, Shape, TensorSpec};

/// Element storage of a host tensor. Floats are held in f64 already rounded to the tensor dtype.
#[derive(Debug, Clone)]
pub enum TensorData {
    Float(Arc<[f64]>),
    Int(Arc<[i64]>),
    Bool(Arc<[bool]>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::Float(values) => values.len(),
            TensorData::Int(values) => values.len(),
            TensorData::Bool(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for TensorData {
    /// Floats compare bitwise so NaN payloads compare equal to themselves.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TensorData::Float(lhs), TensorData::Float(rhs)) => {
                lhs.len() == rhs.len()
                    && lhs
                        .iter()
                        .zip(rhs.iter())
                        .all(|(l, r)| l.to_bits() == r.to_bits())
            }
            (TensorData::Int(lhs), TensorData::Int(rhs)) => lhs == rhs,
            (TensorData::Bool(lhs), TensorData::Bool(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

/// Dense, device-independent tensor payload used by samples and the reference interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    dtype: DType,
    shape: Shape,
    data: TensorData,
}

impl HostTensor {
    pub fn new(dtype: DType, shape: impl Into<Shape>, data: TensorData) -> Result<Self> {
        let shape = shape.into();
        ensure!(
            data.len() == shape.element_count(),
            "tensor data has {} elements but shape {} needs {}",
            data.len(),
            shape,
            shape.element_count()
        );
        let storage_ok = match &data {
            TensorData::Float(_) => dtype.is_float() || dtype.is_complex(),
            TensorData::Int(_) => dtype.is_integer(),
            TensorData::Bool(_) => dtype.is_bool(),
        };
        ensure!(storage_ok, "storage does not match dtype {dtype}");
        Ok(Self { dtype, shape, data })
    }

    /// Skips validation; callers construct `data` from `shape` directly.
    pub(crate) fn from_trusted(dtype: DType, shape: Shape, data: TensorData) -> Self {
        debug_assert_eq!(data.len(), shape.element_count());
        Self { dtype, shape, data }
    }

    /// Builds a tensor of any dtype from f64 values, rounding them the way a cast would.
    pub fn from_f64(dtype: DType, dims: impl Into<Shape>, values: Vec<f64>) -> Result<Self> {
        let data = if dtype.is_bool() {
            TensorData::Bool(values.iter().map(|&v| v != 0.0).collect())
        } else if dtype.is_integer() {
            TensorData::Int(values.iter().map(|&v| wrap_integer(dtype, v)).collect())
        } else {
            TensorData::Float(values.iter().map(|&v| round_float(dtype, v)).collect())
        };
        Self::new(dtype, dims, data)
    }

    pub fn scalar(dtype: DType, value: f64) -> Result<Self> {
        Self::from_f64(dtype, Shape::scalar(), vec![value])
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn spec(&self) -> TensorSpec {
        TensorSpec::new(self.dtype, self.shape.clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Every element widened to f64 (bools as 0/1).
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.data {
            TensorData::Float(values) => values.to_vec(),
            TensorData::Int(values) => values.iter().map(|&v| v as f64).collect(),
            TensorData::Bool(values) => values.iter().map(|&v| f64::from(u8::from(v))).collect(),
        }
    }

    pub fn to_i64_vec(&self) -> Vec<i64> {
        match &self.data {
            TensorData::Float(values) => values.iter().map(|&v| v as i64).collect(),
            TensorData::Int(values) => values.to_vec(),
            TensorData::Bool(values) => values.iter().map(|&v| i64::from(v)).collect(),
        }
    }
}

/// Rounds `value` to the nearest representable value of a floating dtype.
pub fn round_float(dtype: DType, value: f64) -> f64 {
    match dtype {
        DType::F32 | DType::Cf32 => f64::from(value as f32),
        DType::F16 => half::f16::from_f64(value).to_f64(),
        DType::Bf16 => half::bf16::from_f64(value).to_f64(),
        _ => value,
    }
}

/// Converts `value` into an integer dtype: truncation toward zero, then two's-complement wrap.
pub fn wrap_integer(dtype: DType, value: f64) -> i64 {
    let truncated = if value.is_finite() { value.trunc() as i64 } else { 0 };
    match dtype {
        DType::Si8 => i64::from(truncated as i8),
        DType::Ui8 => i64::from(truncated as u8),
        DType::Si16 => i64::from(truncated as i16),
        DType::Si32 => i64::from(truncated as i32),
        DType::Si4 => ((truncated << 60) >> 60),
        DType::Ui4 => truncated & 0xf,
        _ => truncated,
    }
}

/// Rounds or wraps `value` into any real dtype; bools map to 0/1.
pub fn convert_value(dtype: DType, value: f64) -> f64 {
    if dtype.is_bool() {
        if value != 0.0 {
            1.0
        } else {
            0.0
        }
    } else if dtype.is_integer() {
        wrap_integer(dtype, value) as f64
    } else {
        round_float(dtype, value)
    }
}
