use rand::rngs::StdRng;
use rand::Rng;

use crate::ir::{DType, Shape};

use super::tensor::{round_float, wrap_integer, HostTensor, TensorData};
use super::SampleContext;

/// Seeded random tensor factory with the reference framework's default value ranges.
pub struct TensorMaker {
    rng: StdRng,
    dtype: DType,
}

impl TensorMaker {
    pub fn new(ctx: &SampleContext) -> Self {
        Self {
            rng: ctx.rng(),
            dtype: ctx.dtype,
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Random tensor of the context dtype in the default range.
    pub fn make(&mut self, dims: &[usize]) -> HostTensor {
        let (low, high) = default_range(self.dtype);
        self.make_dtype(self.dtype, dims, low, high)
    }

    /// Random tensor of the context dtype with values in `[low, high)`.
    pub fn make_range(&mut self, dims: &[usize], low: f64, high: f64) -> HostTensor {
        self.make_dtype(self.dtype, dims, low, high)
    }

    /// Random int64 tensor in `[low, high)`.
    pub fn make_long(&mut self, dims: &[usize], low: i64, high: i64) -> HostTensor {
        self.make_dtype(DType::Si64, dims, low as f64, high as f64)
    }

    pub fn make_dtype(&mut self, dtype: DType, dims: &[usize], low: f64, high: f64) -> HostTensor {
        let shape = Shape::new(dims.to_vec());
        let count = shape.element_count();
        let data = if dtype.is_bool() {
            TensorData::Bool((0..count).map(|_| self.rng.gen::<bool>()).collect())
        } else if dtype.is_integer() {
            let (low, high) = (low.ceil() as i64, high.ceil() as i64);
            TensorData::Int(
                (0..count)
                    .map(|_| {
                        if high > low {
                            wrap_integer(dtype, self.rng.gen_range(low..high) as f64)
                        } else {
                            low
                        }
                    })
                    .collect(),
            )
        } else {
            TensorData::Float(
                (0..count)
                    .map(|_| {
                        let value = if high > low {
                            self.rng.gen_range(low..high)
                        } else {
                            low
                        };
                        round_float(dtype, value)
                    })
                    .collect(),
            )
        };
        HostTensor::from_trusted(dtype, shape, data)
    }
}

/// Default `[low, high)` used when a generator does not pick a range.
pub fn default_range(dtype: DType) -> (f64, f64) {
    if dtype.is_bool() {
        (0.0, 2.0)
    } else if dtype.is_unsigned_integer() {
        (0.0, 10.0)
    } else if dtype.is_integer() {
        (-9.0, 10.0)
    } else {
        (-9.0, 9.0)
    }
}

/// Builds a tensor from literal values, converting them into `dtype`.
pub fn literal_tensor(dtype: DType, dims: &[usize], values: &[f64]) -> HostTensor {
    let shape = Shape::new(dims.to_vec());
    debug_assert_eq!(shape.element_count(), values.len());
    let data = if dtype.is_bool() {
        TensorData::Bool(values.iter().map(|&v| v != 0.0).collect())
    } else if dtype.is_integer() {
        TensorData::Int(values.iter().map(|&v| wrap_integer(dtype, v)).collect())
    } else {
        TensorData::Float(values.iter().map(|&v| round_float(dtype, v)).collect())
    };
    HostTensor::from_trusted(dtype, shape, data)
}
