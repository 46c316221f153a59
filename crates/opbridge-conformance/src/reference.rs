//! Reference semantics for every lowered operator, evaluated directly on host tensors.
//!
//! Results are computed in `f64` and rounded once into the output dtype.
//! Argument lookup follows the lowering convention: position first (the
//! sample's primary payload is position 0), then keyword, with an explicit
//! `None` counting as absent.

use opbridge::graph::{broadcast_shapes, normalize_axis};
use opbridge::ir::DType;
use opbridge::samples::{convert_value, HostTensor, SampleArg, SampleInput};
use opbridge::OperatorIdentity;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    /// The sample is outside what the host reference can evaluate.
    #[error("no host reference: {0}")]
    Unsupported(String),
    /// The sample does not fit the operator's signature; the lowering must reject it too.
    #[error("invalid sample: {0}")]
    Invalid(String),
}

pub type ReferenceResult<T> = Result<T, ReferenceError>;

fn invalid(message: impl Into<String>) -> ReferenceError {
    ReferenceError::Invalid(message.into())
}

/// Evaluates `identity` on `sample`, returning one tensor per operator output.
pub fn evaluate(identity: &OperatorIdentity, sample: &SampleInput) -> ReferenceResult<Vec<HostTensor>> {
    if let Some(tensor) = sample.tensors().into_iter().find(|t| t.dtype().is_complex()) {
        return Err(ReferenceError::Unsupported(format!(
            "{} payloads",
            tensor.dtype()
        )));
    }
    let args = Args { sample };
    match identity.to_string().as_str() {
        "aten::erf" | "aten::special_erf" => unary(&args, libm::erf),
        "aten::erfc" | "aten::special_erfc" => unary(&args, libm::erfc),
        "aten::special_erfcx" => unary(&args, |x| (x * x).exp() * libm::erfc(x)),
        "aten::xlogy" | "aten::special_xlogy" => xlogy(&args),
        "aten::log_softmax" | "aten::special_log_softmax" => log_softmax(&args),
        "aten::_softmax" => softmax(&args),
        "aten::layer_norm" => layer_norm(&args),
        "aten::native_group_norm" => native_group_norm(&args),
        "aten::native_dropout" => native_dropout(&args),
        "aten::bernoulli.p" => bernoulli(&args),
        "aten::_local_scalar_dense" => local_scalar_dense(&args),
        "aten::tensor.bool" | "aten::tensor.float" | "aten::tensor.int" => scalar_tensor(&args),
        "aten::unfold" => unfold(&args),
        "aten::slice_scatter" => slice_scatter(&args),
        "onnxfn::ReduceSumSquare" => reduce_composite(&args, |x| x * x, |s| s),
        "onnxfn::ReduceL1" => reduce_composite(&args, f64::abs, |s| s),
        "onnxfn::ReduceL2" => reduce_composite(&args, |x| x * x, f64::sqrt),
        "onnxfn::ReduceLogSum" => reduce_composite(&args, |x| x, f64::ln),
        "onnxfn::ReduceLogSumExp" => reduce_composite(&args, f64::exp, f64::ln),
        "onnxfn::Hardmax" => hardmax(&args),
        "onnxfn::DepthToSpace" => depth_to_space(&args),
        "onnxfn::SpaceToDepth" => space_to_depth(&args),
        other => Err(ReferenceError::Unsupported(format!(
            "no reference semantics for {other}"
        ))),
    }
}

struct Args<'a> {
    sample: &'a SampleInput,
}

impl<'a> Args<'a> {
    fn param(&self, index: usize, name: &str) -> Option<&'a SampleArg> {
        let positional = match index {
            0 => Some(&self.sample.input),
            _ => self.sample.args.get(index - 1),
        };
        positional
            .or_else(|| self.sample.kwargs.get(name))
            .filter(|arg| !matches!(arg, SampleArg::None))
    }

    fn opt_tensor(&self, index: usize, name: &str) -> ReferenceResult<Option<&'a HostTensor>> {
        match self.param(index, name) {
            None => Ok(None),
            Some(SampleArg::Tensor(tensor)) => Ok(Some(tensor)),
            Some(_) => Err(invalid(format!("'{name}' must be a tensor"))),
        }
    }

    fn tensor(&self, index: usize, name: &str) -> ReferenceResult<&'a HostTensor> {
        self.opt_tensor(index, name)?
            .ok_or_else(|| invalid(format!("missing '{name}'")))
    }

    fn opt_int(&self, index: usize, name: &str) -> ReferenceResult<Option<i64>> {
        match self.param(index, name) {
            None => Ok(None),
            Some(SampleArg::Int(value)) => Ok(Some(*value)),
            Some(SampleArg::Bool(value)) => Ok(Some(i64::from(*value))),
            Some(SampleArg::Ints(values)) if values.len() == 1 => Ok(Some(values[0])),
            Some(_) => Err(invalid(format!("'{name}' must be an int"))),
        }
    }

    fn int(&self, index: usize, name: &str) -> ReferenceResult<i64> {
        self.opt_int(index, name)?
            .ok_or_else(|| invalid(format!("missing '{name}'")))
    }

    fn int_or(&self, index: usize, name: &str, default: i64) -> ReferenceResult<i64> {
        Ok(self.opt_int(index, name)?.unwrap_or(default))
    }

    fn extent(&self, index: usize, name: &str) -> ReferenceResult<usize> {
        let value = self.int(index, name)?;
        usize::try_from(value).map_err(|_| invalid(format!("'{name}' must be non-negative")))
    }

    fn opt_float(&self, index: usize, name: &str) -> ReferenceResult<Option<f64>> {
        match self.param(index, name) {
            None => Ok(None),
            Some(SampleArg::Float(value)) => Ok(Some(*value)),
            Some(SampleArg::Int(value)) => Ok(Some(*value as f64)),
            Some(_) => Err(invalid(format!("'{name}' must be a float"))),
        }
    }

    fn float(&self, index: usize, name: &str) -> ReferenceResult<f64> {
        self.opt_float(index, name)?
            .ok_or_else(|| invalid(format!("missing '{name}'")))
    }

    fn bool_or(&self, index: usize, name: &str, default: bool) -> ReferenceResult<bool> {
        match self.param(index, name) {
            None => Ok(default),
            Some(SampleArg::Bool(value)) => Ok(*value),
            Some(SampleArg::Int(value)) => Ok(*value != 0),
            Some(_) => Err(invalid(format!("'{name}' must be a bool"))),
        }
    }

    fn opt_ints(&self, index: usize, name: &str) -> ReferenceResult<Option<Vec<i64>>> {
        match self.param(index, name) {
            None => Ok(None),
            Some(SampleArg::Ints(values)) => Ok(Some(values.clone())),
            Some(SampleArg::Int(value)) => Ok(Some(vec![*value])),
            Some(_) => Err(invalid(format!("'{name}' must be an int list"))),
        }
    }

    fn opt_str(&self, index: usize, name: &str) -> ReferenceResult<Option<&'a str>> {
        match self.param(index, name) {
            None => Ok(None),
            Some(SampleArg::Str(value)) => Ok(Some(value.as_str())),
            Some(_) => Err(invalid(format!("'{name}' must be a string"))),
        }
    }

    fn opt_dtype(&self, index: usize, name: &str) -> ReferenceResult<Option<DType>> {
        match self.param(index, name) {
            None => Ok(None),
            Some(SampleArg::DType(dtype)) => Ok(Some(*dtype)),
            Some(_) => Err(invalid(format!("'{name}' must be a dtype"))),
        }
    }
}

fn build(dtype: DType, dims: Vec<usize>, values: Vec<f64>) -> ReferenceResult<HostTensor> {
    HostTensor::from_f64(dtype, dims, values).map_err(|err| invalid(format!("{err:#}")))
}

fn wrap_axis(axis: i64, rank: usize) -> ReferenceResult<usize> {
    normalize_axis(axis, rank).map_err(|err| invalid(format!("{err:#}")))
}

fn require_float(tensor: &HostTensor) -> ReferenceResult<DType> {
    let dtype = tensor.dtype();
    if dtype.is_float() {
        Ok(dtype)
    } else {
        Err(invalid(format!("expected a floating-point input, got {dtype}")))
    }
}

fn strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for axis in (0..dims.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }
    strides
}

fn unravel(mut index: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    for (axis, dim) in dims.iter().enumerate().rev() {
        coords[axis] = index % dim;
        index /= dim;
    }
    coords
}

fn unary(args: &Args, f: fn(f64) -> f64) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "self")?;
    let values = x.to_f64_vec().into_iter().map(f).collect();
    Ok(vec![build(x.dtype(), x.dims().to_vec(), values)?])
}

/// Flat index into an operand of `dims` for a coordinate of the broadcast result.
fn broadcast_source(coord: &[usize], dims: &[usize]) -> usize {
    let offset = coord.len() - dims.len();
    let strides = strides(dims);
    dims.iter()
        .enumerate()
        .map(|(axis, &dim)| if dim == 1 { 0 } else { coord[offset + axis] * strides[axis] })
        .sum()
}

fn xlogy(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let a = args.tensor(0, "self")?;
    let dtype = a.dtype();
    let (b_dims, b_values) = match args.param(1, "other") {
        Some(SampleArg::Tensor(tensor)) => (tensor.dims().to_vec(), tensor.to_f64_vec()),
        Some(SampleArg::Float(value)) => (Vec::new(), vec![*value]),
        Some(SampleArg::Int(value)) => (Vec::new(), vec![*value as f64]),
        Some(SampleArg::Bool(value)) => (Vec::new(), vec![f64::from(u8::from(*value))]),
        _ => return Err(invalid("'other' must be a tensor or a number")),
    };
    let b_values = b_values
        .into_iter()
        .map(|v| convert_value(dtype, v))
        .collect::<Vec<_>>();
    let dims = broadcast_shapes(a.dims(), &b_dims).map_err(|err| invalid(format!("{err:#}")))?;
    let a_values = a.to_f64_vec();
    let count = dims.iter().product::<usize>();
    let values = (0..count)
        .map(|idx| {
            let coord = unravel(idx, &dims);
            let x = a_values[broadcast_source(&coord, a.dims())];
            let y = b_values[broadcast_source(&coord, &b_dims)];
            if y.is_nan() {
                f64::NAN
            } else if x == 0.0 {
                x
            } else {
                x * y.ln()
            }
        })
        .collect();
    Ok(vec![build(dtype, dims, values)?])
}

/// Numerically stable (log-)softmax of `values` along `axis` of `dims`.
fn softmax_along(values: &[f64], dims: &[usize], axis: usize, log: bool) -> Vec<f64> {
    let outer = dims[..axis].iter().product::<usize>();
    let len = dims[axis];
    let inner = dims[axis + 1..].iter().product::<usize>();
    let mut out = vec![0.0; values.len()];
    for o in 0..outer {
        for i in 0..inner {
            let at = |k: usize| (o * len + k) * inner + i;
            let max = (0..len).map(|k| values[at(k)]).fold(f64::NEG_INFINITY, |m, v| {
                if m.is_nan() || v.is_nan() {
                    f64::NAN
                } else {
                    m.max(v)
                }
            });
            let sum = (0..len).map(|k| (values[at(k)] - max).exp()).sum::<f64>();
            for k in 0..len {
                let shifted = values[at(k)] - max;
                out[at(k)] = if log {
                    shifted - sum.ln()
                } else {
                    shifted.exp() / sum
                };
            }
        }
    }
    out
}

/// Rank-0 inputs are viewed as rank 1 for the axis lookup.
fn softmax_axis(dims: &[usize], dim: i64) -> ReferenceResult<(Vec<usize>, usize)> {
    if dims.is_empty() {
        wrap_axis(dim, 1)?;
        Ok((vec![1], 0))
    } else {
        Ok((dims.to_vec(), wrap_axis(dim, dims.len())?))
    }
}

fn log_softmax(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "self")?;
    let dim = args.int(1, "dim")?;
    let dtype = args.opt_dtype(2, "dtype")?.unwrap_or(x.dtype());
    if !dtype.is_float() {
        return Err(invalid(format!("log_softmax needs a floating dtype, got {dtype}")));
    }
    let (view, axis) = softmax_axis(x.dims(), dim)?;
    let values = x
        .to_f64_vec()
        .into_iter()
        .map(|v| convert_value(dtype, v))
        .collect::<Vec<_>>();
    let out = softmax_along(&values, &view, axis, true);
    Ok(vec![build(dtype, x.dims().to_vec(), out)?])
}

fn softmax(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "self")?;
    let dim = args.int(1, "dim")?;
    let half_to_float = args.bool_or(2, "half_to_float", false)?;
    let (view, axis) = softmax_axis(x.dims(), dim)?;
    let out = softmax_along(&x.to_f64_vec(), &view, axis, false)
        .into_iter()
        .map(|v| convert_value(x.dtype(), v))
        .collect();
    let dtype = if half_to_float { DType::F32 } else { x.dtype() };
    Ok(vec![build(dtype, x.dims().to_vec(), out)?])
}

/// Mean and `1 / sqrt(biased_var + eps)` of each contiguous group of `size` values.
fn group_statistics(values: &[f64], size: usize, eps: f64) -> Vec<(f64, f64)> {
    if size == 0 {
        return Vec::new();
    }
    values
        .chunks(size)
        .map(|group| {
            let count = size as f64;
            let mean = group.iter().sum::<f64>() / count;
            let var = group.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
            (mean, 1.0 / (var + eps).sqrt())
        })
        .collect()
}

fn layer_norm(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "input")?;
    let dtype = require_float(x)?;
    let normalized_shape = args
        .opt_ints(1, "normalized_shape")?
        .ok_or_else(|| invalid("missing 'normalized_shape'"))?;
    let weight = args.opt_tensor(2, "weight")?;
    let bias = args.opt_tensor(3, "bias")?;
    let eps = args.opt_float(4, "eps")?.unwrap_or(1e-5);

    let dims = x.dims();
    let k = normalized_shape.len();
    if k == 0 || k > dims.len() {
        return Err(invalid("normalized_shape does not fit the input rank"));
    }
    let lead = dims.len() - k;
    if dims[lead..]
        .iter()
        .zip(&normalized_shape)
        .any(|(&d, &n)| d as i64 != n)
    {
        return Err(invalid("normalized_shape does not match the trailing dims"));
    }
    let size = dims[lead..].iter().product::<usize>();
    let values = x.to_f64_vec();
    let stats = group_statistics(&values, size, eps);
    let weight = weight.map(HostTensor::to_f64_vec);
    let bias = bias.map(HostTensor::to_f64_vec);
    let out = values
        .iter()
        .enumerate()
        .map(|(idx, &v)| {
            let (mean, rstd) = stats[idx / size];
            let inner = idx % size;
            let mut y = (v - mean) * rstd;
            if let Some(weight) = &weight {
                y *= weight[inner];
            }
            if let Some(bias) = &bias {
                y += bias[inner];
            }
            y
        })
        .collect();
    Ok(vec![build(dtype, dims.to_vec(), out)?])
}

fn native_group_norm(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "input")?;
    let dtype = require_float(x)?;
    let weight = args.opt_tensor(1, "weight")?.map(HostTensor::to_f64_vec);
    let bias = args.opt_tensor(2, "bias")?.map(HostTensor::to_f64_vec);
    let n = args.extent(3, "N")?;
    let c = args.extent(4, "C")?;
    let hxw = args.extent(5, "HxW")?;
    let group = args.extent(6, "group")?;
    let eps = args.opt_float(7, "eps")?.unwrap_or(1e-5);

    let dims = x.dims();
    if group == 0 || c % group != 0 {
        return Err(invalid(format!("C={c} is not divisible into {group} groups")));
    }
    if dims.len() < 2 || dims[0] != n || dims[1] != c || dims[2..].iter().product::<usize>() != hxw
    {
        return Err(invalid("input dims do not match N, C and HxW"));
    }
    let per_group = c / group * hxw;
    let values = x.to_f64_vec();
    let stats = group_statistics(&values, per_group, eps);
    let out = values
        .iter()
        .enumerate()
        .map(|(idx, &v)| {
            let (mean, rstd) = stats[idx / per_group];
            let channel = idx / hxw.max(1) % c;
            let mut y = (v - mean) * rstd;
            if let Some(weight) = &weight {
                y *= weight[channel];
            }
            if let Some(bias) = &bias {
                y += bias[channel];
            }
            y
        })
        .collect();
    let (means, rstds): (Vec<f64>, Vec<f64>) = stats.into_iter().unzip();
    Ok(vec![
        build(dtype, dims.to_vec(), out)?,
        build(dtype, vec![n, group], means)?,
        build(dtype, vec![n, group], rstds)?,
    ])
}

fn native_dropout(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "input")?;
    let p = args.float(1, "p")?;
    let train = args.bool_or(2, "train", true)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(invalid(format!("dropout probability must be in [0, 1], got {p}")));
    }
    let dims = x.dims().to_vec();
    let count = x.len();
    if !train || p == 0.0 {
        return Ok(vec![x.clone(), build(DType::I1, dims, vec![1.0; count])?]);
    }
    let dtype = require_float(x)?;
    if p == 1.0 {
        return Ok(vec![
            build(dtype, dims.clone(), vec![0.0; count])?,
            build(DType::I1, dims, vec![0.0; count])?,
        ]);
    }
    Err(ReferenceError::Unsupported(format!(
        "dropout with p = {p} depends on the random mask"
    )))
}

/// For `0 < p < 1` the values are a placeholder; such descriptors are compared
/// on shape and dtype only.
fn bernoulli(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "self")?;
    let p = args.float(1, "p")?;
    if !(0.0..=1.0).contains(&p) {
        return Err(invalid(format!("bernoulli probability must be in [0, 1], got {p}")));
    }
    let fill = if p == 1.0 { 1.0 } else { 0.0 };
    Ok(vec![build(x.dtype(), x.dims().to_vec(), vec![fill; x.len()])?])
}

fn local_scalar_dense(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "self")?;
    let first = x
        .to_f64_vec()
        .first()
        .copied()
        .ok_or_else(|| invalid("cannot read a scalar out of an empty tensor"))?;
    Ok(vec![build(x.dtype(), Vec::new(), vec![first])?])
}

fn scalar_tensor(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let (value, inferred) = match args.param(0, "t") {
        Some(SampleArg::Bool(flag)) => (f64::from(u8::from(*flag)), DType::I1),
        Some(SampleArg::Float(value)) => (*value, DType::F32),
        Some(SampleArg::Int(value)) => (*value as f64, DType::Si64),
        _ => return Err(invalid("'t' must be a bool, float or int scalar")),
    };
    let dtype = args.opt_dtype(1, "dtype")?.unwrap_or(inferred);
    Ok(vec![build(dtype, Vec::new(), vec![value])?])
}

fn unfold(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "self")?;
    let dimension = args.int(1, "dimension")?;
    let size = args.extent(2, "size")?;
    let step = args.extent(3, "step")?;
    if step == 0 {
        return Err(invalid("'step' must be positive"));
    }
    let scalar = x.dims().is_empty();
    let (dims, axis) = if scalar {
        wrap_axis(dimension, 1)?;
        (vec![1], 0)
    } else {
        (x.dims().to_vec(), wrap_axis(dimension, x.dims().len())?)
    };
    if size > dims[axis] {
        return Err(invalid(format!(
            "window size {size} exceeds extent {}",
            dims[axis]
        )));
    }
    let windows = (dims[axis] - size) / step + 1;
    let mut out_dims = dims.clone();
    out_dims[axis] = windows;
    out_dims.push(size);

    let values = x.to_f64_vec();
    let in_strides = strides(&dims);
    let count = out_dims.iter().product::<usize>();
    let out = (0..count)
        .map(|idx| {
            let coord = unravel(idx, &out_dims);
            let (window, within) = (coord[axis], coord[dims.len()]);
            let source = (0..dims.len())
                .map(|d| {
                    let c = if d == axis { window * step + within } else { coord[d] };
                    c * in_strides[d]
                })
                .sum::<usize>();
            values[source]
        })
        .collect();
    if scalar {
        out_dims.remove(0);
    }
    Ok(vec![build(x.dtype(), out_dims, out)?])
}

fn clamp_index(value: i64, extent: usize) -> usize {
    let extent = extent as i64;
    let wrapped = if value < 0 { value + extent } else { value };
    wrapped.clamp(0, extent) as usize
}

fn slice_scatter(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "self")?;
    let src = args.tensor(1, "src")?;
    let dims = x.dims();
    if dims.is_empty() {
        return Err(invalid("slice_scatter needs an input of rank >= 1"));
    }
    let axis = wrap_axis(args.int_or(2, "dim", 0)?, dims.len())?;
    let extent = dims[axis];
    let start = clamp_index(args.opt_int(3, "start")?.unwrap_or(0), extent);
    let end = args
        .opt_int(4, "end")?
        .map_or(extent, |end| clamp_index(end, extent))
        .max(start);
    let step = usize::try_from(args.int_or(5, "step", 1)?)
        .map_err(|_| invalid("'step' must be non-negative"))?;
    if step == 0 {
        return Err(invalid("'step' must be positive"));
    }
    let mut expected = dims.to_vec();
    expected[axis] = (end - start).div_ceil(step);
    if src.dims() != expected.as_slice() {
        return Err(invalid(format!(
            "src dims {:?} do not match the slice dims {expected:?}",
            src.dims()
        )));
    }

    let values = x.to_f64_vec();
    let src_values = src.to_f64_vec();
    let src_strides = strides(&expected);
    let out = values
        .iter()
        .enumerate()
        .map(|(idx, &v)| {
            let mut coord = unravel(idx, dims);
            let position = coord[axis];
            if position >= start && position < end && (position - start) % step == 0 {
                coord[axis] = (position - start) / step;
                let source = coord
                    .iter()
                    .zip(&src_strides)
                    .map(|(c, s)| c * s)
                    .sum::<usize>();
                convert_value(x.dtype(), src_values[source])
            } else {
                v
            }
        })
        .collect();
    Ok(vec![build(x.dtype(), dims.to_vec(), out)?])
}

fn reduce_composite(
    args: &Args,
    pre: fn(f64) -> f64,
    post: fn(f64) -> f64,
) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "data")?;
    let axes = args.opt_ints(1, "axes")?.filter(|axes| !axes.is_empty());
    let keepdims = args.int_or(2, "keepdims", 1)? != 0;
    let dims = x.dims();
    let mut axes = match axes {
        None => (0..dims.len()).collect::<Vec<_>>(),
        Some(axes) => axes
            .into_iter()
            .map(|axis| wrap_axis(axis, dims.len()))
            .collect::<ReferenceResult<Vec<_>>>()?,
    };
    axes.sort_unstable();
    axes.dedup();

    let kept = dims
        .iter()
        .enumerate()
        .map(|(axis, &d)| if axes.contains(&axis) { 1 } else { d })
        .collect::<Vec<_>>();
    let kept_strides = strides(&kept);
    let mut sums = vec![0.0; kept.iter().product()];
    for (idx, v) in x.to_f64_vec().into_iter().enumerate() {
        let coord = unravel(idx, dims);
        let target = coord
            .iter()
            .zip(&kept)
            .zip(&kept_strides)
            .map(|((&c, &d), &s)| if d == 1 { 0 } else { c * s })
            .sum::<usize>();
        sums[target] += pre(v);
    }
    let out_dims = if keepdims {
        kept
    } else {
        dims.iter()
            .enumerate()
            .filter(|(axis, _)| !axes.contains(axis))
            .map(|(_, &d)| d)
            .collect()
    };
    let out = sums.into_iter().map(post).collect();
    Ok(vec![build(x.dtype(), out_dims, out)?])
}

fn hardmax(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "input")?;
    let dims = x.dims();
    if dims.is_empty() {
        return Err(invalid("Hardmax needs an input of rank >= 1"));
    }
    let axis = wrap_axis(args.int_or(1, "axis", -1)?, dims.len())?;
    let outer = dims[..axis].iter().product::<usize>();
    let len = dims[axis];
    let inner = dims[axis + 1..].iter().product::<usize>();
    let values = x.to_f64_vec();
    let mut out = vec![0.0; values.len()];
    for o in 0..outer {
        for i in 0..inner {
            let at = |k: usize| (o * len + k) * inner + i;
            let mut best = 0;
            for k in 1..len {
                let (candidate, current) = (values[at(k)], values[at(best)]);
                if !current.is_nan() && (candidate.is_nan() || candidate > current) {
                    best = k;
                }
            }
            if len > 0 {
                out[at(best)] = 1.0;
            }
        }
    }
    Ok(vec![build(x.dtype(), dims.to_vec(), out)?])
}

fn nchw(x: &HostTensor) -> ReferenceResult<[usize; 4]> {
    match *x.dims() {
        [b, c, h, w] => Ok([b, c, h, w]),
        _ => Err(invalid(format!(
            "expected a rank-4 NCHW input, got dims {:?}",
            x.dims()
        ))),
    }
}

fn blocksize(args: &Args) -> ReferenceResult<usize> {
    match args.extent(1, "blocksize")? {
        0 => Err(invalid("'blocksize' must be positive")),
        size => Ok(size),
    }
}

fn depth_to_space(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "input")?;
    let [b, c, h, w] = nchw(x)?;
    let s = blocksize(args)?;
    if c % (s * s) != 0 {
        return Err(invalid("channel count is not divisible by blocksize²"));
    }
    let depth = c / (s * s);
    let crd = match args.opt_str(2, "mode")?.unwrap_or("DCR") {
        "DCR" => false,
        "CRD" => true,
        other => return Err(invalid(format!("unknown DepthToSpace mode '{other}'"))),
    };
    let values = x.to_f64_vec();
    let in_strides = strides(&[b, c, h, w]);
    let out_dims = vec![b, depth, h * s, w * s];
    let count = out_dims.iter().product::<usize>();
    let out = (0..count)
        .map(|idx| {
            let coord = unravel(idx, &out_dims);
            let (n, ch, y, x_pos) = (coord[0], coord[1], coord[2], coord[3]);
            let (i, j) = (y % s, x_pos % s);
            let source_channel = if crd {
                ch * s * s + i * s + j
            } else {
                (i * s + j) * depth + ch
            };
            values[n * in_strides[0]
                + source_channel * in_strides[1]
                + (y / s) * in_strides[2]
                + (x_pos / s) * in_strides[3]]
        })
        .collect();
    Ok(vec![build(x.dtype(), out_dims, out)?])
}

fn space_to_depth(args: &Args) -> ReferenceResult<Vec<HostTensor>> {
    let x = args.tensor(0, "input")?;
    let [b, c, h, w] = nchw(x)?;
    let s = blocksize(args)?;
    if h % s != 0 || w % s != 0 {
        return Err(invalid("spatial dims are not divisible by blocksize"));
    }
    let values = x.to_f64_vec();
    let in_strides = strides(&[b, c, h, w]);
    let out_dims = vec![b, c * s * s, h / s, w / s];
    let count = out_dims.iter().product::<usize>();
    let out = (0..count)
        .map(|idx| {
            let coord = unravel(idx, &out_dims);
            let (n, out_channel, y, x_pos) = (coord[0], coord[1], coord[2], coord[3]);
            let (block, ch) = (out_channel / c, out_channel % c);
            let (i, j) = (block / s, block % s);
            values[n * in_strides[0]
                + ch * in_strides[1]
                + (y * s + i) * in_strides[2]
                + (x_pos * s + j) * in_strides[3]]
        })
        .collect();
    Ok(vec![build(x.dtype(), out_dims, out)?])
}
