//! Mutable builder used by lowerings to stage primitive instructions.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, bail, ensure, Result};

use crate::ir::{
    ArgMaxSpec, AxesSpec, BroadcastToSpec, CastSpec, CompareSpec, ComparisonOp, ConcatSpec, DType,
    ElementwiseBinaryOp, ElementwiseUnaryOp, Function, Instruction, Literal, OneHotSpec, Operand,
    Operation, ReduceKind, ReduceSpec, ReshapeSpec, RngUniformSpec, Shape, SliceSpec,
    SoftmaxSpec, TensorLiteral, TensorSpec, TransposeSpec, ValueId,
};

/// Straight-line graph under construction.
///
/// Value ids are allocated densely in emission order, so two builders fed the
/// same sequence of calls produce identical functions.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    next_value_id: u32,
    parameters: Vec<(ValueId, TensorSpec)>,
    instructions: Vec<Instruction>,
    specs: HashMap<ValueId, TensorSpec>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a function parameter and returns its value id.
    pub fn parameter(&mut self, spec: TensorSpec) -> ValueId {
        let id = self.allocate_value();
        self.specs.insert(id, spec.clone());
        self.parameters.push((id, spec));
        id
    }

    pub fn spec(&self, value: ValueId) -> Result<&TensorSpec> {
        self.specs
            .get(&value)
            .ok_or_else(|| anyhow!("value {value} is not defined in this graph"))
    }

    pub fn dtype(&self, value: ValueId) -> Result<DType> {
        Ok(self.spec(value)?.dtype)
    }

    pub fn dims(&self, value: ValueId) -> Result<Vec<usize>> {
        Ok(self.spec(value)?.dims().to_vec())
    }

    pub fn rank(&self, value: ValueId) -> Result<usize> {
        Ok(self.spec(value)?.rank())
    }

    fn allocate_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value_id);
        self.next_value_id += 1;
        id
    }

    fn emit(&mut self, op: Operation, operands: Vec<Operand>, output: TensorSpec) -> ValueId {
        let id = self.allocate_value();
        self.specs.insert(id, output.clone());
        self.instructions.push(Instruction {
            id,
            op,
            operands,
            output,
        });
        id
    }

    pub fn constant(&mut self, literal: TensorLiteral) -> ValueId {
        let spec = literal.spec.clone();
        self.emit(Operation::Constant(literal), Vec::new(), spec)
    }

    /// Emits a rank-0 constant of `dtype`.
    pub fn constant_scalar(&mut self, dtype: DType, value: f64) -> Result<ValueId> {
        let literal = TensorLiteral::scalar(dtype, Literal::Float(value))?;
        Ok(self.constant(literal))
    }

    /// Emits a constant with the dtype of `like`, broadcast to its shape.
    pub fn scalar_like(&mut self, like: ValueId, value: f64) -> Result<ValueId> {
        let spec = self.spec(like)?.clone();
        let scalar = self.constant_scalar(spec.dtype, value)?;
        if spec.rank() == 0 {
            return Ok(scalar);
        }
        self.broadcast_to(scalar, spec.dims())
    }

    pub fn unary(&mut self, op: ElementwiseUnaryOp, value: ValueId) -> Result<ValueId> {
        let spec = self.spec(value)?.clone();
        if !matches!(op, ElementwiseUnaryOp::Neg | ElementwiseUnaryOp::Abs) {
            ensure!(
                spec.dtype.is_float(),
                "{op:?} requires a floating-point operand, got {}",
                spec.dtype
            );
        }
        ensure!(!spec.dtype.is_bool(), "{op:?} is not defined for bool");
        Ok(self.emit(
            Operation::ElementwiseUnary(op),
            vec![Operand::Value(value)],
            spec,
        ))
    }

    pub fn binary(
        &mut self,
        op: ElementwiseBinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    ) -> Result<ValueId> {
        let lhs_spec = self.spec(lhs)?.clone();
        let rhs_spec = self.spec(rhs)?;
        ensure!(
            lhs_spec.dtype == rhs_spec.dtype,
            "{op:?} dtype mismatch: {} vs {}",
            lhs_spec.dtype,
            rhs_spec.dtype
        );
        ensure!(
            lhs_spec.shape == rhs_spec.shape,
            "{op:?} shape mismatch: {} vs {}",
            lhs_spec.shape,
            rhs_spec.shape
        );
        Ok(self.emit(
            Operation::ElementwiseBinary(op),
            vec![Operand::Value(lhs), Operand::Value(rhs)],
            lhs_spec,
        ))
    }

    pub fn neg(&mut self, value: ValueId) -> Result<ValueId> {
        self.unary(ElementwiseUnaryOp::Neg, value)
    }

    pub fn abs(&mut self, value: ValueId) -> Result<ValueId> {
        self.unary(ElementwiseUnaryOp::Abs, value)
    }

    pub fn exp(&mut self, value: ValueId) -> Result<ValueId> {
        self.unary(ElementwiseUnaryOp::Exp, value)
    }

    pub fn log(&mut self, value: ValueId) -> Result<ValueId> {
        self.unary(ElementwiseUnaryOp::Log, value)
    }

    pub fn sqrt(&mut self, value: ValueId) -> Result<ValueId> {
        self.unary(ElementwiseUnaryOp::Sqrt, value)
    }

    pub fn rsqrt(&mut self, value: ValueId) -> Result<ValueId> {
        self.unary(ElementwiseUnaryOp::Rsqrt, value)
    }

    pub fn erf(&mut self, value: ValueId) -> Result<ValueId> {
        self.unary(ElementwiseUnaryOp::Erf, value)
    }

    pub fn add(&mut self, lhs: ValueId, rhs: ValueId) -> Result<ValueId> {
        self.binary(ElementwiseBinaryOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: ValueId, rhs: ValueId) -> Result<ValueId> {
        self.binary(ElementwiseBinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: ValueId, rhs: ValueId) -> Result<ValueId> {
        self.binary(ElementwiseBinaryOp::Mul, lhs, rhs)
    }

    pub fn div(&mut self, lhs: ValueId, rhs: ValueId) -> Result<ValueId> {
        self.binary(ElementwiseBinaryOp::Div, lhs, rhs)
    }

    pub fn pow(&mut self, lhs: ValueId, rhs: ValueId) -> Result<ValueId> {
        self.binary(ElementwiseBinaryOp::Pow, lhs, rhs)
    }

    pub fn is_nan(&mut self, value: ValueId) -> Result<ValueId> {
        let spec = self.spec(value)?.clone();
        ensure!(
            spec.dtype.is_float(),
            "is_nan requires a floating-point operand, got {}",
            spec.dtype
        );
        let result_spec = TensorSpec::new(DType::I1, spec.shape);
        Ok(self.emit(Operation::IsNan, vec![Operand::Value(value)], result_spec))
    }

    pub fn compare(&mut self, op: ComparisonOp, lhs: ValueId, rhs: ValueId) -> Result<ValueId> {
        let lhs_spec = self.spec(lhs)?.clone();
        let rhs_spec = self.spec(rhs)?;
        ensure!(lhs_spec.dtype == rhs_spec.dtype, "compare dtype mismatch");
        ensure!(lhs_spec.shape == rhs_spec.shape, "compare shape mismatch");
        let result_spec = TensorSpec::new(DType::I1, lhs_spec.shape);
        Ok(self.emit(
            Operation::Compare(CompareSpec { op }),
            vec![Operand::Value(lhs), Operand::Value(rhs)],
            result_spec,
        ))
    }

    pub fn select(
        &mut self,
        predicate: ValueId,
        on_true: ValueId,
        on_false: ValueId,
    ) -> Result<ValueId> {
        let pred_spec = self.spec(predicate)?.clone();
        ensure!(pred_spec.dtype == DType::I1, "select predicate must be bool");
        let true_spec = self.spec(on_true)?.clone();
        let false_spec = self.spec(on_false)?;
        ensure!(
            true_spec.dtype == false_spec.dtype,
            "select branch dtype mismatch"
        );
        ensure!(
            true_spec.shape == false_spec.shape && true_spec.shape == pred_spec.shape,
            "select operand shapes must match"
        );
        Ok(self.emit(
            Operation::Select,
            vec![
                Operand::Value(predicate),
                Operand::Value(on_true),
                Operand::Value(on_false),
            ],
            true_spec,
        ))
    }

    /// Converts `value` to `dtype`; returns `value` unchanged when it already has that dtype.
    pub fn cast(&mut self, value: ValueId, dtype: DType) -> Result<ValueId> {
        let spec = self.spec(value)?.clone();
        if spec.dtype == dtype {
            return Ok(value);
        }
        let result_spec = TensorSpec::new(dtype, spec.shape);
        Ok(self.emit(
            Operation::Cast(CastSpec { dtype }),
            vec![Operand::Value(value)],
            result_spec,
        ))
    }

    pub fn reshape(&mut self, value: ValueId, dims: &[usize]) -> Result<ValueId> {
        let spec = self.spec(value)?.clone();
        let new_shape = Shape::new(dims.to_vec());
        ensure!(
            spec.element_count() == new_shape.element_count(),
            "reshape from {} to {} changes the element count",
            spec.shape,
            new_shape
        );
        let result_spec = TensorSpec::new(spec.dtype, new_shape.clone());
        Ok(self.emit(
            Operation::Reshape(ReshapeSpec { new_shape }),
            vec![Operand::Value(value)],
            result_spec,
        ))
    }

    pub fn squeeze(&mut self, value: ValueId, axes: &[usize]) -> Result<ValueId> {
        let spec = self.spec(value)?.clone();
        let axes = sorted_unique_axes(axes, spec.rank(), "squeeze")?;
        for &axis in &axes {
            ensure!(
                spec.dims()[axis] == 1,
                "squeeze axis {axis} has extent {}",
                spec.dims()[axis]
            );
        }
        let dims = spec
            .dims()
            .iter()
            .enumerate()
            .filter(|(axis, _)| !axes.contains(axis))
            .map(|(_, &dim)| dim)
            .collect::<Vec<_>>();
        let result_spec = TensorSpec::new(spec.dtype, dims);
        Ok(self.emit(
            Operation::Squeeze(AxesSpec { axes }),
            vec![Operand::Value(value)],
            result_spec,
        ))
    }

    pub fn unsqueeze(&mut self, value: ValueId, axes: &[usize]) -> Result<ValueId> {
        let spec = self.spec(value)?.clone();
        let result_rank = spec.rank() + axes.len();
        let axes = sorted_unique_axes(axes, result_rank, "unsqueeze")?;
        let mut source = spec.dims().iter().copied();
        let mut dims = Vec::with_capacity(result_rank);
        for axis in 0..result_rank {
            if axes.contains(&axis) {
                dims.push(1);
            } else {
                dims.push(source.next().unwrap_or(1));
            }
        }
        let result_spec = TensorSpec::new(spec.dtype, dims);
        Ok(self.emit(
            Operation::Unsqueeze(AxesSpec { axes }),
            vec![Operand::Value(value)],
            result_spec,
        ))
    }

    pub fn transpose(&mut self, value: ValueId, perm: &[usize]) -> Result<ValueId> {
        let spec = self.spec(value)?.clone();
        ensure!(
            perm.len() == spec.rank(),
            "transpose permutation length must equal rank"
        );
        let mut seen = HashSet::new();
        let mut result_dims = Vec::with_capacity(perm.len());
        for &axis in perm {
            ensure!(axis < spec.rank(), "transpose axis out of range");
            ensure!(seen.insert(axis), "transpose permutation must be unique");
            result_dims.push(spec.dims()[axis]);
        }
        let result_spec = TensorSpec::new(spec.dtype, result_dims);
        Ok(self.emit(
            Operation::Transpose(TransposeSpec {
                perm: perm.to_vec(),
            }),
            vec![Operand::Value(value)],
            result_spec,
        ))
    }

    /// Numpy-style broadcast: operand dims are right-aligned and must equal the target or be 1.
    pub fn broadcast_to(&mut self, value: ValueId, dims: &[usize]) -> Result<ValueId> {
        let spec = self.spec(value)?.clone();
        ensure!(
            spec.rank() <= dims.len(),
            "broadcast_to cannot reduce rank {} to {}",
            spec.rank(),
            dims.len()
        );
        let offset = dims.len() - spec.rank();
        for (axis, &dim) in spec.dims().iter().enumerate() {
            let target = dims[offset + axis];
            ensure!(
                dim == target || dim == 1,
                "cannot broadcast {} to {}",
                spec.shape,
                Shape::new(dims.to_vec())
            );
        }
        if spec.dims() == dims {
            return Ok(value);
        }
        let result_shape = Shape::new(dims.to_vec());
        let result_spec = TensorSpec::new(spec.dtype, result_shape.clone());
        Ok(self.emit(
            Operation::BroadcastTo(BroadcastToSpec { result_shape }),
            vec![Operand::Value(value)],
            result_spec,
        ))
    }

    /// Broadcasts both operands to their common shape.
    pub fn broadcast_pair(&mut self, lhs: ValueId, rhs: ValueId) -> Result<(ValueId, ValueId)> {
        let lhs_dims = self.dims(lhs)?;
        let rhs_dims = self.dims(rhs)?;
        let target = broadcast_shapes(&lhs_dims, &rhs_dims)?;
        let lhs = self.broadcast_to(lhs, &target)?;
        let rhs = self.broadcast_to(rhs, &target)?;
        Ok((lhs, rhs))
    }

    pub fn slice(&mut self, value: ValueId, starts: &[usize], sizes: &[usize]) -> Result<ValueId> {
        let spec = self.spec(value)?.clone();
        ensure!(
            starts.len() == spec.rank() && sizes.len() == spec.rank(),
            "slice starts/sizes must match operand rank"
        );
        for axis in 0..spec.rank() {
            ensure!(
                starts[axis] + sizes[axis] <= spec.dims()[axis],
                "slice exceeds dimension {axis}"
            );
        }
        let result_spec = TensorSpec::new(spec.dtype, sizes.to_vec());
        Ok(self.emit(
            Operation::Slice(SliceSpec {
                starts: starts.to_vec(),
                sizes: sizes.to_vec(),
            }),
            vec![Operand::Value(value)],
            result_spec,
        ))
    }

    /// Slices `[start, start + size)` along one axis, keeping the other axes whole.
    pub fn slice_axis(
        &mut self,
        value: ValueId,
        axis: usize,
        start: usize,
        size: usize,
    ) -> Result<ValueId> {
        let dims = self.dims(value)?;
        ensure!(axis < dims.len(), "slice axis {axis} out of range");
        let mut starts = vec![0; dims.len()];
        let mut sizes = dims;
        starts[axis] = start;
        sizes[axis] = size;
        self.slice(value, &starts, &sizes)
    }

    pub fn concat(&mut self, values: &[ValueId], axis: usize) -> Result<ValueId> {
        ensure!(!values.is_empty(), "concat requires at least one operand");
        let first = self.spec(values[0])?.clone();
        ensure!(axis < first.rank(), "concat axis out of range");
        let mut result_dims = first.dims().to_vec();
        result_dims[axis] = 0;
        for &value in values {
            let spec = self.spec(value)?;
            ensure!(spec.dtype == first.dtype, "concat dtype mismatch");
            ensure!(spec.rank() == first.rank(), "concat rank mismatch");
            for (idx, (&lhs, &rhs)) in first.dims().iter().zip(spec.dims()).enumerate() {
                if idx != axis {
                    ensure!(lhs == rhs, "concat dimension mismatch at axis {idx}");
                }
            }
            result_dims[axis] += spec.dims()[axis];
        }
        if values.len() == 1 {
            return Ok(values[0]);
        }
        let result_spec = TensorSpec::new(first.dtype, result_dims);
        let operands = values.iter().map(|&value| Operand::Value(value)).collect();
        Ok(self.emit(Operation::Concat(ConcatSpec { axis }), operands, result_spec))
    }

    pub fn reduce(
        &mut self,
        kind: ReduceKind,
        value: ValueId,
        axes: &[usize],
        keepdims: bool,
    ) -> Result<ValueId> {
        let spec = self.spec(value)?.clone();
        let axes = sorted_unique_axes(axes, spec.rank(), "reduce")?;
        if kind == ReduceKind::Max {
            for &axis in &axes {
                ensure!(
                    spec.dims()[axis] > 0,
                    "reduce_max over empty axis {axis} has no identity"
                );
            }
        }
        let mut result_dims = Vec::with_capacity(spec.rank());
        for (axis, &dim) in spec.dims().iter().enumerate() {
            if axes.contains(&axis) {
                if keepdims {
                    result_dims.push(1);
                }
            } else {
                result_dims.push(dim);
            }
        }
        let result_spec = TensorSpec::new(spec.dtype, result_dims);
        Ok(self.emit(
            Operation::Reduce(ReduceSpec {
                kind,
                axes,
                keepdims,
            }),
            vec![Operand::Value(value)],
            result_spec,
        ))
    }

    pub fn reduce_sum(&mut self, value: ValueId, axes: &[usize], keepdims: bool) -> Result<ValueId> {
        self.reduce(ReduceKind::Sum, value, axes, keepdims)
    }

    pub fn argmax(&mut self, value: ValueId, axis: usize, keepdims: bool) -> Result<ValueId> {
        let spec = self.spec(value)?.clone();
        ensure!(axis < spec.rank(), "argmax axis out of range");
        ensure!(spec.dims()[axis] > 0, "argmax over empty axis {axis}");
        let mut result_dims = spec.dims().to_vec();
        if keepdims {
            result_dims[axis] = 1;
        } else {
            result_dims.remove(axis);
        }
        let result_spec = TensorSpec::new(DType::Si64, result_dims);
        Ok(self.emit(
            Operation::ArgMax(ArgMaxSpec {
                axis,
                keepdims,
                output_dtype: DType::Si64,
            }),
            vec![Operand::Value(value)],
            result_spec,
        ))
    }

    /// Expands integer `indices` into a one-hot tensor with a new axis of length `depth` at `axis`.
    pub fn one_hot(
        &mut self,
        indices: ValueId,
        depth: usize,
        axis: usize,
        dtype: DType,
        values: (f64, f64),
    ) -> Result<ValueId> {
        let spec = self.spec(indices)?.clone();
        ensure!(
            spec.dtype.is_integer(),
            "one_hot indices must be integers, got {}",
            spec.dtype
        );
        ensure!(axis <= spec.rank(), "one_hot axis out of range");
        let mut result_dims = spec.dims().to_vec();
        result_dims.insert(axis, depth);
        let (off, on) = values;
        let off_value = TensorLiteral::scalar(dtype, Literal::Float(off))?;
        let on_value = TensorLiteral::scalar(dtype, Literal::Float(on))?;
        let result_spec = TensorSpec::new(dtype, result_dims);
        Ok(self.emit(
            Operation::OneHot(OneHotSpec {
                depth,
                axis,
                off_value,
                on_value,
            }),
            vec![Operand::Value(indices)],
            result_spec,
        ))
    }

    /// Softmax along `axis`; the primitive requires rank >= 1.
    pub fn softmax(&mut self, value: ValueId, axis: usize) -> Result<ValueId> {
        let spec = self.softmax_operand(value, axis, "softmax")?;
        Ok(self.emit(
            Operation::Softmax(SoftmaxSpec { axis }),
            vec![Operand::Value(value)],
            spec,
        ))
    }

    /// Log-softmax along `axis`; the primitive requires rank >= 1.
    pub fn log_softmax(&mut self, value: ValueId, axis: usize) -> Result<ValueId> {
        let spec = self.softmax_operand(value, axis, "log_softmax")?;
        Ok(self.emit(
            Operation::LogSoftmax(SoftmaxSpec { axis }),
            vec![Operand::Value(value)],
            spec,
        ))
    }

    fn softmax_operand(&self, value: ValueId, axis: usize, op: &str) -> Result<TensorSpec> {
        let spec = self.spec(value)?.clone();
        ensure!(spec.rank() >= 1, "{op} requires rank >= 1, got a scalar");
        ensure!(axis < spec.rank(), "{op} axis {axis} out of range");
        ensure!(
            spec.dtype.is_float(),
            "{op} requires a floating-point operand, got {}",
            spec.dtype
        );
        Ok(spec)
    }

    pub fn rng_uniform(&mut self, dims: &[usize], dtype: DType) -> Result<ValueId> {
        ensure!(dtype.is_float(), "rng_uniform produces floating-point values");
        let shape = Shape::new(dims.to_vec());
        let result_spec = TensorSpec::new(dtype, shape.clone());
        Ok(self.emit(
            Operation::RngUniform(RngUniformSpec { shape, dtype }),
            Vec::new(),
            result_spec,
        ))
    }

    /// Seals the graph into a function returning `results` in order.
    pub fn finish(self, name: impl Into<String>, result_ids: Vec<ValueId>) -> Result<Function> {
        let mut results = Vec::with_capacity(result_ids.len());
        for id in &result_ids {
            let spec = self
                .specs
                .get(id)
                .ok_or_else(|| anyhow!("result value {id} has no recorded type"))?;
            results.push(spec.clone());
        }
        let (parameter_ids, parameters): (Vec<_>, Vec<_>) = self.parameters.into_iter().unzip();
        Ok(Function {
            name: name.into(),
            parameter_ids,
            parameters,
            body: self.instructions,
            result_ids,
            results,
        })
    }
}

fn sorted_unique_axes(axes: &[usize], rank: usize, op: &str) -> Result<Vec<usize>> {
    let mut sorted = axes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    ensure!(sorted.len() == axes.len(), "{op} axes must be unique");
    if let Some(&axis) = sorted.last() {
        ensure!(axis < rank, "{op} axis {axis} out of range for rank {rank}");
    }
    Ok(sorted)
}

/// Computes the numpy-style broadcast of two shapes.
pub fn broadcast_shapes(lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    let mut dims = vec![0; rank];
    for axis in 0..rank {
        let l = axis
            .checked_sub(rank - lhs.len())
            .map(|idx| lhs[idx])
            .unwrap_or(1);
        let r = axis
            .checked_sub(rank - rhs.len())
            .map(|idx| rhs[idx])
            .unwrap_or(1);
        dims[axis] = match (l, r) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            _ => bail!(
                "shapes {} and {} are not broadcast compatible",
                Shape::new(lhs.to_vec()),
                Shape::new(rhs.to_vec())
            ),
        };
    }
    Ok(dims)
}

/// Wraps a possibly negative axis into `0..rank`.
pub fn normalize_axis(axis: i64, rank: usize) -> Result<usize> {
    let rank_i = rank as i64;
    let wrapped = if axis < 0 { axis + rank_i } else { axis };
    ensure!(
        (0..rank_i).contains(&wrapped),
        "axis {axis} out of range for rank {rank}"
    );
    Ok(wrapped as usize)
}
