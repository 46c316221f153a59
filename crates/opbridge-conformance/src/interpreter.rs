//! Host interpreter for lowered functions.
//!
//! Every value is held as `f64` and rounded to the producing instruction's
//! output dtype immediately, so reduced-precision graphs see one rounding per
//! primitive the way a device kernel chain would. Complex and 8-bit float
//! dtypes are rejected up front.

use std::collections::HashMap;

use anyhow::{anyhow, bail, ensure, Result};
use opbridge::ir::{
    ArgMaxSpec, ComparisonOp, ConcatSpec, DType, ElementwiseBinaryOp, ElementwiseUnaryOp,
    Function, Instruction, OneHotSpec, Operand, Operation, ReduceKind, ReduceSpec,
    RngUniformSpec, SliceSpec, TensorLiteral, TensorSpec, TransposeSpec, ValueId,
};
use opbridge::samples::{convert_value, round_float, HostTensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("function `{function}` takes {expected} inputs, got {actual}")]
    Arity {
        function: String,
        expected: usize,
        actual: usize,
    },
    #[error("input {index} of `{function}` is {actual}, expected {expected}")]
    InputMismatch {
        function: String,
        index: usize,
        expected: TensorSpec,
        actual: TensorSpec,
    },
    #[error("dtype {dtype} is not supported by the host interpreter ({context})")]
    UnsupportedDType { dtype: DType, context: String },
    #[error("{message} (at function `{function}` instruction #{index}, {mnemonic} {id})")]
    Instruction {
        function: String,
        index: usize,
        mnemonic: &'static str,
        id: ValueId,
        message: String,
    },
    #[error("function `{function}` result {id} is unavailable: {message}")]
    Result {
        function: String,
        id: ValueId,
        message: String,
    },
}

pub fn is_supported(dtype: DType) -> bool {
    !(dtype.is_complex() || matches!(dtype, DType::Fp8E4M3 | DType::Fp8E5M2))
}

#[derive(Debug, Clone)]
struct Buffer {
    spec: TensorSpec,
    values: Vec<f64>,
}

impl Buffer {
    fn dims(&self) -> &[usize] {
        self.spec.dims()
    }
}

/// Evaluates `function` on `inputs` (in parameter order).
///
/// `seed` drives `rng_uniform`; draws are taken in instruction order, so equal
/// seeds replay equal results.
pub fn evaluate(
    function: &Function,
    inputs: &[HostTensor],
    seed: u64,
) -> Result<Vec<HostTensor>, InterpretError> {
    if function.parameter_ids.len() != inputs.len() {
        return Err(InterpretError::Arity {
            function: function.name.clone(),
            expected: function.parameter_ids.len(),
            actual: inputs.len(),
        });
    }

    let mut values: HashMap<ValueId, Buffer> = HashMap::new();
    for (index, ((id, expected), input)) in function
        .parameter_ids
        .iter()
        .zip(&function.parameters)
        .zip(inputs)
        .enumerate()
    {
        let actual = input.spec();
        if &actual != expected {
            return Err(InterpretError::InputMismatch {
                function: function.name.clone(),
                index,
                expected: expected.clone(),
                actual,
            });
        }
        if !is_supported(actual.dtype) {
            return Err(InterpretError::UnsupportedDType {
                dtype: actual.dtype,
                context: format!("parameter {index}"),
            });
        }
        values.insert(
            *id,
            Buffer {
                spec: actual,
                values: input.to_f64_vec(),
            },
        );
    }

    let mut rng = StdRng::seed_from_u64(seed);
    for (index, instruction) in function.body.iter().enumerate() {
        let dtype = instruction.output.dtype;
        if !is_supported(dtype) {
            return Err(InterpretError::UnsupportedDType {
                dtype,
                context: format!("instruction #{index} {}", instruction.op.mnemonic()),
            });
        }
        let augment = |message: String| InterpretError::Instruction {
            function: function.name.clone(),
            index,
            mnemonic: instruction.op.mnemonic(),
            id: instruction.id,
            message,
        };
        let operands = gather_operands(instruction, &values).map_err(|err| augment(format!("{err:#}")))?;
        let raw = execute_operation(instruction, &operands, &mut rng)
            .map_err(|err| augment(format!("{err:#}")))?;
        if raw.len() != instruction.output.element_count() {
            return Err(augment(format!(
                "produced {} elements for {}",
                raw.len(),
                instruction.output
            )));
        }
        let rounded = raw.into_iter().map(|v| convert_value(dtype, v)).collect();
        trace!(index, op = instruction.op.mnemonic(), id = %instruction.id, "evaluated");
        values.insert(
            instruction.id,
            Buffer {
                spec: instruction.output.clone(),
                values: rounded,
            },
        );
    }

    function
        .result_ids
        .iter()
        .map(|id| {
            let buffer = values.get(id).ok_or_else(|| InterpretError::Result {
                function: function.name.clone(),
                id: *id,
                message: "value was never produced".to_string(),
            })?;
            HostTensor::from_f64(
                buffer.spec.dtype,
                buffer.spec.shape.clone(),
                buffer.values.clone(),
            )
            .map_err(|err| InterpretError::Result {
                function: function.name.clone(),
                id: *id,
                message: format!("{err:#}"),
            })
        })
        .collect()
}

fn gather_operands(
    instruction: &Instruction,
    values: &HashMap<ValueId, Buffer>,
) -> Result<Vec<Buffer>> {
    instruction
        .operands
        .iter()
        .map(|operand| match operand {
            Operand::Value(id) => values
                .get(id)
                .cloned()
                .ok_or_else(|| anyhow!("operand {id} is not defined")),
            Operand::Literal(literal) => literal_buffer(literal),
        })
        .collect()
}

fn literal_buffer(literal: &TensorLiteral) -> Result<Buffer> {
    Ok(Buffer {
        spec: literal.spec.clone(),
        values: literal.values()?.into_iter().map(|v| v.as_f64()).collect(),
    })
}

fn execute_operation(
    instruction: &Instruction,
    inputs: &[Buffer],
    rng: &mut StdRng,
) -> Result<Vec<f64>> {
    let output = &instruction.output;
    match &instruction.op {
        Operation::Constant(literal) => Ok(literal_buffer(literal)?.values),
        Operation::ElementwiseUnary(op) => op_elementwise_unary(inputs, *op),
        Operation::ElementwiseBinary(op) => op_elementwise_binary(inputs, *op),
        Operation::IsNan => {
            let input = expect_single(inputs)?;
            Ok(input.values.iter().map(|v| flag(v.is_nan())).collect())
        }
        Operation::Compare(spec) => op_compare(inputs, spec.op),
        Operation::Select => op_select(inputs),
        Operation::Cast(_)
        | Operation::Reshape(_)
        | Operation::Squeeze(_)
        | Operation::Unsqueeze(_) => Ok(expect_single(inputs)?.values.clone()),
        Operation::Transpose(spec) => op_transpose(inputs, output, spec),
        Operation::BroadcastTo(_) => op_broadcast_to(inputs, output),
        Operation::Slice(spec) => op_slice(inputs, output, spec),
        Operation::Concat(spec) => op_concat(inputs, output, spec),
        Operation::Reduce(spec) => op_reduce(inputs, output, spec),
        Operation::ArgMax(spec) => op_argmax(inputs, spec),
        Operation::OneHot(spec) => op_one_hot(inputs, output, spec),
        Operation::Softmax(spec) => op_softmax(inputs, spec.axis, false),
        Operation::LogSoftmax(spec) => op_softmax(inputs, spec.axis, true),
        Operation::RngUniform(spec) => Ok(op_rng_uniform(spec, rng)),
    }
}

fn flag(value: bool) -> f64 {
    f64::from(u8::from(value))
}

fn expect_single(inputs: &[Buffer]) -> Result<&Buffer> {
    match inputs {
        [input] => Ok(input),
        _ => bail!("expected one operand, got {}", inputs.len()),
    }
}

fn expect_pair(inputs: &[Buffer]) -> Result<(&Buffer, &Buffer)> {
    match inputs {
        [lhs, rhs] => {
            ensure!(
                lhs.values.len() == rhs.values.len(),
                "operand lengths differ: {} vs {}",
                lhs.values.len(),
                rhs.values.len()
            );
            Ok((lhs, rhs))
        }
        _ => bail!("expected two operands, got {}", inputs.len()),
    }
}

fn op_elementwise_unary(inputs: &[Buffer], op: ElementwiseUnaryOp) -> Result<Vec<f64>> {
    let input = expect_single(inputs)?;
    let f: fn(f64) -> f64 = match op {
        ElementwiseUnaryOp::Neg => |v| -v,
        ElementwiseUnaryOp::Abs => f64::abs,
        ElementwiseUnaryOp::Exp => f64::exp,
        ElementwiseUnaryOp::Log => f64::ln,
        ElementwiseUnaryOp::Sqrt => f64::sqrt,
        ElementwiseUnaryOp::Rsqrt => |v| 1.0 / v.sqrt(),
        ElementwiseUnaryOp::Erf => libm::erf,
    };
    Ok(input.values.iter().map(|&v| f(v)).collect())
}

fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

fn op_elementwise_binary(inputs: &[Buffer], op: ElementwiseBinaryOp) -> Result<Vec<f64>> {
    let (lhs, rhs) = expect_pair(inputs)?;
    let f: fn(f64, f64) -> f64 = match op {
        ElementwiseBinaryOp::Add => |a, b| a + b,
        ElementwiseBinaryOp::Sub => |a, b| a - b,
        ElementwiseBinaryOp::Mul => |a, b| a * b,
        ElementwiseBinaryOp::Div => |a, b| a / b,
        ElementwiseBinaryOp::Pow => f64::powf,
        ElementwiseBinaryOp::Maximum => nan_max,
        ElementwiseBinaryOp::Minimum => nan_min,
    };
    Ok(lhs
        .values
        .iter()
        .zip(&rhs.values)
        .map(|(&a, &b)| f(a, b))
        .collect())
}

fn op_compare(inputs: &[Buffer], op: ComparisonOp) -> Result<Vec<f64>> {
    let (lhs, rhs) = expect_pair(inputs)?;
    Ok(lhs
        .values
        .iter()
        .zip(&rhs.values)
        .map(|(&a, &b)| {
            flag(match op {
                ComparisonOp::Less => a < b,
                ComparisonOp::LessEqual => a <= b,
                ComparisonOp::Equal => a == b,
                ComparisonOp::GreaterEqual => a >= b,
                ComparisonOp::Greater => a > b,
                ComparisonOp::NotEqual => a != b,
            })
        })
        .collect())
}

fn op_select(inputs: &[Buffer]) -> Result<Vec<f64>> {
    let [predicate, on_true, on_false] = inputs else {
        bail!("select expects three operands, got {}", inputs.len());
    };
    ensure!(
        predicate.values.len() == on_true.values.len()
            && on_true.values.len() == on_false.values.len(),
        "select operand lengths differ"
    );
    Ok(predicate
        .values
        .iter()
        .zip(on_true.values.iter().zip(&on_false.values))
        .map(|(&p, (&t, &f))| if p != 0.0 { t } else { f })
        .collect())
}

fn op_transpose(inputs: &[Buffer], output: &TensorSpec, spec: &TransposeSpec) -> Result<Vec<f64>> {
    let input = expect_single(inputs)?;
    ensure!(
        spec.perm.len() == input.dims().len(),
        "transpose rank mismatch"
    );
    let out_dims = output.dims();
    let input_strides = compute_strides(input.dims());
    let mut result = Vec::with_capacity(output.element_count());
    for idx in 0..output.element_count() {
        let out_coord = unravel_index(idx, out_dims);
        let in_index = out_coord
            .iter()
            .enumerate()
            .map(|(out_axis, &c)| c * input_strides[spec.perm[out_axis]])
            .sum::<usize>();
        result.push(input.values[in_index]);
    }
    Ok(result)
}

fn op_broadcast_to(inputs: &[Buffer], output: &TensorSpec) -> Result<Vec<f64>> {
    let input = expect_single(inputs)?;
    let input_dims = input.dims();
    let out_dims = output.dims();
    ensure!(
        out_dims.len() >= input_dims.len(),
        "broadcast_to result rank must be >= operand rank"
    );
    let rank_diff = out_dims.len() - input_dims.len();
    let input_strides = compute_strides(input_dims);
    let mut result = Vec::with_capacity(output.element_count());
    for idx in 0..output.element_count() {
        let out_coord = unravel_index(idx, out_dims);
        let mut in_index = 0usize;
        for (axis, &dim) in input_dims.iter().enumerate() {
            let coord = if dim == 1 { 0 } else { out_coord[rank_diff + axis] };
            in_index += coord * input_strides[axis];
        }
        result.push(input.values[in_index]);
    }
    Ok(result)
}

fn op_slice(inputs: &[Buffer], output: &TensorSpec, spec: &SliceSpec) -> Result<Vec<f64>> {
    let input = expect_single(inputs)?;
    ensure!(
        spec.starts.len() == input.dims().len(),
        "slice rank mismatch"
    );
    let input_strides = compute_strides(input.dims());
    let mut result = Vec::with_capacity(output.element_count());
    for idx in 0..output.element_count() {
        let out_coord = unravel_index(idx, &spec.sizes);
        let in_index = out_coord
            .iter()
            .zip(&spec.starts)
            .zip(&input_strides)
            .map(|((&c, &start), &stride)| (c + start) * stride)
            .sum::<usize>();
        result.push(input.values[in_index]);
    }
    Ok(result)
}

fn op_concat(inputs: &[Buffer], output: &TensorSpec, spec: &ConcatSpec) -> Result<Vec<f64>> {
    ensure!(!inputs.is_empty(), "concat expects at least one input");
    let out_dims = output.dims();
    let axis = spec.axis;
    ensure!(axis < out_dims.len(), "concat axis out of range");
    let axis_inner = out_dims[axis + 1..].iter().product::<usize>();
    let outer = out_dims[..axis].iter().product::<usize>();

    let mut result = Vec::with_capacity(output.element_count());
    for outer_idx in 0..outer {
        for input in inputs {
            let chunk = input.dims()[axis] * axis_inner;
            let start = outer_idx * chunk;
            result.extend_from_slice(&input.values[start..start + chunk]);
        }
    }
    Ok(result)
}

fn op_reduce(inputs: &[Buffer], output: &TensorSpec, spec: &ReduceSpec) -> Result<Vec<f64>> {
    let input = expect_single(inputs)?;
    let dims = input.dims();
    // Reduced axes collapse to extent 1 here; the output spec decides whether they are kept.
    let kept_dims = dims
        .iter()
        .enumerate()
        .map(|(axis, &d)| if spec.axes.contains(&axis) { 1 } else { d })
        .collect::<Vec<_>>();
    let kept_strides = compute_strides(&kept_dims);
    let identity = match spec.kind {
        ReduceKind::Sum => 0.0,
        ReduceKind::Max => f64::NEG_INFINITY,
    };
    let mut result = vec![identity; output.element_count()];
    for (idx, &value) in input.values.iter().enumerate() {
        let coord = unravel_index(idx, dims);
        let out_index = coord
            .iter()
            .enumerate()
            .filter(|(axis, _)| !spec.axes.contains(axis))
            .map(|(axis, &c)| c * kept_strides[axis])
            .sum::<usize>();
        let slot = &mut result[out_index];
        *slot = match spec.kind {
            ReduceKind::Sum => *slot + value,
            ReduceKind::Max => nan_max(*slot, value),
        };
    }
    Ok(result)
}

/// Outer, axis and inner extents of `dims` split at `axis`.
fn split_at_axis(dims: &[usize], axis: usize) -> Result<(usize, usize, usize)> {
    ensure!(axis < dims.len(), "axis {axis} out of range for rank {}", dims.len());
    Ok((
        dims[..axis].iter().product(),
        dims[axis],
        dims[axis + 1..].iter().product(),
    ))
}

fn op_argmax(inputs: &[Buffer], spec: &ArgMaxSpec) -> Result<Vec<f64>> {
    let input = expect_single(inputs)?;
    let (outer, axis_len, inner) = split_at_axis(input.dims(), spec.axis)?;
    ensure!(axis_len > 0, "argmax over an empty axis");
    let mut result = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            let at = |a: usize| input.values[(o * axis_len + a) * inner + i];
            let mut best = 0usize;
            for a in 1..axis_len {
                let (candidate, current) = (at(a), at(best));
                // NaN ranks above every number; the first maximum wins ties.
                if !current.is_nan() && (candidate.is_nan() || candidate > current) {
                    best = a;
                }
            }
            result.push(best as f64);
        }
    }
    Ok(result)
}

fn op_one_hot(inputs: &[Buffer], output: &TensorSpec, spec: &OneHotSpec) -> Result<Vec<f64>> {
    let indices = expect_single(inputs)?;
    let scalar = |literal: &TensorLiteral| -> Result<f64> {
        literal
            .values()?
            .first()
            .map(|v| v.as_f64())
            .ok_or_else(|| anyhow!("one_hot value literal is empty"))
    };
    let off = scalar(&spec.off_value)?;
    let on = scalar(&spec.on_value)?;
    let depth = spec.depth as i64;
    let out_dims = output.dims();
    let index_strides = compute_strides(indices.dims());
    let mut result = Vec::with_capacity(output.element_count());
    for idx in 0..output.element_count() {
        let coord = unravel_index(idx, out_dims);
        let class = coord[spec.axis] as i64;
        let source = coord
            .iter()
            .enumerate()
            .filter(|(axis, _)| *axis != spec.axis)
            .map(|(_, &c)| c)
            .zip(&index_strides)
            .map(|(c, &stride)| c * stride)
            .sum::<usize>();
        let raw = indices.values[source] as i64;
        let wrapped = if raw < 0 { raw + depth } else { raw };
        result.push(if wrapped == class { on } else { off });
    }
    Ok(result)
}

fn op_softmax(inputs: &[Buffer], axis: usize, log: bool) -> Result<Vec<f64>> {
    let input = expect_single(inputs)?;
    let (outer, axis_len, inner) = split_at_axis(input.dims(), axis)?;
    let mut result = vec![0.0; input.values.len()];
    for o in 0..outer {
        for i in 0..inner {
            let index = |a: usize| (o * axis_len + a) * inner + i;
            let max = (0..axis_len)
                .map(|a| input.values[index(a)])
                .fold(f64::NEG_INFINITY, nan_max);
            let sum = (0..axis_len)
                .map(|a| (input.values[index(a)] - max).exp())
                .sum::<f64>();
            for a in 0..axis_len {
                let shifted = input.values[index(a)] - max;
                result[index(a)] = if log {
                    shifted - sum.ln()
                } else {
                    shifted.exp() / sum
                };
            }
        }
    }
    Ok(result)
}

/// Draws in `[0, 1)` after rounding to the result dtype.
fn op_rng_uniform(spec: &RngUniformSpec, rng: &mut StdRng) -> Vec<f64> {
    (0..spec.shape.element_count())
        .map(|_| loop {
            let value = round_float(spec.dtype, rng.gen::<f64>());
            if value < 1.0 {
                break value;
            }
        })
        .collect()
}

fn compute_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; dims.len()];
    let mut acc = 1usize;
    for (i, dim) in dims.iter().enumerate().rev() {
        strides[i] = acc;
        acc *= *dim;
    }
    strides
}

fn unravel_index(mut index: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    for (i, dim) in dims.iter().enumerate().rev() {
        coords[i] = index % *dim;
        index /= *dim;
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::{compute_strides, unravel_index};

    #[test]
    fn strides_are_row_major() {
        assert_eq!(compute_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(compute_strides(&[]), Vec::<usize>::new());
    }

    #[test]
    fn unravel_inverts_strides() {
        assert_eq!(unravel_index(17, &[2, 3, 4]), vec![1, 1, 1]);
        assert_eq!(unravel_index(0, &[]), Vec::<usize>::new());
    }
}
