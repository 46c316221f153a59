use std::{fmt, sync::Arc};

use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};

/// Enumerates scalar element types understood by the primitive instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum DType {
    I1,
    Si4,
    Ui4,
    Si8,
    Ui8,
    Si16,
    Si32,
    Si64,
    Fp8E4M3,
    Fp8E5M2,
    Bf16,
    F16,
    F32,
    F64,
    Cf32,
    Cf64,
}

impl DType {
    pub const ALL: [DType; 16] = [
        DType::I1,
        DType::Si4,
        DType::Ui4,
        DType::Si8,
        DType::Ui8,
        DType::Si16,
        DType::Si32,
        DType::Si64,
        DType::Fp8E4M3,
        DType::Fp8E5M2,
        DType::Bf16,
        DType::F16,
        DType::F32,
        DType::F64,
        DType::Cf32,
        DType::Cf64,
    ];

    /// Returns `true` for signed or unsigned integers, including the 4-bit quantized types.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DType::Si4 | DType::Ui4 | DType::Si8 | DType::Ui8 | DType::Si16 | DType::Si32 | DType::Si64
        )
    }

    pub fn is_unsigned_integer(self) -> bool {
        matches!(self, DType::Ui4 | DType::Ui8)
    }

    /// Returns `true` when the dtype is a real floating-point representation.
    pub fn is_float(self) -> bool {
        matches!(
            self,
            DType::Fp8E4M3 | DType::Fp8E5M2 | DType::Bf16 | DType::F16 | DType::F32 | DType::F64
        )
    }

    pub fn is_complex(self) -> bool {
        matches!(self, DType::Cf32 | DType::Cf64)
    }

    pub fn is_bool(self) -> bool {
        self == DType::I1
    }

    /// Returns the storage size in bytes when it is a whole number of bytes.
    pub fn size_in_bytes(self) -> Option<usize> {
        match self {
            DType::I1 | DType::Si8 | DType::Ui8 => Some(1),
            DType::Si16 | DType::Bf16 | DType::F16 => Some(2),
            DType::Si32 | DType::F32 => Some(4),
            DType::Si64 | DType::F64 | DType::Cf32 => Some(8),
            DType::Cf64 => Some(16),
            DType::Si4 | DType::Ui4 | DType::Fp8E4M3 | DType::Fp8E5M2 => None,
        }
    }

    /// Lower-case name used by the high-level dialect (`float32`, `int64`, ...).
    pub fn name(self) -> &'static str {
        match self {
            DType::I1 => "bool",
            DType::Si4 => "int4",
            DType::Ui4 => "uint4",
            DType::Si8 => "int8",
            DType::Ui8 => "uint8",
            DType::Si16 => "int16",
            DType::Si32 => "int32",
            DType::Si64 => "int64",
            DType::Fp8E4M3 => "float8_e4m3fn",
            DType::Fp8E5M2 => "float8_e5m2",
            DType::Bf16 => "bfloat16",
            DType::F16 => "float16",
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::Cf32 => "complex64",
            DType::Cf64 => "complex128",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static tensor shape as an ordered list of extents. Rank 0 is a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.contains(&0)
    }

    /// Row-major strides in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        for axis in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.dims[axis + 1];
        }
        strides
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dims.is_empty() {
            return f.write_str("[]");
        }
        let dims = self
            .dims
            .iter()
            .map(|dim| dim.to_string())
            .collect::<Vec<_>>()
            .join("x");
        f.write_str(&dims)
    }
}

/// Tensor metadata coupling dtype and shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorSpec {
    pub fn new(dtype: DType, shape: impl Into<Shape>) -> Self {
        Self {
            dtype,
            shape: shape.into(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn element_count(&self) -> usize {
        self.shape.element_count()
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor<{} x {}>", self.dtype, self.shape)
    }
}

/// Scalar literal used for constants and attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    I1(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl Literal {
    pub fn as_f64(self) -> f64 {
        match self {
            Literal::I1(value) => f64::from(u8::from(value)),
            Literal::Signed(value) => value as f64,
            Literal::Unsigned(value) => value as f64,
            Literal::Float(value) => value,
        }
    }
}

/// Dense literal tensor payload stored little-endian in the dtype's native width.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorLiteral {
    pub spec: TensorSpec,
    pub bytes: Arc<[u8]>,
}

impl TensorLiteral {
    pub fn new(spec: TensorSpec, bytes: Arc<[u8]>) -> Self {
        Self { spec, bytes }
    }

    /// Encodes a rank-0 literal of `dtype`, converting `value` the way a cast would.
    pub fn scalar(dtype: DType, value: Literal) -> Result<Self> {
        Self::splat(TensorSpec::new(dtype, Shape::scalar()), value)
    }

    /// Encodes a literal where every element equals `value`.
    pub fn splat(spec: TensorSpec, value: Literal) -> Result<Self> {
        let element = encode_element(spec.dtype, value)?;
        let count = spec.element_count();
        let mut bytes = Vec::with_capacity(element.len() * count);
        for _ in 0..count {
            bytes.extend_from_slice(&element);
        }
        Ok(Self::new(spec, Arc::from(bytes)))
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Decodes every element back into a [`Literal`].
    pub fn values(&self) -> Result<Vec<Literal>> {
        let dtype = self.spec.dtype;
        let width = match dtype.size_in_bytes() {
            Some(width) => width,
            None => bail!("literal dtype {dtype} has no byte encoding"),
        };
        ensure!(
            self.bytes.len() == width * self.spec.element_count(),
            "literal payload length {} does not match {}",
            self.bytes.len(),
            self.spec
        );
        self.bytes
            .chunks_exact(width)
            .map(|chunk| decode_element(dtype, chunk))
            .collect()
    }
}

fn encode_element(dtype: DType, value: Literal) -> Result<Vec<u8>> {
    let bytes = match dtype {
        DType::I1 => vec![u8::from(value.as_f64() != 0.0)],
        DType::Si8 => (integral(value) as i8).to_le_bytes().to_vec(),
        DType::Ui8 => (integral(value) as u8).to_le_bytes().to_vec(),
        DType::Si16 => (integral(value) as i16).to_le_bytes().to_vec(),
        DType::Si32 => (integral(value) as i32).to_le_bytes().to_vec(),
        DType::Si64 => integral(value).to_le_bytes().to_vec(),
        DType::F16 => half::f16::from_f64(value.as_f64()).to_le_bytes().to_vec(),
        DType::Bf16 => half::bf16::from_f64(value.as_f64()).to_le_bytes().to_vec(),
        DType::F32 => (value.as_f64() as f32).to_le_bytes().to_vec(),
        DType::F64 => value.as_f64().to_le_bytes().to_vec(),
        other => bail!("cannot encode literal of dtype {other}"),
    };
    Ok(bytes)
}

fn integral(value: Literal) -> i64 {
    match value {
        Literal::I1(flag) => i64::from(flag),
        Literal::Signed(value) => value,
        Literal::Unsigned(value) => value as i64,
        Literal::Float(value) => value.trunc() as i64,
    }
}

fn decode_element(dtype: DType, chunk: &[u8]) -> Result<Literal> {
    let literal = match dtype {
        DType::I1 => Literal::I1(chunk[0] != 0),
        DType::Si8 => Literal::Signed(i64::from(i8::from_le_bytes([chunk[0]]))),
        DType::Ui8 => Literal::Unsigned(u64::from(chunk[0])),
        DType::Si16 => Literal::Signed(i64::from(i16::from_le_bytes([chunk[0], chunk[1]]))),
        DType::Si32 => Literal::Signed(i64::from(i32::from_le_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3],
        ]))),
        DType::Si64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            Literal::Signed(i64::from_le_bytes(raw))
        }
        DType::F16 => Literal::Float(half::f16::from_le_bytes([chunk[0], chunk[1]]).to_f64()),
        DType::Bf16 => Literal::Float(half::bf16::from_le_bytes([chunk[0], chunk[1]]).to_f64()),
        DType::F32 => Literal::Float(f64::from(f32::from_le_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3],
        ]))),
        DType::F64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            Literal::Float(f64::from_le_bytes(raw))
        }
        other => bail!("cannot decode literal of dtype {other}"),
    };
    Ok(literal)
}

/// Comparator used by the `compare` op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementwiseUnaryOp {
    Neg,
    Abs,
    Exp,
    Log,
    Sqrt,
    Rsqrt,
    Erf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementwiseBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Maximum,
    Minimum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceKind {
    Sum,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReduceSpec {
    pub kind: ReduceKind,
    pub axes: Vec<usize>,
    pub keepdims: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArgMaxSpec {
    pub axis: usize,
    pub keepdims: bool,
    pub output_dtype: DType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompareSpec {
    pub op: ComparisonOp,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CastSpec {
    pub dtype: DType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReshapeSpec {
    pub new_shape: Shape,
}

/// Axes removed by `squeeze` or inserted by `unsqueeze`, sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AxesSpec {
    pub axes: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransposeSpec {
    pub perm: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BroadcastToSpec {
    pub result_shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SliceSpec {
    pub starts: Vec<usize>,
    pub sizes: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcatSpec {
    pub axis: usize,
}

/// Attribute payload for `one_hot`: `on`/`off` are encoded in the output dtype.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OneHotSpec {
    pub depth: usize,
    pub axis: usize,
    pub off_value: TensorLiteral,
    pub on_value: TensorLiteral,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoftmaxSpec {
    pub axis: usize,
}

/// Uniform samples in `[0, 1)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RngUniformSpec {
    pub shape: Shape,
    pub dtype: DType,
}

/// Unique identifier for SSA values in a lowered function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Operand reference in an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Value(ValueId),
    Literal(TensorLiteral),
}

/// Closed vocabulary of primitive operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    Constant(TensorLiteral),
    ElementwiseUnary(ElementwiseUnaryOp),
    ElementwiseBinary(ElementwiseBinaryOp),
    IsNan,
    Compare(CompareSpec),
    Select,
    Cast(CastSpec),
    Reshape(ReshapeSpec),
    Squeeze(AxesSpec),
    Unsqueeze(AxesSpec),
    Transpose(TransposeSpec),
    BroadcastTo(BroadcastToSpec),
    Slice(SliceSpec),
    Concat(ConcatSpec),
    Reduce(ReduceSpec),
    ArgMax(ArgMaxSpec),
    OneHot(OneHotSpec),
    Softmax(SoftmaxSpec),
    LogSoftmax(SoftmaxSpec),
    RngUniform(RngUniformSpec),
}

impl Operation {
    /// Short mnemonic used by the text form.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Operation::Constant(_) => "constant",
            Operation::ElementwiseUnary(op) => match op {
                ElementwiseUnaryOp::Neg => "neg",
                ElementwiseUnaryOp::Abs => "abs",
                ElementwiseUnaryOp::Exp => "exp",
                ElementwiseUnaryOp::Log => "log",
                ElementwiseUnaryOp::Sqrt => "sqrt",
                ElementwiseUnaryOp::Rsqrt => "rsqrt",
                ElementwiseUnaryOp::Erf => "erf",
            },
            Operation::ElementwiseBinary(op) => match op {
                ElementwiseBinaryOp::Add => "add",
                ElementwiseBinaryOp::Sub => "sub",
                ElementwiseBinaryOp::Mul => "mul",
                ElementwiseBinaryOp::Div => "div",
                ElementwiseBinaryOp::Pow => "pow",
                ElementwiseBinaryOp::Maximum => "maximum",
                ElementwiseBinaryOp::Minimum => "minimum",
            },
            Operation::IsNan => "is_nan",
            Operation::Compare(_) => "compare",
            Operation::Select => "select",
            Operation::Cast(_) => "cast",
            Operation::Reshape(_) => "reshape",
            Operation::Squeeze(_) => "squeeze",
            Operation::Unsqueeze(_) => "unsqueeze",
            Operation::Transpose(_) => "transpose",
            Operation::BroadcastTo(_) => "broadcast_to",
            Operation::Slice(_) => "slice",
            Operation::Concat(_) => "concat",
            Operation::Reduce(spec) => match spec.kind {
                ReduceKind::Sum => "reduce_sum",
                ReduceKind::Max => "reduce_max",
            },
            Operation::ArgMax(_) => "argmax",
            Operation::OneHot(_) => "one_hot",
            Operation::Softmax(_) => "softmax",
            Operation::LogSoftmax(_) => "log_softmax",
            Operation::RngUniform(_) => "rng_uniform",
        }
    }
}

/// Single SSA instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub id: ValueId,
    pub op: Operation,
    pub operands: Vec<Operand>,
    pub output: TensorSpec,
}

/// Lowered subgraph: parameters, straight-line body and results.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Function {
    pub name: String,
    pub parameter_ids: Vec<ValueId>,
    pub parameters: Vec<TensorSpec>,
    pub body: Vec<Instruction>,
    pub result_ids: Vec<ValueId>,
    pub results: Vec<TensorSpec>,
}

impl Function {
    /// Counts instructions matching `predicate`.
    pub fn count_ops(&self, predicate: impl Fn(&Operation) -> bool) -> usize {
        self.body.iter().filter(|inst| predicate(&inst.op)).count()
    }
}
