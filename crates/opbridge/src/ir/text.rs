//! Human-readable text form of lowered functions, used in logs and test failure output.

use std::fmt;

use super::types::{Function, Instruction, Operand, Operation};

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_line(f, 0, &format!("func @{} {{", self.name))?;
        if !self.parameter_ids.is_empty() {
            write_line(f, 1, "params:")?;
            for (value_id, spec) in self.parameter_ids.iter().zip(self.parameters.iter()) {
                write_line(f, 2, &format!("{value_id} : {spec}"))?;
            }
        }
        if !self.body.is_empty() {
            write_line(f, 1, "body:")?;
            for instruction in &self.body {
                fmt_instruction(instruction, 2, f)?;
            }
        }
        if !self.result_ids.is_empty() {
            write_line(f, 1, "results:")?;
            for (value_id, spec) in self.result_ids.iter().zip(self.results.iter()) {
                write_line(f, 2, &format!("{value_id} : {spec}"))?;
            }
        }
        write_line(f, 0, "}")
    }
}

fn fmt_instruction(
    instruction: &Instruction,
    indent: usize,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let operands = instruction
        .operands
        .iter()
        .map(format_operand)
        .collect::<Vec<_>>()
        .join(", ");
    let attrs = format_attrs(&instruction.op);
    let line = format!(
        "{} = {}{}({}) -> {}",
        instruction.id,
        instruction.op.mnemonic(),
        attrs,
        operands,
        instruction.output
    );
    write_line(f, indent, &line)
}

fn format_attrs(op: &Operation) -> String {
    match op {
        Operation::Constant(lit) => match lit.values() {
            Ok(values) if values.len() == 1 => format!("[{:?}]", values[0]),
            _ => format!("[{} bytes]", lit.byte_len()),
        },
        Operation::Compare(spec) => format!("[{:?}]", spec.op),
        Operation::Cast(spec) => format!("[{}]", spec.dtype),
        Operation::Reshape(spec) => format!("[{}]", spec.new_shape),
        Operation::Squeeze(spec) | Operation::Unsqueeze(spec) => format!("[axes={:?}]", spec.axes),
        Operation::Transpose(spec) => format!("[perm={:?}]", spec.perm),
        Operation::BroadcastTo(spec) => format!("[{}]", spec.result_shape),
        Operation::Slice(spec) => format!("[starts={:?}, sizes={:?}]", spec.starts, spec.sizes),
        Operation::Concat(spec) => format!("[axis={}]", spec.axis),
        Operation::Reduce(spec) => format!("[axes={:?}, keepdims={}]", spec.axes, spec.keepdims),
        Operation::ArgMax(spec) => format!("[axis={}, keepdims={}]", spec.axis, spec.keepdims),
        Operation::OneHot(spec) => format!("[depth={}, axis={}]", spec.depth, spec.axis),
        Operation::Softmax(spec) | Operation::LogSoftmax(spec) => format!("[axis={}]", spec.axis),
        Operation::RngUniform(spec) => format!("[{}]", spec.shape),
        Operation::ElementwiseUnary(_)
        | Operation::ElementwiseBinary(_)
        | Operation::IsNan
        | Operation::Select => String::new(),
    }
}

fn format_operand(operand: &Operand) -> String {
    match operand {
        Operand::Value(id) => id.to_string(),
        Operand::Literal(lit) => format!("literal({})", lit.spec),
    }
}

fn write_line(f: &mut fmt::Formatter<'_>, indent: usize, line: &str) -> fmt::Result {
    for _ in 0..indent {
        f.write_str("  ")?;
    }
    writeln!(f, "{line}")
}
