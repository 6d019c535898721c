use super::chunk::{Chunk, OpCode};
use super::value::format_number;
use std::convert::TryFrom;

/// Renders every instruction in `chunk` as `offset  line  OP_NAME operand`.
/// A pure read side-channel over `Chunk` — it never influences execution,
/// and the VM only calls it when the `disassemble` feature is enabled.
pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {} ==\n", name);
    let mut offset = 0;
    while offset < chunk.size() {
        let (line, next) = disassemble_instruction(chunk, offset);
        out.push_str(&line);
        out.push('\n');
        offset = next;
    }
    out
}

/// Returns the formatted row for the instruction at `offset` and the offset
/// of the next instruction.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> (String, usize) {
    let line_marker = if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        "   |".to_string()
    } else {
        format!("{:4}", chunk.lines[offset])
    };

    let op = match OpCode::try_from(chunk.code[offset]) {
        Ok(op) => op,
        Err(()) => return (format!("{:04} {} Unknown opcode {}", offset, line_marker, chunk.code[offset]), offset + 1),
    };

    match op {
        OpCode::Constant => constant_instruction("OP_CONSTANT", chunk, offset, &line_marker),
        OpCode::GetGlobal => constant_instruction("OP_GET_GLOBAL", chunk, offset, &line_marker),
        OpCode::DefineGlobal => constant_instruction("OP_DEFINE_GLOBAL", chunk, offset, &line_marker),
        OpCode::SetGlobal => constant_instruction("OP_SET_GLOBAL", chunk, offset, &line_marker),
        OpCode::GetLocal => byte_instruction("OP_GET_LOCAL", chunk, offset, &line_marker),
        OpCode::SetLocal => byte_instruction("OP_SET_LOCAL", chunk, offset, &line_marker),
        OpCode::Jump => jump_instruction("OP_JUMP", 1, chunk, offset, &line_marker),
        OpCode::JumpIfFalse => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset, &line_marker),
        OpCode::Loop => jump_instruction("OP_LOOP", -1, chunk, offset, &line_marker),
        simple => (
            format!("{:04} {} {}", offset, line_marker, simple_name(simple)),
            offset + 1,
        ),
    }
}

fn simple_name(op: OpCode) -> &'static str {
    match op {
        OpCode::Nil => "OP_NIL",
        OpCode::True => "OP_TRUE",
        OpCode::False => "OP_FALSE",
        OpCode::Pop => "OP_POP",
        OpCode::Equal => "OP_EQUAL",
        OpCode::Greater => "OP_GREATER",
        OpCode::Less => "OP_LESS",
        OpCode::Add => "OP_ADD",
        OpCode::Subtract => "OP_SUBTRACT",
        OpCode::Multiply => "OP_MULTIPLY",
        OpCode::Divide => "OP_DIVIDE",
        OpCode::Not => "OP_NOT",
        OpCode::Negate => "OP_NEGATE",
        OpCode::Print => "OP_PRINT",
        OpCode::Return => "OP_RETURN",
        _ => "OP_UNKNOWN",
    }
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize, line_marker: &str) -> (String, usize) {
    let index = chunk.code[offset + 1];
    let value = &chunk.constants[index as usize];
    let rendered = match value {
        super::value::Value::Number(n) => format_number(*n),
        other => other.to_string(),
    };
    (
        format!("{:04} {} {:<16} {:4} '{}'", offset, line_marker, name, index, rendered),
        offset + 2,
    )
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize, line_marker: &str) -> (String, usize) {
    let slot = chunk.code[offset + 1];
    (
        format!("{:04} {} {:<16} {:4}", offset, line_marker, name, slot),
        offset + 2,
    )
}

fn jump_instruction(
    name: &str,
    sign: i32,
    chunk: &Chunk,
    offset: usize,
    line_marker: &str,
) -> (String, usize) {
    let jump = ((chunk.code[offset + 1] as u16) << 8 | chunk.code[offset + 2] as u16) as i32;
    let target = offset as i32 + 3 + sign * jump;
    (
        format!("{:04} {} {:<16} {:4} -> {}", offset, line_marker, name, offset, target),
        offset + 3,
    )
}
