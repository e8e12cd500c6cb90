//! Chunk disassembler.
//!
//! Renders compiled bytecode for the `print-code` and `trace-execution`
//! debug features and for tests that assert on emitted code shape.

use crate::chunk::{Chunk, OpCode};
use crate::heap::Heap;
use crate::value::Value;

/// Disassembles a whole chunk under a header line.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {name} ==\n");
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(heap, chunk, offset, &mut out);
    }
    out
}

/// Disassembles the instruction at `offset` into `out`, returning the
/// offset of the next instruction.
pub fn disassemble_instruction(
    heap: &Heap,
    chunk: &Chunk,
    offset: usize,
    out: &mut String,
) -> usize {
    use std::fmt::Write;

    let _ = write!(out, "{offset:04} ");
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        let _ = write!(out, "   | ");
    } else {
        let _ = write!(out, "{:4} ", chunk.lines[offset]);
    }

    let op = match OpCode::try_from(chunk.code[offset]) {
        Ok(op) => op,
        Err(_) => {
            let _ = writeln!(out, "unknown opcode {}", chunk.code[offset]);
            return offset + 1;
        }
    };

    match op {
        OpCode::Constant
        | OpCode::GetGlobal
        | OpCode::DefineGlobal
        | OpCode::SetGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::GetSuper
        | OpCode::Class
        | OpCode::Method => constant_instruction(heap, chunk, op, offset, out),
        OpCode::GetLocal | OpCode::SetLocal | OpCode::GetUpvalue | OpCode::SetUpvalue
        | OpCode::Call => byte_instruction(chunk, op, offset, out),
        OpCode::Jump | OpCode::JumpIfFalse => jump_instruction(chunk, op, 1, offset, out),
        OpCode::JumpBack => jump_instruction(chunk, op, -1, offset, out),
        OpCode::Invoke | OpCode::SuperInvoke => invoke_instruction(heap, chunk, op, offset, out),
        OpCode::Closure => closure_instruction(heap, chunk, offset, out),
        _ => simple_instruction(op, offset, out),
    }
}

fn op_name(op: OpCode) -> String {
    format!("{op:?}")
}

fn simple_instruction(op: OpCode, offset: usize, out: &mut String) -> usize {
    use std::fmt::Write;
    let _ = writeln!(out, "{}", op_name(op));
    offset + 1
}

fn constant_instruction(
    heap: &Heap,
    chunk: &Chunk,
    op: OpCode,
    offset: usize,
    out: &mut String,
) -> usize {
    use std::fmt::Write;
    let index = chunk.code[offset + 1] as usize;
    let rendered = heap.format_value(chunk.constants[index]);
    let _ = writeln!(out, "{:<16} {index:4} '{rendered}'", op_name(op));
    offset + 2
}

fn byte_instruction(chunk: &Chunk, op: OpCode, offset: usize, out: &mut String) -> usize {
    use std::fmt::Write;
    let slot = chunk.code[offset + 1];
    let _ = writeln!(out, "{:<16} {slot:4}", op_name(op));
    offset + 2
}

fn jump_instruction(
    chunk: &Chunk,
    op: OpCode,
    sign: i32,
    offset: usize,
    out: &mut String,
) -> usize {
    use std::fmt::Write;
    let jump = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]) as i32;
    let target = offset as i32 + 3 + sign * jump;
    let _ = writeln!(out, "{:<16} {offset:4} -> {target}", op_name(op));
    offset + 3
}

fn invoke_instruction(
    heap: &Heap,
    chunk: &Chunk,
    op: OpCode,
    offset: usize,
    out: &mut String,
) -> usize {
    use std::fmt::Write;
    let index = chunk.code[offset + 1] as usize;
    let args = chunk.code[offset + 2];
    let rendered = heap.format_value(chunk.constants[index]);
    let _ = writeln!(out, "{:<16} ({args} args) {index:4} '{rendered}'", op_name(op));
    offset + 3
}

fn closure_instruction(heap: &Heap, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    use std::fmt::Write;
    let mut offset = offset + 1;
    let index = chunk.code[offset] as usize;
    offset += 1;
    let rendered = heap.format_value(chunk.constants[index]);
    let _ = writeln!(out, "{:<16} {index:4} {rendered}", op_name(OpCode::Closure));

    let function = match chunk.constants[index] {
        Value::Obj(r) => r,
        _ => return offset,
    };
    for _ in 0..heap.function(function).upvalue_count {
        let is_local = chunk.code[offset] == 1;
        let slot = chunk.code[offset + 1];
        let _ = writeln!(
            out,
            "{:04}      |                     {} {slot}",
            offset,
            if is_local { "local" } else { "upvalue" },
        );
        offset += 2;
    }
    offset
}
