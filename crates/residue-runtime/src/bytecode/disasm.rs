//! Bytecode disassembler
//!
//! Converts bytecode back to a human-readable listing. Used by tests and by
//! trace-level logging of rewritten functions.

use super::asm::{read_instruction, Item, Listing, Operand, RawOperand, ReadError};
use super::Bytecode;
use crate::value::Value;
use std::fmt::{self, Write};

/// Disassemble bytecode to human-readable format
///
/// # Format
/// ```text
/// === Constants ===
/// 0: 42
/// 1: "hello"
///
/// === Instructions ===
/// 0000  Constant 0
/// 0003  JumpIfFalse 4 (-> 0010)
/// 0006  Return
/// ```
pub fn disassemble(bytecode: &Bytecode) -> String {
    let mut output = String::new();

    if !bytecode.constants.is_empty() {
        let _ = writeln!(output, "=== Constants ===");
        for (idx, constant) in bytecode.constants.iter().enumerate() {
            let _ = writeln!(output, "{}: {}", idx, format_value(constant));
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "=== Instructions ===");
    let mut offset = 0;
    while offset < bytecode.instructions.len() {
        let line = disassemble_instruction(&bytecode.instructions, &mut offset);
        let _ = writeln!(output, "{}", line);
    }

    output
}

/// Disassemble a single instruction, advancing `offset` past it.
///
/// Undecodable bytes are rendered inline and skipped one at a time so a
/// corrupt stream still prints in full.
fn disassemble_instruction(code: &[u8], offset: &mut usize) -> String {
    let start = *offset;
    let instr = match read_instruction(code, start) {
        Ok(instr) => instr,
        Err(ReadError::UnknownOpcode(byte)) => {
            *offset += 1;
            return format!("{:04}  <invalid opcode: {:#04x}>", start, byte);
        }
        Err(ReadError::Truncated(opcode)) => {
            *offset = code.len();
            return format!("{:04}  {:?} <truncated>", start, opcode);
        }
    };
    *offset = instr.next();

    let opcode = instr.opcode;
    match instr.operand {
        RawOperand::None => format!("{:04}  {:?}", start, opcode),
        RawOperand::U8(byte) => format!("{:04}  {:?} {}", start, opcode, byte),
        RawOperand::U16(value) => format!("{:04}  {:?} {}", start, opcode, value),
        RawOperand::Jump(jump) => {
            let target = instr.next() as isize + jump as isize;
            format!("{:04}  {:?} {} (-> {:04})", start, opcode, jump, target)
        }
        RawOperand::U8U16(byte, value) => {
            format!("{:04}  {:?} {} {}", start, opcode, byte, value)
        }
        RawOperand::U16U8(value, byte) => {
            format!("{:04}  {:?} {} {}", start, opcode, value, byte)
        }
    }
}

/// Format a Value for constant pool display
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s.as_str()),
        Value::Function(f) => format!("<fn {}>", f.proto.name),
        other => other.to_string(),
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in self.items() {
            match item {
                Item::Mark(label) => writeln!(f, "{}:", label)?,
                Item::Instr(instruction) => {
                    write!(f, "    {:?}", instruction.opcode)?;
                    match &instruction.operand {
                        Operand::None => {}
                        Operand::U8(byte) => write!(f, " {}", byte)?,
                        Operand::U16(value) => write!(f, " {}", value)?,
                        Operand::Jump(label) => write!(f, " {}", label)?,
                        Operand::U8U16(byte, value) => write!(f, " {} {}", byte, value)?,
                        Operand::U16U8(value, byte) => write!(f, " {} {}", value, byte)?,
                    }
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}
