//! Bytecode container, assembler, disassembler and validator
//!
//! Every function owns one [`Bytecode`]: raw instruction bytes plus the
//! constant pool they index into. Code that rewrites functions goes through
//! [`Listing`], which replaces concrete jump offsets with [`Label`]s.

pub mod asm;
pub mod disasm;
mod opcode;
pub mod validator;

pub use asm::{AssembleError, Instruction, Item, Label, Listing, Operand};
pub use disasm::disassemble;
pub use opcode::{OperandKind, Opcode};
pub use validator::{validate, ValidationError, ValidationErrorKind};

use crate::value::Value;

/// Bytecode container
///
/// Instructions are encoded as:
/// - Opcode (1 byte)
/// - Operands (0-3 bytes, depending on opcode)
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    /// Raw instruction bytes
    pub instructions: Vec<u8>,
    /// Constant pool (referenced by index)
    pub constants: Vec<Value>,
}

impl Bytecode {
    /// Create a new empty bytecode container
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an opcode
    pub fn emit(&mut self, opcode: Opcode) {
        self.instructions.push(opcode as u8);
    }

    /// Emit a single byte operand
    pub fn emit_u8(&mut self, byte: u8) {
        self.instructions.push(byte);
    }

    /// Emit a u16 operand (big-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.instructions.push((value >> 8) as u8);
        self.instructions.push((value & 0xFF) as u8);
    }

    /// Emit an i16 operand (big-endian, signed)
    pub fn emit_i16(&mut self, value: i16) {
        self.emit_u16(value as u16);
    }

    /// Add a constant to the pool and return its index
    pub fn add_constant(&mut self, value: Value) -> u16 {
        self.constants.push(value);
        (self.constants.len() - 1) as u16
    }

    /// Return the index of an equal constant, adding it if absent
    pub fn intern_constant(&mut self, value: Value) -> u16 {
        match self.constants.iter().position(|c| *c == value) {
            Some(index) => index as u16,
            None => self.add_constant(value),
        }
    }

    /// Get current instruction offset (for jump targets)
    pub fn current_offset(&self) -> usize {
        self.instructions.len()
    }
}

/// Read a big-endian u16 at `at`, if the stream is long enough.
pub(crate) fn read_u16_at(code: &[u8], at: usize) -> Option<u16> {
    let hi = *code.get(at)? as u16;
    let lo = *code.get(at + 1)? as u16;
    Some((hi << 8) | lo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_to_u8() {
        assert_eq!(Opcode::Constant as u8, 0x01);
        assert_eq!(Opcode::Add as u8, 0x20);
        assert_eq!(Opcode::Jump as u8, 0x50);
        assert_eq!(Opcode::SetupFinally as u8, 0x90);
        assert_eq!(Opcode::StoreLocals as u8, 0xA2);
    }

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(Opcode::try_from(0x01), Ok(Opcode::Constant));
        assert_eq!(Opcode::try_from(0x62), Ok(Opcode::CallKw));
        assert_eq!(Opcode::try_from(0x92), Ok(Opcode::EndFinally));
        assert_eq!(Opcode::try_from(0xFF), Err(()));
    }

    #[test]
    fn test_all_opcodes_roundtrip() {
        for byte in 0u8..=255 {
            if let Ok(opcode) = Opcode::try_from(byte) {
                assert_eq!(opcode as u8, byte);
            }
        }
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(Opcode::Return.encoded_size(), 1);
        assert_eq!(Opcode::Call.encoded_size(), 2);
        assert_eq!(Opcode::GetLocal.encoded_size(), 3);
        assert_eq!(Opcode::SetupFinally.encoded_size(), 3);
        assert_eq!(Opcode::CallKw.encoded_size(), 4);
        assert_eq!(Opcode::MakeClosure.encoded_size(), 4);
        assert!(Opcode::SetupFinally.is_jump());
        assert!(!Opcode::EndFinally.is_jump());
    }

    #[test]
    fn test_emit_u16_big_endian() {
        let mut bytecode = Bytecode::new();
        bytecode.emit(Opcode::Constant);
        bytecode.emit_u16(0x1234);
        assert_eq!(bytecode.instructions, vec![0x01, 0x12, 0x34]);
    }

    #[test]
    fn test_emit_i16() {
        let mut bytecode = Bytecode::new();
        bytecode.emit(Opcode::Jump);
        bytecode.emit_i16(-3);
        assert_eq!(bytecode.instructions, vec![0x50, 0xFF, 0xFD]);
    }

    #[test]
    fn test_intern_constant_reuses_equal_values() {
        let mut bytecode = Bytecode::new();
        let a = bytecode.intern_constant(Value::string("x"));
        let b = bytecode.intern_constant(Value::Number(1.0));
        let c = bytecode.intern_constant(Value::string("x"));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(c, 0);
        assert_eq!(bytecode.constants.len(), 2);
    }

    #[test]
    fn test_read_u16_at_bounds() {
        assert_eq!(read_u16_at(&[0x01, 0x02], 0), Some(0x0102));
        assert_eq!(read_u16_at(&[0x01], 0), None);
    }
}
