//! Bytecode instruction set
//!
//! Stack-based bytecode organized by category. Operands are encoded inline
//! after the opcode byte, big-endian.

/// Bytecode opcode
///
/// Stack-based VM with explicit byte values so instruction streams can be
/// decoded, rewritten and re-encoded without losing meaning.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Constants (0x01-0x0F) =====
    /// Push constant from pool [u16 index]
    Constant = 0x01,
    /// Push null
    Null = 0x02,
    /// Push true
    True = 0x03,
    /// Push false
    False = 0x04,

    // ===== Variables (0x10-0x1F) =====
    /// Push local slot [u16 slot]
    GetLocal = 0x10,
    /// Pop into local slot [u16 slot]
    SetLocal = 0x11,
    /// Push global [u16 name constant]
    GetGlobal = 0x12,
    /// Pop into global [u16 name constant]
    SetGlobal = 0x13,
    /// Push the value held by a cell [u16 cell index]
    GetDeref = 0x14,
    /// Pop into a cell [u16 cell index]
    SetDeref = 0x15,
    /// Push the cell itself, for closure creation [u16 cell index]
    LoadCell = 0x16,

    // ===== Arithmetic (0x20-0x2F) =====
    /// Pop b, pop a, push a + b
    Add = 0x20,
    /// Pop b, pop a, push a - b
    Sub = 0x21,
    /// Pop b, pop a, push a * b
    Mul = 0x22,
    /// Pop b, pop a, push a / b
    Div = 0x23,
    /// Pop b, pop a, push a % b
    Mod = 0x24,
    /// Pop a, push -a
    Negate = 0x25,

    // ===== Comparison (0x30-0x3F) =====
    /// Pop b, pop a, push a == b
    Equal = 0x30,
    /// Pop b, pop a, push a != b
    NotEqual = 0x31,
    /// Pop b, pop a, push a < b
    Less = 0x32,
    /// Pop b, pop a, push a <= b
    LessEqual = 0x33,
    /// Pop b, pop a, push a > b
    Greater = 0x34,
    /// Pop b, pop a, push a >= b
    GreaterEqual = 0x35,

    // ===== Logical (0x40-0x4F) =====
    /// Pop a, push !a
    Not = 0x40,

    // ===== Control flow (0x50-0x5F) =====
    /// Unconditional jump [i16 offset]
    Jump = 0x50,
    /// Pop condition, jump if falsy [i16 offset]
    JumpIfFalse = 0x51,
    /// Backward jump [i16 offset]
    Loop = 0x52,

    // ===== Functions (0x60-0x6F) =====
    /// Call with positional arguments [u8 arg_count]
    Call = 0x60,
    /// Return from function
    Return = 0x61,
    /// Call with positional and keyword arguments
    /// [u8 positional_count, u16 names constant]
    CallKw = 0x62,
    /// Pop cells and build a closure from a function constant
    /// [u16 function constant, u8 cell_count]
    MakeClosure = 0x63,

    // ===== Collections (0x70-0x7F) =====
    /// Create tuple [u16 size] from stack
    Tuple = 0x70,
    /// Pop index, pop container, push container[index]
    GetIndex = 0x71,

    // ===== Stack manipulation (0x80-0x8F) =====
    /// Pop and discard top of stack
    Pop = 0x80,
    /// Duplicate top of stack
    Dup = 0x81,

    // ===== Protected regions (0x90-0x9F) =====
    /// Enter a protected region whose cleanup starts at the target [i16 offset]
    SetupFinally = 0x90,
    /// Leave the innermost protected region without running its cleanup
    PopBlock = 0x91,
    /// End of a cleanup: resume the pending return or re-raise the pending error
    EndFinally = 0x92,
    /// Pop a value and raise it as an error
    Raise = 0x93,

    // ===== Frame capture (0xA0-0xAF) =====
    /// Push a map of every binding in the current frame
    Locals = 0xA0,
    /// Pop key, pop map, push map without key
    RemoveKey = 0xA1,
    /// Pop map, pop carrier, store map as the carrier's snapshot
    StoreLocals = 0xA2,
}

/// Shape of the inline operand that follows an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// One unsigned byte
    U8,
    /// Two bytes, unsigned
    U16,
    /// Two bytes, signed offset relative to the end of the instruction
    Jump,
    /// One unsigned byte followed by a u16 (`CallKw`)
    U8U16,
    /// A u16 followed by one unsigned byte (`MakeClosure`)
    U16U8,
}

impl OperandKind {
    /// Number of operand bytes.
    pub fn size(self) -> usize {
        match self {
            OperandKind::None => 0,
            OperandKind::U8 => 1,
            OperandKind::U16 | OperandKind::Jump => 2,
            OperandKind::U8U16 | OperandKind::U16U8 => 3,
        }
    }
}

impl Opcode {
    /// Operand layout for this opcode.
    pub fn operand_kind(self) -> OperandKind {
        match self {
            Opcode::Constant
            | Opcode::GetLocal
            | Opcode::SetLocal
            | Opcode::GetGlobal
            | Opcode::SetGlobal
            | Opcode::GetDeref
            | Opcode::SetDeref
            | Opcode::LoadCell
            | Opcode::Tuple => OperandKind::U16,
            Opcode::Jump | Opcode::JumpIfFalse | Opcode::Loop | Opcode::SetupFinally => {
                OperandKind::Jump
            }
            Opcode::Call => OperandKind::U8,
            Opcode::CallKw => OperandKind::U8U16,
            Opcode::MakeClosure => OperandKind::U16U8,
            _ => OperandKind::None,
        }
    }

    /// Total encoded size: opcode byte plus operands.
    pub fn encoded_size(self) -> usize {
        1 + self.operand_kind().size()
    }

    /// True for opcodes carrying a relative branch target.
    pub fn is_jump(self) -> bool {
        self.operand_kind() == OperandKind::Jump
    }

    /// True if control never falls through to the next instruction.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Jump | Opcode::Loop | Opcode::Return | Opcode::Raise
        )
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(Opcode::Constant),
            0x02 => Ok(Opcode::Null),
            0x03 => Ok(Opcode::True),
            0x04 => Ok(Opcode::False),
            0x10 => Ok(Opcode::GetLocal),
            0x11 => Ok(Opcode::SetLocal),
            0x12 => Ok(Opcode::GetGlobal),
            0x13 => Ok(Opcode::SetGlobal),
            0x14 => Ok(Opcode::GetDeref),
            0x15 => Ok(Opcode::SetDeref),
            0x16 => Ok(Opcode::LoadCell),
            0x20 => Ok(Opcode::Add),
            0x21 => Ok(Opcode::Sub),
            0x22 => Ok(Opcode::Mul),
            0x23 => Ok(Opcode::Div),
            0x24 => Ok(Opcode::Mod),
            0x25 => Ok(Opcode::Negate),
            0x30 => Ok(Opcode::Equal),
            0x31 => Ok(Opcode::NotEqual),
            0x32 => Ok(Opcode::Less),
            0x33 => Ok(Opcode::LessEqual),
            0x34 => Ok(Opcode::Greater),
            0x35 => Ok(Opcode::GreaterEqual),
            0x40 => Ok(Opcode::Not),
            0x50 => Ok(Opcode::Jump),
            0x51 => Ok(Opcode::JumpIfFalse),
            0x52 => Ok(Opcode::Loop),
            0x60 => Ok(Opcode::Call),
            0x61 => Ok(Opcode::Return),
            0x62 => Ok(Opcode::CallKw),
            0x63 => Ok(Opcode::MakeClosure),
            0x70 => Ok(Opcode::Tuple),
            0x71 => Ok(Opcode::GetIndex),
            0x80 => Ok(Opcode::Pop),
            0x81 => Ok(Opcode::Dup),
            0x90 => Ok(Opcode::SetupFinally),
            0x91 => Ok(Opcode::PopBlock),
            0x92 => Ok(Opcode::EndFinally),
            0x93 => Ok(Opcode::Raise),
            0xA0 => Ok(Opcode::Locals),
            0xA1 => Ok(Opcode::RemoveKey),
            0xA2 => Ok(Opcode::StoreLocals),
            _ => Err(()),
        }
    }
}
