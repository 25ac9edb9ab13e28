//! Labelled instruction listings
//!
//! A [`Listing`] is the editable form of an instruction stream: branch
//! operands name a [`Label`] instead of a relative byte offset, and labels are
//! bound by [`Item::Mark`] entries placed before the instruction they name.
//! Code can be spliced anywhere in a listing; [`Listing::assemble`] resolves
//! every label to a fresh relative offset afterwards.

use super::{read_u16_at, OperandKind, Opcode};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

/// Symbolic jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);

impl Label {
    /// Numeric id of this label within its listing.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Decoded operand of a single instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    U8(u8),
    U16(u16),
    Jump(Label),
    /// `CallKw`: positional count, names constant
    U8U16(u8, u16),
    /// `MakeClosure`: function constant, cell count
    U16U8(u16, u8),
}

impl Operand {
    fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::U8(_) => OperandKind::U8,
            Operand::U16(_) => OperandKind::U16,
            Operand::Jump(_) => OperandKind::Jump,
            Operand::U8U16(..) => OperandKind::U8U16,
            Operand::U16U8(..) => OperandKind::U16U8,
        }
    }
}

/// One instruction in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Self { opcode, operand }
    }

    /// Instruction without an operand.
    pub fn simple(opcode: Opcode) -> Self {
        Self::new(opcode, Operand::None)
    }

    /// Instruction with a u16 operand.
    pub fn with_u16(opcode: Opcode, value: u16) -> Self {
        Self::new(opcode, Operand::U16(value))
    }

    /// Branch instruction targeting `label`.
    pub fn jump(opcode: Opcode, label: Label) -> Self {
        Self::new(opcode, Operand::Jump(label))
    }
}

/// Entry of a listing: either a label binding or an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Mark(Label),
    Instr(Instruction),
}

impl From<Instruction> for Item {
    fn from(instruction: Instruction) -> Self {
        Item::Instr(instruction)
    }
}

/// Errors raised while decoding or assembling a listing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("unknown opcode {byte:#04x} at offset {offset}")]
    UnknownOpcode { offset: usize, byte: u8 },
    #[error("instruction {opcode:?} at offset {offset} is truncated")]
    Truncated { offset: usize, opcode: Opcode },
    #[error("jump at offset {offset} targets {target}, outside the instruction stream")]
    JumpOutOfBounds { offset: usize, target: isize },
    #[error("jump at offset {offset} targets {target}, which is not an instruction boundary")]
    JumpMisaligned { offset: usize, target: usize },
    #[error("label {0} is never bound")]
    UnboundLabel(Label),
    #[error("label {0} is bound more than once")]
    DuplicateLabel(Label),
    #[error("jump to {label} at offset {offset} does not fit in a 16-bit offset")]
    JumpOutOfRange { label: Label, offset: usize },
    #[error("{opcode:?} cannot take operand {operand:?}")]
    OperandMismatch { opcode: Opcode, operand: Operand },
}

/// Editable, label-addressed instruction sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    items: Vec<Item>,
    next_label: u32,
}

impl Listing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a label that is unique within this listing.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Bind `label` to the next instruction pushed.
    pub fn mark(&mut self, label: Label) {
        self.items.push(Item::Mark(label));
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.items.push(Item::Instr(instruction));
    }

    pub fn emit(&mut self, opcode: Opcode, operand: Operand) {
        self.push(Instruction::new(opcode, operand));
    }

    /// Insert items before everything already in the listing.
    pub fn prepend<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = Item>,
    {
        let tail = std::mem::take(&mut self.items);
        self.items.extend(items);
        self.items.extend(tail);
    }

    pub fn extend<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = Item>,
    {
        self.items.extend(items);
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Iterate over instructions only, skipping label marks.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.items.iter().filter_map(|item| match item {
            Item::Instr(instruction) => Some(instruction),
            Item::Mark(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Decode raw instruction bytes into a listing.
    ///
    /// Every distinct branch target gets one label, numbered in ascending
    /// offset order. Targets must land on an instruction boundary inside the
    /// stream.
    pub fn decode(code: &[u8]) -> Result<Listing, AssembleError> {
        let mut decoded: Vec<RawInstruction> = Vec::new();
        let mut ip = 0usize;

        while ip < code.len() {
            let instr = read_instruction(code, ip).map_err(|err| err.at(ip))?;
            if let Some(target) = instr.jump_target() {
                if target < 0 || target >= code.len() as isize {
                    return Err(AssembleError::JumpOutOfBounds { offset: ip, target });
                }
            }
            ip = instr.next();
            decoded.push(instr);
        }

        let boundaries: BTreeSet<usize> = decoded.iter().map(|instr| instr.offset).collect();
        let mut targets = BTreeSet::new();
        for instr in &decoded {
            if let Some(target) = instr.jump_target() {
                let target = target as usize;
                if !boundaries.contains(&target) {
                    return Err(AssembleError::JumpMisaligned {
                        offset: instr.offset,
                        target,
                    });
                }
                targets.insert(target);
            }
        }

        let mut listing = Listing::new();
        let labels: HashMap<usize, Label> = targets
            .into_iter()
            .map(|target| (target, listing.new_label()))
            .collect();

        for instr in decoded {
            if let Some(label) = labels.get(&instr.offset) {
                listing.mark(*label);
            }
            let operand = match instr.operand {
                RawOperand::None => Operand::None,
                RawOperand::U8(byte) => Operand::U8(byte),
                RawOperand::U16(value) => Operand::U16(value),
                RawOperand::Jump(relative) => {
                    let target = (instr.next() as isize + relative as isize) as usize;
                    Operand::Jump(labels[&target])
                }
                RawOperand::U8U16(byte, value) => Operand::U8U16(byte, value),
                RawOperand::U16U8(value, byte) => Operand::U16U8(value, byte),
            };
            listing.emit(instr.opcode, operand);
        }

        Ok(listing)
    }

    /// Encode the listing, resolving every label to a relative offset.
    pub fn assemble(&self) -> Result<Vec<u8>, AssembleError> {
        let mut positions: HashMap<Label, usize> = HashMap::new();
        let mut size = 0usize;
        for item in &self.items {
            match item {
                Item::Mark(label) => {
                    if positions.insert(*label, size).is_some() {
                        return Err(AssembleError::DuplicateLabel(*label));
                    }
                }
                Item::Instr(instruction) => {
                    if instruction.operand.kind() != instruction.opcode.operand_kind() {
                        return Err(AssembleError::OperandMismatch {
                            opcode: instruction.opcode,
                            operand: instruction.operand.clone(),
                        });
                    }
                    size += instruction.opcode.encoded_size();
                }
            }
        }

        let mut code = Vec::with_capacity(size);
        for instruction in self.instructions() {
            let start = code.len();
            code.push(instruction.opcode as u8);
            match &instruction.operand {
                Operand::None => {}
                Operand::U8(byte) => code.push(*byte),
                Operand::U16(value) => push_u16(&mut code, *value),
                Operand::Jump(label) => {
                    let target = *positions
                        .get(label)
                        .ok_or(AssembleError::UnboundLabel(*label))?;
                    let relative = target as isize - (start + 3) as isize;
                    let relative = i16::try_from(relative).map_err(|_| {
                        AssembleError::JumpOutOfRange {
                            label: *label,
                            offset: start,
                        }
                    })?;
                    push_u16(&mut code, relative as u16);
                }
                Operand::U8U16(byte, value) => {
                    code.push(*byte);
                    push_u16(&mut code, *value);
                }
                Operand::U16U8(value, byte) => {
                    push_u16(&mut code, *value);
                    code.push(*byte);
                }
            }
        }

        Ok(code)
    }
}

// ============================================================================
// Instruction reader
// ============================================================================

/// Operand as encoded in the stream. Jump offsets are still relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawOperand {
    None,
    U8(u8),
    U16(u16),
    /// Relative to the end of the jump instruction
    Jump(i16),
    U8U16(u8, u16),
    U16U8(u16, u8),
}

/// One instruction read straight from the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawInstruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub operand: RawOperand,
}

impl RawInstruction {
    /// Offset of the instruction that follows.
    pub fn next(&self) -> usize {
        self.offset + self.opcode.encoded_size()
    }

    /// Absolute branch target; may lie outside the stream.
    pub fn jump_target(&self) -> Option<isize> {
        match self.operand {
            RawOperand::Jump(relative) => Some(self.next() as isize + relative as isize),
            _ => None,
        }
    }
}

/// Why [`read_instruction`] could not read an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadError {
    UnknownOpcode(u8),
    Truncated(Opcode),
}

impl ReadError {
    fn at(self, offset: usize) -> AssembleError {
        match self {
            ReadError::UnknownOpcode(byte) => AssembleError::UnknownOpcode { offset, byte },
            ReadError::Truncated(opcode) => AssembleError::Truncated { offset, opcode },
        }
    }
}

/// Read the instruction at `offset`, which must lie inside `code`.
///
/// The listing decoder, the validator and the disassembler all read code
/// through here, so they agree on operand widths.
pub(crate) fn read_instruction(code: &[u8], offset: usize) -> Result<RawInstruction, ReadError> {
    let byte = code[offset];
    let opcode = Opcode::try_from(byte).map_err(|_| ReadError::UnknownOpcode(byte))?;
    if offset + opcode.encoded_size() > code.len() {
        return Err(ReadError::Truncated(opcode));
    }

    let at = offset + 1;
    let wide = |pos: usize| read_u16_at(code, pos).ok_or(ReadError::Truncated(opcode));
    let operand = match opcode.operand_kind() {
        OperandKind::None => RawOperand::None,
        OperandKind::U8 => RawOperand::U8(code[at]),
        OperandKind::U16 => RawOperand::U16(wide(at)?),
        OperandKind::Jump => RawOperand::Jump(wide(at)? as i16),
        OperandKind::U8U16 => RawOperand::U8U16(code[at], wide(at + 1)?),
        OperandKind::U16U8 => RawOperand::U16U8(wide(at)?, code[at + 2]),
    };
    Ok(RawInstruction {
        offset,
        opcode,
        operand,
    })
}

fn push_u16(code: &mut Vec<u8>, value: u16) {
    code.push((value >> 8) as u8);
    code.push((value & 0xFF) as u8);
}
