//! Bytecode validator: static checks on a function before it runs
//!
//! Performs five checks:
//! 1. **Decode pass**: every byte is a known opcode with enough operand bytes
//! 2. **Jump targets**: all branch destinations are within bounds and land
//!    on an opcode boundary
//! 3. **Constant refs**: pool indices are in range and of the expected kind
//! 4. **Slot refs**: local and cell indices fit the function's layout
//! 5. **Termination**: control cannot fall off the end of the code
//!
//! The VM does not run the validator itself; rewriting code calls it on every
//! function it produces.

use crate::bytecode::asm::{read_instruction, RawOperand, ReadError};
use crate::bytecode::{Bytecode, Opcode};
use crate::function::FunctionProto;
use crate::value::Value;
use std::collections::HashSet;

// ============================================================================
// Public API
// ============================================================================

/// A validation error with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Byte offset in the instruction stream where the error was detected.
    pub offset: usize,
    /// What went wrong.
    pub kind: ValidationErrorKind,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "offset {:#06x}: {}", self.offset, self.kind)
    }
}

/// Kinds of errors the validator can detect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// A byte that is not a recognised opcode.
    UnknownOpcode(u8),
    /// The instruction stream ended before an opcode's operands.
    TruncatedInstruction { opcode: Opcode },
    /// A branch target falls outside `[0, instructions.len())`.
    JumpOutOfBounds { target: isize, len: usize },
    /// A branch target does not land on an opcode boundary.
    JumpMisaligned { target: usize },
    /// A constant-pool index exceeds the pool size.
    ConstantIndexOutOfBounds { index: usize, pool_size: usize },
    /// A constant exists but is the wrong kind for its use.
    ConstantKind {
        index: usize,
        expected: &'static str,
    },
    /// A local slot index exceeds the function's slot count.
    LocalOutOfBounds { slot: usize, count: usize },
    /// A cell index exceeds the function's cell and free variable count.
    CellOutOfBounds { index: usize, count: usize },
    /// A parameter has no local slot of the same name.
    ParameterWithoutSlot { name: String },
    /// The last instruction lets control fall off the end.
    MissingTerminator,
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownOpcode(b) => write!(f, "unknown opcode {:#04x}", b),
            Self::TruncatedInstruction { opcode } => {
                write!(f, "instruction {:?} is truncated (missing operand bytes)", opcode)
            }
            Self::JumpOutOfBounds { target, len } => {
                write!(f, "jump target {} is out of bounds (len={})", target, len)
            }
            Self::JumpMisaligned { target } => {
                write!(f, "jump target {} does not align to an opcode boundary", target)
            }
            Self::ConstantIndexOutOfBounds { index, pool_size } => write!(
                f,
                "constant index {} out of bounds (pool size={})",
                index, pool_size
            ),
            Self::ConstantKind { index, expected } => {
                write!(f, "constant {} is not {}", index, expected)
            }
            Self::LocalOutOfBounds { slot, count } => {
                write!(f, "local slot {} out of bounds (locals={})", slot, count)
            }
            Self::CellOutOfBounds { index, count } => {
                write!(f, "cell {} out of bounds (cells={})", index, count)
            }
            Self::ParameterWithoutSlot { name } => {
                write!(f, "parameter '{}' has no local slot", name)
            }
            Self::MissingTerminator => write!(f, "code does not end with Return, Raise or a jump"),
        }
    }
}

/// Validate `proto`, collecting all errors found.
///
/// Returns `Ok(())` if no issues are found, otherwise `Err(errors)` with every
/// detected problem. Does NOT short-circuit on the first error.
pub fn validate(proto: &FunctionProto) -> Result<(), Vec<ValidationError>> {
    let mut errors: Vec<ValidationError> = Vec::new();

    check_parameters(proto, &mut errors);

    // Pass 1: decode into a list of (offset, opcode, operands)
    let decoded = decode_instructions(&proto.code, &mut errors);

    let valid_offsets: HashSet<usize> = decoded.iter().map(|e| e.offset).collect();

    // Pass 2: validate jump targets
    check_jump_targets(&proto.code, &decoded, &valid_offsets, &mut errors);

    // Pass 3: validate constant-pool references
    check_constant_refs(&proto.code, &decoded, &mut errors);

    // Pass 4: local and cell indices
    check_slot_refs(proto, &decoded, &mut errors);

    // Pass 5: termination check
    check_terminator(&decoded, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// Internal decoded instruction
// ============================================================================

/// A decoded instruction with all relevant data extracted.
#[derive(Debug, Clone)]
struct DecodedInstruction {
    /// Byte offset of the opcode itself.
    offset: usize,
    /// The opcode (None if the byte was unknown; errors already emitted).
    opcode: Option<Opcode>,
    operand: RawOperand,
}

// ============================================================================
// Pass 1: decode
// ============================================================================

fn decode_instructions(
    bytecode: &Bytecode,
    errors: &mut Vec<ValidationError>,
) -> Vec<DecodedInstruction> {
    let code = &bytecode.instructions;
    let mut decoded = Vec::new();
    let mut ip = 0usize;

    while ip < code.len() {
        match read_instruction(code, ip) {
            Ok(instr) => {
                decoded.push(DecodedInstruction {
                    offset: ip,
                    opcode: Some(instr.opcode),
                    operand: instr.operand,
                });
                ip = instr.next();
            }
            Err(ReadError::UnknownOpcode(byte)) => {
                errors.push(ValidationError {
                    offset: ip,
                    kind: ValidationErrorKind::UnknownOpcode(byte),
                });
                // Skip 1 byte and continue best-effort decoding
                decoded.push(DecodedInstruction {
                    offset: ip,
                    opcode: None,
                    operand: RawOperand::None,
                });
                ip += 1;
            }
            Err(ReadError::Truncated(opcode)) => {
                errors.push(ValidationError {
                    offset: ip,
                    kind: ValidationErrorKind::TruncatedInstruction { opcode },
                });
                // Can't continue; don't know where the next op starts
                break;
            }
        }
    }

    decoded
}

fn check_parameters(proto: &FunctionProto, errors: &mut Vec<ValidationError>) {
    let named = proto
        .params
        .iter()
        .chain(proto.varargs.iter())
        .chain(proto.varkwargs.iter());
    for name in named {
        if proto.slot_of(name).is_none() {
            errors.push(ValidationError {
                offset: 0,
                kind: ValidationErrorKind::ParameterWithoutSlot { name: name.clone() },
            });
        }
    }
}

// ============================================================================
// Pass 2: jump targets
// ============================================================================

fn check_jump_targets(
    bytecode: &Bytecode,
    decoded: &[DecodedInstruction],
    valid_offsets: &HashSet<usize>,
    errors: &mut Vec<ValidationError>,
) {
    let len = bytecode.instructions.len();

    for instr in decoded {
        let RawOperand::Jump(relative) = instr.operand else {
            continue;
        };

        // Offsets are relative to the end of the 3-byte instruction.
        let target = (instr.offset + 3) as isize + relative as isize;

        if target < 0 || target as usize >= len {
            errors.push(ValidationError {
                offset: instr.offset,
                kind: ValidationErrorKind::JumpOutOfBounds { target, len },
            });
            continue;
        }

        let target = target as usize;
        if !valid_offsets.contains(&target) {
            errors.push(ValidationError {
                offset: instr.offset,
                kind: ValidationErrorKind::JumpMisaligned { target },
            });
        }
    }
}

// ============================================================================
// Pass 3: constant-pool references
// ============================================================================

fn check_constant_refs(
    bytecode: &Bytecode,
    decoded: &[DecodedInstruction],
    errors: &mut Vec<ValidationError>,
) {
    let pool = &bytecode.constants;

    for instr in decoded {
        let (index, expected): (u16, Option<&'static str>) = match (instr.opcode, instr.operand) {
            (Some(Opcode::Constant), RawOperand::U16(index)) => (index, None),
            (Some(Opcode::GetGlobal | Opcode::SetGlobal), RawOperand::U16(index)) => {
                (index, Some("a string"))
            }
            (Some(Opcode::CallKw), RawOperand::U8U16(_, index)) => {
                (index, Some("a tuple of strings"))
            }
            (Some(Opcode::MakeClosure), RawOperand::U16U8(index, _)) => {
                (index, Some("a function"))
            }
            _ => continue,
        };
        let index = usize::from(index);

        let Some(constant) = pool.get(index) else {
            errors.push(ValidationError {
                offset: instr.offset,
                kind: ValidationErrorKind::ConstantIndexOutOfBounds {
                    index,
                    pool_size: pool.len(),
                },
            });
            continue;
        };

        let Some(expected) = expected else {
            continue;
        };
        let matches = match instr.opcode {
            Some(Opcode::CallKw) => match constant {
                Value::Tuple(names) => {
                    names.iter().all(|n| matches!(n, Value::String(_)))
                        && names.len() <= u8::MAX as usize
                }
                _ => false,
            },
            Some(Opcode::MakeClosure) => matches!(constant, Value::Function(_)),
            _ => matches!(constant, Value::String(_)),
        };
        if !matches {
            errors.push(ValidationError {
                offset: instr.offset,
                kind: ValidationErrorKind::ConstantKind { index, expected },
            });
        }
    }
}

// ============================================================================
// Pass 4: local and cell references
// ============================================================================

fn check_slot_refs(
    proto: &FunctionProto,
    decoded: &[DecodedInstruction],
    errors: &mut Vec<ValidationError>,
) {
    let local_count = proto.local_names.len();
    let cell_count = proto.cell_names.len() + proto.free_names.len();

    for instr in decoded {
        let RawOperand::U16(index) = instr.operand else {
            continue;
        };
        let index = usize::from(index);
        let kind = match instr.opcode {
            Some(Opcode::GetLocal) | Some(Opcode::SetLocal) if index >= local_count => {
                ValidationErrorKind::LocalOutOfBounds {
                    slot: index,
                    count: local_count,
                }
            }
            Some(Opcode::GetDeref) | Some(Opcode::SetDeref) | Some(Opcode::LoadCell)
                if index >= cell_count =>
            {
                ValidationErrorKind::CellOutOfBounds {
                    index,
                    count: cell_count,
                }
            }
            _ => continue,
        };
        errors.push(ValidationError {
            offset: instr.offset,
            kind,
        });
    }
}

// ============================================================================
// Pass 5: termination
// ============================================================================

fn check_terminator(decoded: &[DecodedInstruction], errors: &mut Vec<ValidationError>) {
    match decoded.last() {
        Some(last) if last.opcode.is_some_and(Opcode::is_terminator) => {}
        Some(last) => errors.push(ValidationError {
            offset: last.offset,
            kind: ValidationErrorKind::MissingTerminator,
        }),
        None => errors.push(ValidationError {
            offset: 0,
            kind: ValidationErrorKind::MissingTerminator,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;

    // ---- helpers ------------------------------------------------------------

    fn proto_with(code: Bytecode, locals: &[&str]) -> FunctionProto {
        FunctionProto {
            name: "f".to_string(),
            local_names: locals.iter().map(|l| l.to_string()).collect(),
            code,
            ..FunctionProto::default()
        }
    }

    fn kinds(result: Result<(), Vec<ValidationError>>) -> Vec<ValidationErrorKind> {
        result.unwrap_err().into_iter().map(|e| e.kind).collect()
    }

    // ---- valid code passes ----------------------------------------------------

    #[test]
    fn test_valid_null_return() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::Null);
        bc.emit(Opcode::Return);
        assert!(validate(&proto_with(bc, &[])).is_ok());
    }

    #[test]
    fn test_valid_locals_and_globals() {
        let mut bc = Bytecode::new();
        let name = bc.add_constant(Value::string("g"));
        bc.emit(Opcode::GetGlobal);
        bc.emit_u16(name);
        bc.emit(Opcode::SetLocal);
        bc.emit_u16(0);
        bc.emit(Opcode::GetLocal);
        bc.emit_u16(0);
        bc.emit(Opcode::Return);
        assert!(validate(&proto_with(bc, &["x"])).is_ok());
    }

    #[test]
    fn test_valid_protected_region() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::SetupFinally);
        bc.emit_i16(2);
        bc.emit(Opcode::Null);
        bc.emit(Opcode::Return);
        bc.emit(Opcode::EndFinally);
        bc.emit(Opcode::Null);
        bc.emit(Opcode::Return);
        assert!(validate(&proto_with(bc, &[])).is_ok());
    }

    // ---- errors -------------------------------------------------------------

    #[test]
    fn test_unknown_opcode_and_missing_terminator() {
        let mut bc = Bytecode::new();
        bc.emit_u8(0xEE);
        bc.emit(Opcode::Null);
        assert_eq!(
            kinds(validate(&proto_with(bc, &[]))),
            vec![
                ValidationErrorKind::UnknownOpcode(0xEE),
                ValidationErrorKind::MissingTerminator
            ]
        );
    }

    #[test]
    fn test_empty_code_has_no_terminator() {
        assert_eq!(
            kinds(validate(&proto_with(Bytecode::new(), &[]))),
            vec![ValidationErrorKind::MissingTerminator]
        );
    }

    #[test]
    fn test_truncated_instruction() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::Constant);
        bc.emit_u8(0);
        let errors = validate(&proto_with(bc, &[])).unwrap_err();
        assert_eq!(
            errors[0].kind,
            ValidationErrorKind::TruncatedInstruction {
                opcode: Opcode::Constant
            }
        );
    }

    #[test]
    fn test_jump_out_of_bounds_and_misaligned() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::Jump);
        bc.emit_i16(100);
        bc.emit(Opcode::JumpIfFalse);
        bc.emit_i16(1);
        bc.emit(Opcode::GetLocal);
        bc.emit_u16(0);
        bc.emit(Opcode::Return);
        let found = kinds(validate(&proto_with(bc, &["x"])));
        assert!(found.contains(&ValidationErrorKind::JumpOutOfBounds {
            target: 103,
            len: 10
        }));
        assert!(found.contains(&ValidationErrorKind::JumpMisaligned { target: 7 }));
    }

    #[test]
    fn test_constant_refs() {
        let mut bc = Bytecode::new();
        let number = bc.add_constant(Value::Number(1.0));
        bc.emit(Opcode::GetGlobal);
        bc.emit_u16(number);
        bc.emit(Opcode::Constant);
        bc.emit_u16(9);
        bc.emit(Opcode::MakeClosure);
        bc.emit_u16(number);
        bc.emit_u8(0);
        bc.emit(Opcode::Return);
        assert_eq!(
            kinds(validate(&proto_with(bc, &[]))),
            vec![
                ValidationErrorKind::ConstantKind {
                    index: 0,
                    expected: "a string"
                },
                ValidationErrorKind::ConstantIndexOutOfBounds {
                    index: 9,
                    pool_size: 1
                },
                ValidationErrorKind::ConstantKind {
                    index: 0,
                    expected: "a function"
                },
            ]
        );
    }

    #[test]
    fn test_make_closure_accepts_function_constant() {
        let mut bc = Bytecode::new();
        let inner = bc.add_constant(Value::function(Function::new(FunctionProto::default())));
        bc.emit(Opcode::MakeClosure);
        bc.emit_u16(inner);
        bc.emit_u8(0);
        bc.emit(Opcode::Return);
        assert!(validate(&proto_with(bc, &[])).is_ok());
    }

    #[test]
    fn test_call_kw_needs_name_tuple() {
        let mut bc = Bytecode::new();
        let names = bc.add_constant(Value::tuple(vec![Value::string("a"), Value::Null]));
        bc.emit(Opcode::CallKw);
        bc.emit_u8(0);
        bc.emit_u16(names);
        bc.emit(Opcode::Return);
        assert_eq!(
            kinds(validate(&proto_with(bc, &[]))),
            vec![ValidationErrorKind::ConstantKind {
                index: 0,
                expected: "a tuple of strings"
            }]
        );
    }

    #[test]
    fn test_slot_refs() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::GetLocal);
        bc.emit_u16(2);
        bc.emit(Opcode::GetDeref);
        bc.emit_u16(0);
        bc.emit(Opcode::Return);
        assert_eq!(
            kinds(validate(&proto_with(bc, &["a", "b"]))),
            vec![
                ValidationErrorKind::LocalOutOfBounds { slot: 2, count: 2 },
                ValidationErrorKind::CellOutOfBounds { index: 0, count: 0 },
            ]
        );
    }

    #[test]
    fn test_parameter_without_slot() {
        let mut bc = Bytecode::new();
        bc.emit(Opcode::Null);
        bc.emit(Opcode::Return);
        let mut proto = proto_with(bc, &[]);
        proto.params.push("a".to_string());
        assert_eq!(
            kinds(validate(&proto)),
            vec![ValidationErrorKind::ParameterWithoutSlot {
                name: "a".to_string()
            }]
        );
    }

    #[test]
    fn test_decode_agrees_with_listing_decoder() {
        use crate::bytecode::{AssembleError, Listing};

        let mut truncated = Bytecode::new();
        truncated.emit(Opcode::Null);
        truncated.emit(Opcode::CallKw);
        truncated.emit_u8(1);
        truncated.emit_u8(0);
        assert_eq!(
            Listing::decode(&truncated.instructions),
            Err(AssembleError::Truncated {
                offset: 1,
                opcode: Opcode::CallKw
            })
        );
        assert_eq!(
            validate(&proto_with(truncated, &[])).unwrap_err()[0],
            ValidationError {
                offset: 1,
                kind: ValidationErrorKind::TruncatedInstruction {
                    opcode: Opcode::CallKw
                },
            }
        );

        let mut unknown = Bytecode::new();
        unknown.emit(Opcode::MakeClosure);
        unknown.emit_u16(0);
        unknown.emit_u8(0);
        unknown.emit_u8(0xEE);
        assert_eq!(
            Listing::decode(&unknown.instructions),
            Err(AssembleError::UnknownOpcode {
                offset: 4,
                byte: 0xEE
            })
        );
        let errors = validate(&proto_with(unknown, &[])).unwrap_err();
        assert!(errors.contains(&ValidationError {
            offset: 4,
            kind: ValidationErrorKind::UnknownOpcode(0xEE),
        }));
    }

    #[test]
    fn test_error_display() {
        let error = ValidationError {
            offset: 3,
            kind: ValidationErrorKind::LocalOutOfBounds { slot: 4, count: 1 },
        };
        assert_eq!(
            error.to_string(),
            "offset 0x0003: local slot 4 out of bounds (locals=1)"
        );
    }
}
