//! Residue Runtime - bytecode engine with frame capture support
//!
//! This library provides the execution substrate that locals capture is
//! built on:
//! - Values, cells and the locals [`Carrier`]
//! - Function prototypes with keyword/rest argument binding
//! - Bytecode: opcodes, labelled listings, disassembly and validation
//! - A stack VM with protected regions and frame lifecycle hooks

/// Residue runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod builder;
pub mod bytecode;
pub mod carrier;
pub mod function;
pub mod value;
pub mod vm;

// Re-export commonly used types
pub use builder::{BuildError, FunctionBuilder};
pub use bytecode::{Bytecode, Listing, Opcode};
pub use carrier::{Carrier, LocalsSnapshot};
pub use function::{Function, FunctionProto};
pub use value::{CallArgs, Cell, NativeFunction, RuntimeError, Value};
pub use vm::{FrameId, FrameView, HookGuard, TraceEvent, TraceHook, Vm};
