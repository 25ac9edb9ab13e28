//! Function builder
//!
//! Assembles [`FunctionProto`]s by hand: declare the signature and bindings,
//! emit instructions against names and labels, then [`FunctionBuilder::build`]
//! resolves labels and validates the result.
//!
//! ```
//! use residue_runtime::{FunctionBuilder, Opcode, Value};
//!
//! let mut b = FunctionBuilder::new("double");
//! b.param("x");
//! b.get_local("x").constant(Value::Number(2.0)).op(Opcode::Mul).op(Opcode::Return);
//! let proto = b.build().unwrap();
//! assert_eq!(proto.signature(), "(x)");
//! ```

use crate::bytecode::{validate, AssembleError, Bytecode, Label, Listing, Opcode, Operand, ValidationError};
use crate::function::{Function, FunctionProto};
use crate::value::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by [`FunctionBuilder::build`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("parameter '{name}' declared twice")]
    DuplicateParameter { name: String },
    #[error("parameter '{name}' without a default follows one with a default")]
    DefaultOrder { name: String },
    #[error("'{name}' is neither a cell nor a free variable")]
    UnknownCell { name: String },
    #[error("too many {what} (limit {limit})")]
    TooMany { what: &'static str, limit: usize },
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error("generated code failed validation: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<ValidationError>),
}

/// Incremental builder for a [`FunctionProto`].
#[derive(Debug, Default)]
pub struct FunctionBuilder {
    proto: FunctionProto,
    listing: Listing,
    error: Option<BuildError>,
}

impl FunctionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            proto: FunctionProto {
                name: name.to_string(),
                ..FunctionProto::default()
            },
            ..Self::default()
        }
    }

    // ---- signature and bindings ---------------------------------------------

    /// Declare a required parameter.
    pub fn param(&mut self, name: &str) -> &mut Self {
        if !self.proto.defaults.is_empty() {
            self.fail(BuildError::DefaultOrder {
                name: name.to_string(),
            });
        }
        self.add_param(name)
    }

    /// Declare a parameter with a default value.
    pub fn param_with_default(&mut self, name: &str, default: Value) -> &mut Self {
        self.proto.defaults.push(default);
        self.add_param(name)
    }

    /// Declare the `*rest` parameter.
    pub fn varargs(&mut self, name: &str) -> &mut Self {
        self.slot(name);
        self.proto.varargs = Some(name.to_string());
        self
    }

    /// Declare the `**keywords` parameter.
    pub fn varkwargs(&mut self, name: &str) -> &mut Self {
        self.slot(name);
        self.proto.varkwargs = Some(name.to_string());
        self
    }

    /// Declare a local variable captured by inner functions.
    pub fn cell(&mut self, name: &str) -> &mut Self {
        if !self.proto.cell_names.iter().any(|n| n == name) {
            self.proto.cell_names.push(name.to_string());
        }
        self
    }

    /// Declare a variable captured from an enclosing function.
    pub fn free(&mut self, name: &str) -> &mut Self {
        if !self.proto.free_names.iter().any(|n| n == name) {
            self.proto.free_names.push(name.to_string());
        }
        self
    }

    pub fn doc(&mut self, doc: &str) -> &mut Self {
        self.proto.doc = Some(doc.to_string());
        self
    }

    /// Slot of a local, declaring it on first use.
    pub fn slot(&mut self, name: &str) -> u16 {
        let index = match self.proto.slot_of(name) {
            Some(index) => index,
            None => {
                self.proto.local_names.push(name.to_string());
                self.proto.local_names.len() - 1
            }
        };
        self.narrow(index, "locals")
    }

    // ---- constants ----------------------------------------------------------

    pub fn add_constant(&mut self, value: Value) -> u16 {
        let index = self.proto.code.add_constant(value);
        self.check_pool();
        index
    }

    /// Index of an equal constant, adding one if needed.
    pub fn intern(&mut self, value: Value) -> u16 {
        let index = self.proto.code.intern_constant(value);
        self.check_pool();
        index
    }

    // ---- instructions -------------------------------------------------------

    pub fn new_label(&mut self) -> Label {
        self.listing.new_label()
    }

    pub fn mark(&mut self, label: Label) -> &mut Self {
        self.listing.mark(label);
        self
    }

    /// Emit an instruction without operands.
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.listing.emit(opcode, Operand::None);
        self
    }

    pub fn op_u16(&mut self, opcode: Opcode, operand: u16) -> &mut Self {
        self.listing.emit(opcode, Operand::U16(operand));
        self
    }

    pub fn jump(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        self.listing.emit(opcode, Operand::Jump(label));
        self
    }

    /// Push a constant.
    pub fn constant(&mut self, value: Value) -> &mut Self {
        let index = self.intern(value);
        self.op_u16(Opcode::Constant, index)
    }

    pub fn get_local(&mut self, name: &str) -> &mut Self {
        let slot = self.slot(name);
        self.op_u16(Opcode::GetLocal, slot)
    }

    /// Pop into a local.
    pub fn set_local(&mut self, name: &str) -> &mut Self {
        let slot = self.slot(name);
        self.op_u16(Opcode::SetLocal, slot)
    }

    pub fn get_global(&mut self, name: &str) -> &mut Self {
        let index = self.intern(Value::string(name));
        self.op_u16(Opcode::GetGlobal, index)
    }

    /// Pop into a global.
    pub fn set_global(&mut self, name: &str) -> &mut Self {
        let index = self.intern(Value::string(name));
        self.op_u16(Opcode::SetGlobal, index)
    }

    pub fn get_deref(&mut self, name: &str) -> &mut Self {
        self.deref_op(Opcode::GetDeref, name)
    }

    /// Pop into a cell or free variable.
    pub fn set_deref(&mut self, name: &str) -> &mut Self {
        self.deref_op(Opcode::SetDeref, name)
    }

    /// Push the cell object itself, for [`FunctionBuilder::make_closure`].
    pub fn load_cell(&mut self, name: &str) -> &mut Self {
        self.deref_op(Opcode::LoadCell, name)
    }

    /// Call with `argc` positional arguments.
    pub fn call(&mut self, argc: u8) -> &mut Self {
        self.listing.emit(Opcode::Call, Operand::U8(argc));
        self
    }

    /// Call with `positional` values followed by one value per name.
    pub fn call_kw(&mut self, positional: u8, names: &[&str]) -> &mut Self {
        let names = Value::tuple(names.iter().map(|n| Value::string(*n)).collect());
        let index = self.intern(names);
        self.listing.emit(Opcode::CallKw, Operand::U8U16(positional, index));
        self
    }

    /// Build a closure over `inner`, taking `cells` cell objects off the stack.
    pub fn make_closure(&mut self, inner: FunctionProto, cells: u8) -> &mut Self {
        let index = self.add_constant(Value::function(Function::new(inner)));
        self.listing.emit(Opcode::MakeClosure, Operand::U16U8(index, cells));
        self
    }

    /// Resolve labels and validate.
    pub fn build(self) -> Result<FunctionProto, BuildError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let mut proto = self.proto;
        proto.code = Bytecode {
            instructions: self.listing.assemble()?,
            constants: proto.code.constants,
        };
        validate(&proto).map_err(BuildError::Invalid)?;
        Ok(proto)
    }

    /// Build and wrap as a cell-less function.
    pub fn build_function(self) -> Result<Arc<Function>, BuildError> {
        Ok(Arc::new(Function::new(self.build()?)))
    }

    // ---- internals ----------------------------------------------------------

    fn add_param(&mut self, name: &str) -> &mut Self {
        if self.proto.params.iter().any(|p| p == name) {
            self.fail(BuildError::DuplicateParameter {
                name: name.to_string(),
            });
        }
        self.slot(name);
        self.proto.params.push(name.to_string());
        self
    }

    fn deref_op(&mut self, opcode: Opcode, name: &str) -> &mut Self {
        let cells = &self.proto.cell_names;
        let free = &self.proto.free_names;
        let index = match cells.iter().position(|n| n == name) {
            Some(index) => index,
            None => match free.iter().position(|n| n == name) {
                Some(index) => cells.len() + index,
                None => {
                    self.fail(BuildError::UnknownCell {
                        name: name.to_string(),
                    });
                    return self;
                }
            },
        };
        let index = self.narrow(index, "cells");
        self.op_u16(opcode, index)
    }

    fn check_pool(&mut self) {
        if self.proto.code.constants.len() > u16::MAX as usize + 1 {
            self.fail(BuildError::TooMany {
                what: "constants",
                limit: u16::MAX as usize + 1,
            });
        }
    }

    fn narrow(&mut self, index: usize, what: &'static str) -> u16 {
        match u16::try_from(index) {
            Ok(index) => index,
            Err(_) => {
                self.fail(BuildError::TooMany {
                    what,
                    limit: u16::MAX as usize + 1,
                });
                0
            }
        }
    }

    /// Keep the first error; later ones are usually knock-on effects.
    fn fail(&mut self, error: BuildError) {
        self.error.get_or_insert(error);
    }
}
