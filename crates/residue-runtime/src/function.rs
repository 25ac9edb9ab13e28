//! Function prototypes and closures
//!
//! A [`FunctionProto`] is the static part of a function: signature, slot
//! layout and code. A [`Function`] pairs a prototype with the cells it closed
//! over. Parameters are matched to local slots by name, so slots may be added
//! to a prototype without renumbering the existing ones.

use crate::bytecode::Bytecode;
use crate::value::{CallArgs, Cell, RuntimeError, Value};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

/// Static description of a bytecode function.
#[derive(Debug, Clone, Default)]
pub struct FunctionProto {
    pub name: String,
    /// Named parameters in positional order
    pub params: Vec<String>,
    /// Name of the `*rest` parameter, if any
    pub varargs: Option<String>,
    /// Name of the `**keywords` parameter, if any
    pub varkwargs: Option<String>,
    /// Default values, aligned to the last `defaults.len()` params
    pub defaults: Vec<Value>,
    /// Names of local slots, indexed by slot number
    pub local_names: Vec<String>,
    /// Variables of this function captured by inner functions
    pub cell_names: Vec<String>,
    /// Variables this function captures from enclosing ones
    pub free_names: Vec<String>,
    pub doc: Option<String>,
    pub code: Bytecode,
}

impl FunctionProto {
    /// Number of named parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Slot index of a local by name.
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.local_names.iter().position(|n| n == name)
    }

    /// True if `name` is any binding of this function.
    pub fn binds(&self, name: &str) -> bool {
        self.slot_of(name).is_some()
            || self.cell_names.iter().any(|n| n == name)
            || self.free_names.iter().any(|n| n == name)
    }

    /// Default for the param at `index`, if it has one.
    pub fn default_for(&self, index: usize) -> Option<&Value> {
        let first = self.params.len().checked_sub(self.defaults.len())?;
        index
            .checked_sub(first)
            .and_then(|offset| self.defaults.get(offset))
    }

    /// Render the parameter list, e.g. `(a, b=2, *rest, **opts)`.
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.params.len() + 2);
        for (index, param) in self.params.iter().enumerate() {
            match self.default_for(index) {
                Some(Value::String(s)) => parts.push(format!("{}={:?}", param, s.as_str())),
                Some(default) => parts.push(format!("{}={}", param, default)),
                None => parts.push(param.clone()),
            }
        }
        if let Some(rest) = &self.varargs {
            parts.push(format!("*{}", rest));
        }
        if let Some(opts) = &self.varkwargs {
            parts.push(format!("**{}", opts));
        }
        format!("({})", parts.join(", "))
    }

    /// Bind call arguments to local slots.
    ///
    /// Positional values fill params left to right, extras go to the rest
    /// tuple, named values fill params by name or land in the keyword map,
    /// and remaining params take their defaults. Unbound slots start as null.
    pub fn bind(&self, args: CallArgs) -> Result<Vec<Value>, RuntimeError> {
        let mut slots = vec![Value::Null; self.local_names.len()];
        let mut assigned = vec![false; self.params.len()];
        let param_count = self.params.len();
        let given = args.positional.len();

        if given > param_count && self.varargs.is_none() {
            return Err(RuntimeError::type_error(format!(
                "{}() takes {} positional argument{} but {} {} given",
                self.name,
                param_count,
                if param_count == 1 { "" } else { "s" },
                given,
                if given == 1 { "was" } else { "were" },
            )));
        }

        let mut positional = args.positional.into_iter();
        for (index, value) in positional.by_ref().take(param_count).enumerate() {
            slots[self.param_slot(index)?] = value;
            assigned[index] = true;
        }
        if let Some(rest) = &self.varargs {
            let extra: Vec<Value> = positional.collect();
            slots[self.named_slot(rest)?] = Value::tuple(extra);
        }

        let mut extra_keywords = BTreeMap::new();
        for (name, value) in args.keywords {
            match self.params.iter().position(|p| *p == name) {
                Some(index) if assigned[index] => {
                    return Err(RuntimeError::type_error(format!(
                        "{}() got multiple values for argument '{}'",
                        self.name, name
                    )));
                }
                Some(index) => {
                    slots[self.param_slot(index)?] = value;
                    assigned[index] = true;
                }
                None if self.varkwargs.is_some() => {
                    extra_keywords.insert(name, value);
                }
                None => {
                    return Err(RuntimeError::type_error(format!(
                        "{}() got an unexpected keyword argument '{}'",
                        self.name, name
                    )));
                }
            }
        }
        if let Some(opts) = &self.varkwargs {
            slots[self.named_slot(opts)?] = Value::map(extra_keywords);
        }

        for index in 0..param_count {
            if assigned[index] {
                continue;
            }
            match self.default_for(index) {
                Some(default) => slots[self.param_slot(index)?] = default.clone(),
                None => {
                    return Err(RuntimeError::type_error(format!(
                        "{}() missing required argument '{}'",
                        self.name, self.params[index]
                    )));
                }
            }
        }

        Ok(slots)
    }

    fn param_slot(&self, index: usize) -> Result<usize, RuntimeError> {
        self.named_slot(&self.params[index])
    }

    fn named_slot(&self, name: &str) -> Result<usize, RuntimeError> {
        self.slot_of(name).ok_or_else(|| RuntimeError::InvalidBytecode {
            msg: format!("{}: parameter '{}' has no local slot", self.name, name),
        })
    }

    /// Multi-line summary: signature, slot layout, then disassembly.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "fn {}{}", self.name, self.signature());
        let _ = writeln!(out, "locals: [{}]", self.local_names.join(", "));
        if !self.cell_names.is_empty() {
            let _ = writeln!(out, "cells: [{}]", self.cell_names.join(", "));
        }
        if !self.free_names.is_empty() {
            let _ = writeln!(out, "free: [{}]", self.free_names.join(", "));
        }
        out.push_str(&crate::bytecode::disassemble(&self.code));
        out
    }
}

/// A prototype bound to its captured cells.
#[derive(Debug, Clone)]
pub struct Function {
    pub proto: Arc<FunctionProto>,
    /// One cell per entry of `proto.free_names`
    pub cells: Vec<Cell>,
}

impl Function {
    /// Function with no captured cells.
    pub fn new(proto: FunctionProto) -> Self {
        Self::from_proto(Arc::new(proto))
    }

    pub fn from_proto(proto: Arc<FunctionProto>) -> Self {
        Self {
            proto,
            cells: Vec::new(),
        }
    }

    pub fn with_cells(proto: Arc<FunctionProto>, cells: Vec<Cell>) -> Self {
        Self { proto, cells }
    }

    pub fn name(&self) -> &str {
        &self.proto.name
    }
}
