//! Runtime value representation
//!
//! - Numbers, Bools, Null: immediate values
//! - Strings, Tuples, Maps: reference-counted and immutable, compared by content
//! - Functions, natives, cells and carriers: live objects, compared by identity

use crate::carrier::Carrier;
use crate::function::Function;
use crate::vm::Vm;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Signature of a host function callable from bytecode.
///
/// Natives get the calling VM so they can run bytecode functions themselves.
pub type NativeFn = dyn Fn(&mut Vm, CallArgs) -> Result<Value, RuntimeError> + Send + Sync;

/// Host function exposed to bytecode.
#[derive(Clone)]
pub struct NativeFunction {
    name: Arc<str>,
    func: Arc<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut Vm, CallArgs) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, vm: &mut Vm, args: CallArgs) -> Result<Value, RuntimeError> {
        (self.func)(vm, args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Shared mutable slot backing a variable captured by an inner function.
#[derive(Debug, Clone, Default)]
pub struct Cell(Arc<Mutex<Value>>);

impl Cell {
    pub fn new(value: Value) -> Self {
        Cell(Arc::new(Mutex::new(value)))
    }

    pub fn get(&self) -> Value {
        self.lock().clone()
    }

    pub fn set(&self, value: Value) {
        *self.lock() = value;
    }

    /// True if both handles refer to the same slot.
    pub fn ptr_eq(&self, other: &Cell) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn lock(&self) -> MutexGuard<'_, Value> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Arguments of one call: positional values followed by named ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            keywords: Vec::new(),
        }
    }

    /// Builder-style: add a named argument.
    pub fn with_keyword(mut self, name: &str, value: Value) -> Self {
        self.keywords.push((name.to_string(), value));
        self
    }
}

impl From<Vec<Value>> for CallArgs {
    fn from(values: Vec<Value>) -> Self {
        CallArgs::positional(values)
    }
}

/// Runtime value type
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Numeric value (IEEE 754 double-precision)
    Number(f64),
    /// String value (reference-counted, immutable)
    String(Arc<String>),
    /// Boolean value
    Bool(bool),
    /// Null value
    #[default]
    Null,
    /// Fixed-size sequence
    Tuple(Arc<Vec<Value>>),
    /// String-keyed mapping, ordered by key
    Map(Arc<BTreeMap<String, Value>>),
    /// Bytecode function with its captured cells
    Function(Arc<Function>),
    /// Host function
    Native(NativeFunction),
    /// Captured variable slot
    Cell(Cell),
    /// Holder of the last completed frame's locals
    Carrier(Arc<Carrier>),
}

impl Value {
    /// Create a string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Arc::new(s.into()))
    }

    pub fn tuple(values: Vec<Value>) -> Self {
        Value::Tuple(Arc::new(values))
    }

    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(Arc::new(entries))
    }

    pub fn function(function: Function) -> Self {
        Value::Function(Arc::new(function))
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Null => "null",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Cell(_) => "cell",
            Value::Carrier(_) => "carrier",
        }
    }

    /// Check if this value is truthy
    ///
    /// Null, false, zero and empty strings or containers are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Display form used inside containers: strings are quoted.
    fn repr(&self) -> String {
        match self {
            Value::String(s) => format!("{:?}", s.as_str()),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    /// Content equality for data, identity equality for live objects.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(&a.func, &b.func),
            (Value::Cell(a), Value::Cell(b)) => a.ptr_eq(b),
            (Value::Carrier(a), Value::Carrier(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s.as_str()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::Tuple(items) => {
                let elements: Vec<String> = items.iter().map(Value::repr).collect();
                if elements.len() == 1 {
                    write!(f, "({},)", elements[0])
                } else {
                    write!(f, "({})", elements.join(", "))
                }
            }
            Value::Map(entries) => {
                let elements: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{:?}: {}", k, v.repr()))
                    .collect();
                write!(f, "{{{}}}", elements.join(", "))
            }
            Value::Function(func) => write!(f, "<fn {}>", func.name()),
            Value::Native(native) => write!(f, "<native fn {}>", native.name()),
            Value::Cell(cell) => write!(f, "<cell {}>", cell.get().repr()),
            Value::Carrier(_) => write!(f, "<carrier>"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

/// Runtime errors
///
/// Errors carry no bytecode offsets, so a function and its rewritten form
/// fail with identical errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// Type error, including argument binding failures
    #[error("Type error: {msg}")]
    TypeError { msg: String },
    /// Undefined global
    #[error("Undefined variable: {name}")]
    UndefinedVariable { name: String },
    /// Division by zero
    #[error("Division by zero")]
    DivideByZero,
    /// Invalid numeric result (NaN, Infinity)
    #[error("Invalid numeric result")]
    InvalidNumericResult,
    /// Tuple index out of bounds
    #[error("Index {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },
    /// Map lookup of an absent key
    #[error("Key not found: {key}")]
    KeyNotFound { key: String },
    /// Non-integer or negative index
    #[error("Invalid index: must be a non-negative integer")]
    InvalidIndex,
    /// Stack underflow (VM error)
    #[error("Stack underflow")]
    StackUnderflow,
    /// Call depth limit exceeded
    #[error("Stack overflow: call depth exceeded {depth}")]
    StackOverflow { depth: usize },
    /// Malformed instruction stream
    #[error("Invalid bytecode: {msg}")]
    InvalidBytecode { msg: String },
    /// Error raised by user code
    #[error("Raised: {0}")]
    Raised(Value),
    /// A trace hook is already installed
    #[error("Trace hook already installed")]
    TraceHookBusy,
}

impl RuntimeError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        RuntimeError::TypeError { msg: msg.into() }
    }
}
