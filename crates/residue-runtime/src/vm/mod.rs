//! Stack-based virtual machine
//!
//! Executes bytecode functions with a value stack and call frames.
//! - Arithmetic operations check for NaN/Infinity
//! - Variables live in local slots (stack), cells, or globals (HashMap)
//! - Protected regions (`SetupFinally` .. `EndFinally`) run their cleanup on
//!   every way out of the region: fall-through, return, or error
//! - Frame entry and exit are reported to the installed [`TraceHook`]

mod frame;
pub mod trace;

pub use frame::{CallFrame, FrameId};
pub use trace::{FrameView, HookGuard, TraceEvent, TraceHook};

use crate::bytecode::Opcode;
use crate::carrier::LocalsSnapshot;
use crate::function::Function;
use crate::value::{CallArgs, Cell, NativeFunction, RuntimeError, Value};
use frame::{Block, Completion};
use std::collections::HashMap;
use std::sync::Arc;

/// Call depth limit used by [`Vm::new`].
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Outcome of one instruction.
enum Flow {
    Continue,
    /// The entry frame returned this value
    Done(Value),
}

/// Virtual machine state
pub struct Vm {
    /// Value stack
    stack: Vec<Value>,
    /// Call frames (for function calls)
    frames: Vec<CallFrame>,
    /// Global variables
    globals: HashMap<String, Value>,
    /// Maximum number of simultaneous frames
    max_depth: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            stack: Vec::with_capacity(256),
            frames: Vec::new(),
            globals: HashMap::new(),
            max_depth,
        }
    }

    /// Set a global variable
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn get_global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn remove_global(&mut self, name: &str) -> Option<Value> {
        self.globals.remove(name)
    }

    pub fn globals(&self) -> &HashMap<String, Value> {
        &self.globals
    }

    /// Expose a host function as a global.
    pub fn register_native<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut Vm, CallArgs) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.set_global(name, Value::Native(NativeFunction::new(name, func)));
    }

    /// Number of active frames.
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Call any callable value.
    pub fn call(&mut self, callee: &Value, args: CallArgs) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(function) => self.call_function(function, args),
            Value::Native(native) => native.call(self, args),
            other => Err(not_callable(other)),
        }
    }

    /// Run a bytecode function to completion.
    ///
    /// May be called re-entrantly from native functions; the nested run stops
    /// when the frame it pushed is gone.
    pub fn call_function(
        &mut self,
        function: &Arc<Function>,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        let slots = function.proto.bind(args)?;
        self.call_bound(function, slots)
    }

    /// Run a bytecode function on slots that are already bound.
    ///
    /// `slots` holds one value per entry of the prototype's `local_names`.
    /// Callers that bind against a different signature than the one the
    /// function declares enter here.
    pub fn call_bound(
        &mut self,
        function: &Arc<Function>,
        slots: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let entry_depth = self.frames.len();
        let stack_mark = self.stack.len();
        self.push_bound_frame(Arc::clone(function), slots)?;
        let result = self.execute_loop(entry_depth);
        if result.is_err() {
            self.frames.truncate(entry_depth);
            self.stack.truncate(stack_mark);
        }
        result
    }

    // ========================================================================
    // Frames
    // ========================================================================

    fn push_frame(&mut self, function: Arc<Function>, args: CallArgs) -> Result<(), RuntimeError> {
        let slots = function.proto.bind(args)?;
        self.push_bound_frame(function, slots)
    }

    fn push_bound_frame(
        &mut self,
        function: Arc<Function>,
        slots: Vec<Value>,
    ) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.max_depth {
            return Err(RuntimeError::StackOverflow {
                depth: self.max_depth,
            });
        }

        let proto = &function.proto;
        if function.cells.len() != proto.free_names.len() {
            return Err(RuntimeError::InvalidBytecode {
                msg: format!(
                    "{} expects {} free cells, closure has {}",
                    proto.name,
                    proto.free_names.len(),
                    function.cells.len()
                ),
            });
        }

        if slots.len() != proto.local_names.len() {
            return Err(RuntimeError::InvalidBytecode {
                msg: format!(
                    "{} has {} local slots, got {} bound values",
                    proto.name,
                    proto.local_names.len(),
                    slots.len()
                ),
            });
        }

        let mut cells: Vec<Cell> = proto
            .cell_names
            .iter()
            .map(|name| {
                let initial = proto
                    .slot_of(name)
                    .and_then(|slot| slots.get(slot).cloned())
                    .unwrap_or_default();
                Cell::new(initial)
            })
            .collect();
        cells.extend(function.cells.iter().cloned());

        let frame = CallFrame {
            id: FrameId::next(),
            function,
            ip: 0,
            stack_base: self.stack.len(),
            cells,
            blocks: Vec::new(),
            pending: None,
        };
        tracing::trace!(function = %frame.name(), frame = %frame.id, depth = self.frames.len() + 1, "enter");
        self.stack.extend(slots);
        self.frames.push(frame);
        self.emit(TraceEvent::Call);
        Ok(())
    }

    fn pop_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            tracing::trace!(function = %frame.name(), frame = %frame.id, "leave");
            self.stack.truncate(frame.stack_base);
        }
    }

    /// Report an event about the top frame to the trace hook.
    fn emit(&self, event: TraceEvent<'_>) {
        if !trace::is_installed() {
            return;
        }
        if let Some(frame) = self.frames.last() {
            let view = FrameView::new(frame, &self.stack, self.frames.len());
            trace::dispatch(&event, &view);
        }
    }

    fn current(&self) -> Result<&CallFrame, RuntimeError> {
        self.frames.last().ok_or_else(no_frame)
    }

    fn current_mut(&mut self) -> Result<&mut CallFrame, RuntimeError> {
        self.frames.last_mut().ok_or_else(no_frame)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    fn execute_loop(&mut self, entry_depth: usize) -> Result<Value, RuntimeError> {
        loop {
            match self.step(entry_depth) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Done(value)) => return Ok(value),
                Err(error) => self.unwind(error, entry_depth)?,
            }
        }
    }

    /// Route an error to the innermost protected region, popping frames that
    /// have none. Fails once the entry frame itself is popped.
    fn unwind(&mut self, error: RuntimeError, entry_depth: usize) -> Result<(), RuntimeError> {
        loop {
            let frame = self.current_mut()?;
            if let Some(block) = frame.blocks.pop() {
                frame.pending = Some(Completion::Raise(error));
                frame.ip = block.handler;
                self.stack.truncate(block.stack_level);
                return Ok(());
            }

            tracing::debug!(function = %frame.name(), %error, "frame unwound");
            self.emit(TraceEvent::Unwind(&error));
            self.pop_frame();
            if self.frames.len() <= entry_depth {
                return Err(error);
            }
        }
    }

    /// Leave the top frame with `value`, running cleanups first.
    fn return_from_frame(&mut self, value: Value, entry_depth: usize) -> Result<Flow, RuntimeError> {
        let frame = self.current_mut()?;
        if let Some(block) = frame.blocks.pop() {
            frame.pending = Some(Completion::Return(value));
            frame.ip = block.handler;
            self.stack.truncate(block.stack_level);
            return Ok(Flow::Continue);
        }

        self.emit(TraceEvent::Return(&value));
        self.pop_frame();
        if self.frames.len() <= entry_depth {
            return Ok(Flow::Done(value));
        }
        self.push(value);
        Ok(Flow::Continue)
    }

    fn step(&mut self, entry_depth: usize) -> Result<Flow, RuntimeError> {
        let opcode = self.read_opcode()?;

        match opcode {
            // ===== Constants =====
            Opcode::Constant => {
                let index = self.read_u16()? as usize;
                let value = self.constant(index)?;
                self.push(value);
            }
            Opcode::Null => self.push(Value::Null),
            Opcode::True => self.push(Value::Bool(true)),
            Opcode::False => self.push(Value::Bool(false)),

            // ===== Variables =====
            Opcode::GetLocal => {
                let slot = self.read_u16()? as usize;
                let at = self.local_index(slot)?;
                let value = self.stack[at].clone();
                self.push(value);
            }
            Opcode::SetLocal => {
                let slot = self.read_u16()? as usize;
                let at = self.local_index(slot)?;
                let value = self.pop()?;
                self.stack[at] = value;
            }
            Opcode::GetGlobal => {
                let name = self.name_constant()?;
                let value = self
                    .globals
                    .get(&name)
                    .cloned()
                    .ok_or(RuntimeError::UndefinedVariable { name })?;
                self.push(value);
            }
            Opcode::SetGlobal => {
                let name = self.name_constant()?;
                let value = self.pop()?;
                self.globals.insert(name, value);
            }
            Opcode::GetDeref => {
                let index = self.read_u16()? as usize;
                let cell = self.cell(index)?;
                self.push(cell.get());
            }
            Opcode::SetDeref => {
                let index = self.read_u16()? as usize;
                let cell = self.cell(index)?;
                let value = self.pop()?;
                cell.set(value);
            }
            Opcode::LoadCell => {
                let index = self.read_u16()? as usize;
                let cell = self.cell(index)?;
                self.push(Value::Cell(cell));
            }

            // ===== Arithmetic =====
            Opcode::Add => {
                let b = self.pop()?;
                let a = self.pop()?;
                let result = match (&a, &b) {
                    (Value::Number(x), Value::Number(y)) => checked(x + y)?,
                    (Value::String(x), Value::String(y)) => Value::string(format!("{}{}", x, y)),
                    (Value::Tuple(x), Value::Tuple(y)) => {
                        Value::tuple(x.iter().chain(y.iter()).cloned().collect())
                    }
                    _ => return Err(unsupported("+", &a, &b)),
                };
                self.push(result);
            }
            Opcode::Sub => self.binary_numeric("-", |x, y| checked(x - y))?,
            Opcode::Mul => self.binary_numeric("*", |x, y| checked(x * y))?,
            Opcode::Div => self.binary_numeric("/", |x, y| {
                if y == 0.0 {
                    return Err(RuntimeError::DivideByZero);
                }
                checked(x / y)
            })?,
            Opcode::Mod => self.binary_numeric("%", |x, y| {
                if y == 0.0 {
                    return Err(RuntimeError::DivideByZero);
                }
                // Result takes the sign of the divisor.
                let r = x % y;
                if r != 0.0 && (r < 0.0) != (y < 0.0) {
                    checked(r + y)
                } else {
                    checked(r)
                }
            })?,
            Opcode::Negate => {
                let value = self.pop()?;
                match value {
                    Value::Number(n) => self.push(Value::Number(-n)),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "bad operand type for unary -: '{}'",
                            other.type_name()
                        )))
                    }
                }
            }

            // ===== Comparison =====
            Opcode::Equal => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a == b));
            }
            Opcode::NotEqual => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a != b));
            }
            Opcode::Less => self.compare("<", |o| o.is_lt())?,
            Opcode::LessEqual => self.compare("<=", |o| o.is_le())?,
            Opcode::Greater => self.compare(">", |o| o.is_gt())?,
            Opcode::GreaterEqual => self.compare(">=", |o| o.is_ge())?,

            // ===== Logical =====
            Opcode::Not => {
                let value = self.pop()?;
                self.push(Value::Bool(!value.is_truthy()));
            }

            // ===== Control flow =====
            Opcode::Jump | Opcode::Loop => {
                let offset = self.read_i16()?;
                self.jump_by(offset)?;
            }
            Opcode::JumpIfFalse => {
                let offset = self.read_i16()?;
                let condition = self.pop()?;
                if !condition.is_truthy() {
                    self.jump_by(offset)?;
                }
            }

            // ===== Functions =====
            Opcode::Call => {
                let argc = self.read_u8()? as usize;
                let positional = self.pop_n(argc)?;
                let callee = self.pop()?;
                self.invoke(callee, CallArgs::positional(positional))?;
            }
            Opcode::CallKw => {
                let positional_count = self.read_u8()? as usize;
                let names_index = self.read_u16()? as usize;
                let names = self.keyword_names(names_index)?;
                let values = self.pop_n(names.len())?;
                let positional = self.pop_n(positional_count)?;
                let callee = self.pop()?;
                let args = CallArgs {
                    positional,
                    keywords: names.into_iter().zip(values).collect(),
                };
                self.invoke(callee, args)?;
            }
            Opcode::Return => {
                let value = self.pop()?;
                return self.return_from_frame(value, entry_depth);
            }
            Opcode::MakeClosure => {
                let index = self.read_u16()? as usize;
                let count = self.read_u8()? as usize;
                let proto = match self.constant(index)? {
                    Value::Function(function) => Arc::clone(&function.proto),
                    other => {
                        return Err(RuntimeError::InvalidBytecode {
                            msg: format!("MakeClosure on a {}", other.type_name()),
                        })
                    }
                };
                let cells = self
                    .pop_n(count)?
                    .into_iter()
                    .map(|value| match value {
                        Value::Cell(cell) => Ok(cell),
                        other => Err(RuntimeError::InvalidBytecode {
                            msg: format!("closure cell is a {}", other.type_name()),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.push(Value::function(Function::with_cells(proto, cells)));
            }

            // ===== Collections =====
            Opcode::Tuple => {
                let size = self.read_u16()? as usize;
                let items = self.pop_n(size)?;
                self.push(Value::tuple(items));
            }
            Opcode::GetIndex => {
                let index = self.pop()?;
                let container = self.pop()?;
                let value = get_index(&container, &index)?;
                self.push(value);
            }

            // ===== Stack manipulation =====
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Dup => {
                let value = self.peek()?.clone();
                self.push(value);
            }

            // ===== Protected regions =====
            Opcode::SetupFinally => {
                let offset = self.read_i16()?;
                let stack_level = self.stack.len();
                let frame = self.current_mut()?;
                let handler = offset_ip(frame.ip, offset)?;
                frame.blocks.push(Block {
                    handler,
                    stack_level,
                });
            }
            Opcode::PopBlock => {
                let frame = self.current_mut()?;
                if frame.blocks.pop().is_none() {
                    return Err(RuntimeError::InvalidBytecode {
                        msg: "PopBlock outside a protected region".to_string(),
                    });
                }
            }
            Opcode::EndFinally => {
                let pending = self.current_mut()?.pending.take();
                match pending {
                    None => {}
                    Some(Completion::Return(value)) => {
                        return self.return_from_frame(value, entry_depth);
                    }
                    Some(Completion::Raise(error)) => return Err(error),
                }
            }
            Opcode::Raise => {
                let value = self.pop()?;
                return Err(RuntimeError::Raised(value));
            }

            // ===== Frame capture =====
            Opcode::Locals => {
                let snapshot = self.current()?.locals(&self.stack);
                self.push(Value::map(snapshot.into_inner()));
            }
            Opcode::RemoveKey => {
                let key = self.pop()?;
                let map = self.pop()?;
                let (Value::Map(entries), Value::String(key)) = (map, key) else {
                    return Err(RuntimeError::type_error("RemoveKey needs a map and a string key"));
                };
                let mut entries = Arc::try_unwrap(entries).unwrap_or_else(|shared| (*shared).clone());
                entries.remove(key.as_str());
                self.push(Value::map(entries));
            }
            Opcode::StoreLocals => {
                let map = self.pop()?;
                let carrier = self.pop()?;
                let (Value::Carrier(carrier), Value::Map(entries)) = (carrier, map) else {
                    return Err(RuntimeError::type_error("StoreLocals needs a carrier and a map"));
                };
                let entries = Arc::try_unwrap(entries).unwrap_or_else(|shared| (*shared).clone());
                carrier.replace(LocalsSnapshot::from(entries));
            }
        }

        Ok(Flow::Continue)
    }

    /// Start a call from bytecode: bytecode callees get a new frame on this
    /// loop, natives run to completion immediately.
    fn invoke(&mut self, callee: Value, args: CallArgs) -> Result<(), RuntimeError> {
        match callee {
            Value::Function(function) => self.push_frame(function, args),
            Value::Native(native) => {
                let result = native.call(self, args)?;
                self.push(result);
                Ok(())
            }
            other => Err(not_callable(&other)),
        }
    }

    fn binary_numeric<F>(&mut self, symbol: &str, op: F) -> Result<(), RuntimeError>
    where
        F: FnOnce(f64, f64) -> Result<Value, RuntimeError>,
    {
        let b = self.pop()?;
        let a = self.pop()?;
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => {
                let result = op(*x, *y)?;
                self.push(result);
                Ok(())
            }
            _ => Err(unsupported(symbol, &a, &b)),
        }
    }

    fn compare<F>(&mut self, symbol: &str, test: F) -> Result<(), RuntimeError>
    where
        F: FnOnce(std::cmp::Ordering) -> bool,
    {
        let b = self.pop()?;
        let a = self.pop()?;
        let ordering = match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            _ => return Err(unsupported(symbol, &a, &b)),
        };
        self.push(Value::Bool(ordering.is_some_and(test)));
        Ok(())
    }

    // ========================================================================
    // Operand and stack helpers
    // ========================================================================

    fn read_u8(&mut self) -> Result<u8, RuntimeError> {
        let frame = self.current_mut()?;
        let byte = frame
            .function
            .proto
            .code
            .instructions
            .get(frame.ip)
            .copied()
            .ok_or_else(|| RuntimeError::InvalidBytecode {
                msg: format!("{}: execution ran past the end of the code", frame.name()),
            })?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, RuntimeError> {
        let hi = self.read_u8()? as u16;
        let lo = self.read_u8()? as u16;
        Ok((hi << 8) | lo)
    }

    fn read_i16(&mut self) -> Result<i16, RuntimeError> {
        Ok(self.read_u16()? as i16)
    }

    fn read_opcode(&mut self) -> Result<Opcode, RuntimeError> {
        let byte = self.read_u8()?;
        Opcode::try_from(byte).map_err(|_| RuntimeError::InvalidBytecode {
            msg: format!("unknown opcode {:#04x}", byte),
        })
    }

    fn jump_by(&mut self, offset: i16) -> Result<(), RuntimeError> {
        let frame = self.current_mut()?;
        frame.ip = offset_ip(frame.ip, offset)?;
        Ok(())
    }

    fn constant(&self, index: usize) -> Result<Value, RuntimeError> {
        let frame = self.current()?;
        frame
            .function
            .proto
            .code
            .constants
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::InvalidBytecode {
                msg: format!("{}: constant {} out of range", frame.name(), index),
            })
    }

    /// Read a u16 operand naming a string constant.
    fn name_constant(&mut self) -> Result<String, RuntimeError> {
        let index = self.read_u16()? as usize;
        match self.constant(index)? {
            Value::String(name) => Ok(name.as_str().to_string()),
            other => Err(RuntimeError::InvalidBytecode {
                msg: format!("name constant is a {}", other.type_name()),
            }),
        }
    }

    fn keyword_names(&self, index: usize) -> Result<Vec<String>, RuntimeError> {
        let invalid = || RuntimeError::InvalidBytecode {
            msg: "CallKw names must be a tuple of strings".to_string(),
        };
        match self.constant(index)? {
            Value::Tuple(names) => names
                .iter()
                .map(|name| name.as_str().map(str::to_string).ok_or_else(invalid))
                .collect(),
            _ => Err(invalid()),
        }
    }

    fn local_index(&self, slot: usize) -> Result<usize, RuntimeError> {
        let frame = self.current()?;
        if slot >= frame.local_count() {
            return Err(RuntimeError::InvalidBytecode {
                msg: format!("{}: local slot {} out of range", frame.name(), slot),
            });
        }
        Ok(frame.stack_base + slot)
    }

    fn cell(&self, index: usize) -> Result<Cell, RuntimeError> {
        let frame = self.current()?;
        frame
            .cells
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::InvalidBytecode {
                msg: format!("{}: cell {} out of range", frame.name(), index),
            })
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pop a temporary; a frame's local slots are never popped.
    fn pop(&mut self) -> Result<Value, RuntimeError> {
        let floor = self
            .frames
            .last()
            .map_or(0, |frame| frame.stack_base + frame.local_count());
        if self.stack.len() <= floor {
            return Err(RuntimeError::StackUnderflow);
        }
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// Pop `count` temporaries, returned in push order.
    fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, RuntimeError> {
        let floor = self
            .frames
            .last()
            .map_or(0, |frame| frame.stack_base + frame.local_count());
        if self.stack.len() < floor + count {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn peek(&self) -> Result<&Value, RuntimeError> {
        let floor = self
            .frames
            .last()
            .map_or(0, |frame| frame.stack_base + frame.local_count());
        if self.stack.len() <= floor {
            return Err(RuntimeError::StackUnderflow);
        }
        self.stack.last().ok_or(RuntimeError::StackUnderflow)
    }
}

fn offset_ip(ip: usize, offset: i16) -> Result<usize, RuntimeError> {
    let target = ip as isize + offset as isize;
    usize::try_from(target).map_err(|_| RuntimeError::InvalidBytecode {
        msg: format!("jump to negative offset {}", target),
    })
}

fn checked(result: f64) -> Result<Value, RuntimeError> {
    if result.is_finite() {
        Ok(Value::Number(result))
    } else {
        Err(RuntimeError::InvalidNumericResult)
    }
}

fn get_index(container: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match (container, index) {
        (Value::Tuple(items), Value::Number(n)) => {
            if n.fract() != 0.0 || *n < 0.0 {
                return Err(RuntimeError::InvalidIndex);
            }
            let at = *n as usize;
            items.get(at).cloned().ok_or(RuntimeError::OutOfBounds {
                index: at,
                len: items.len(),
            })
        }
        (Value::Map(entries), Value::String(key)) => {
            entries
                .get(key.as_str())
                .cloned()
                .ok_or_else(|| RuntimeError::KeyNotFound {
                    key: key.as_str().to_string(),
                })
        }
        (Value::Tuple(_), _) => Err(RuntimeError::InvalidIndex),
        _ => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable by '{}'",
            container.type_name(),
            index.type_name()
        ))),
    }
}

fn unsupported(symbol: &str, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        symbol,
        a.type_name(),
        b.type_name()
    ))
}

fn not_callable(value: &Value) -> RuntimeError {
    RuntimeError::type_error(format!("'{}' object is not callable", value.type_name()))
}

fn no_frame() -> RuntimeError {
    RuntimeError::InvalidBytecode {
        msg: "no active frame".to_string(),
    }
}
