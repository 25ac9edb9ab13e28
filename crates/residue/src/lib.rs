//! Residue - keep a function's local variables after it returns
//!
//! Wrapping a bytecode function yields a callable that behaves exactly like
//! the original and additionally records the final bindings of every call:
//! parameters, body locals, cell and free variables.
//!
//! Two strategies are available:
//! - [`PersistentLocals`] rewrites the function so a protected epilogue
//!   stores its locals into a carrier on every exit path
//! - [`FrameTracer`] leaves the function untouched and reads the frame
//!   through the VM's process-wide trace hook
//!
//! # Example
//!
//! ```
//! use residue::PersistentLocals;
//! use residue_runtime::{CallArgs, FunctionBuilder, Opcode, Value, Vm};
//!
//! let mut b = FunctionBuilder::new("f");
//! b.param("x");
//! b.constant(Value::Number(2.0))
//!     .get_local("x")
//!     .op(Opcode::Mul)
//!     .set_local("z")
//!     .get_local("z")
//!     .op(Opcode::Return);
//! let f = b.build_function().unwrap();
//!
//! let wrapped = PersistentLocals::new(&f).unwrap();
//! let mut vm = Vm::new();
//! let result = wrapped.call(&mut vm, CallArgs::positional(vec![Value::Number(2.0)]));
//! assert_eq!(result, Ok(Value::Number(4.0)));
//! assert_eq!(wrapped.locals()["z"], Value::Number(4.0));
//! ```

/// Residue version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod tracer;
pub mod transform;
pub mod wrapper;

pub use tracer::FrameTracer;
pub use transform::{CarrierConvention, Rewritten, TransformError, Transformer};
pub use wrapper::PersistentLocals;

use residue_config::{CaptureConfig, CarrierStyle, RuntimeConfig, Strategy};
use residue_runtime::{CallArgs, LocalsSnapshot, NativeFunction, RuntimeError, Value, Vm};
use std::sync::Arc;
use thiserror::Error;

/// Failures while wrapping a function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WrapError {
    #[error("cannot wrap {function}: {reason}")]
    IncompatibleSignature { function: String, reason: String },

    #[error(transparent)]
    Transform(TransformError),
}

impl From<TransformError> for WrapError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::IncompatibleSignature { function, reason } => {
                WrapError::IncompatibleSignature { function, reason }
            }
            other => WrapError::Transform(other),
        }
    }
}

/// A callable that remembers the locals of its last call.
pub trait Capture: Send + Sync {
    /// Call the wrapped function on `vm`.
    ///
    /// Returns or fails exactly as the wrapped function does.
    fn call(&self, vm: &mut Vm, args: CallArgs) -> Result<Value, RuntimeError>;

    /// Locals of the last call; empty before the first.
    fn locals(&self) -> LocalsSnapshot;

    /// Forget the recorded locals.
    fn reset(&self);

    fn name(&self) -> &str;

    /// Parameter list as callers see it.
    fn signature(&self) -> String;

    /// Call on a fresh VM configured by `runtime`.
    fn call_isolated(
        &self,
        runtime: &RuntimeConfig,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        let mut vm = new_vm(runtime);
        self.call(&mut vm, args)
    }
}

impl Capture for PersistentLocals {
    fn call(&self, vm: &mut Vm, args: CallArgs) -> Result<Value, RuntimeError> {
        PersistentLocals::call(self, vm, args)
    }

    fn locals(&self) -> LocalsSnapshot {
        PersistentLocals::locals(self)
    }

    fn reset(&self) {
        PersistentLocals::reset(self)
    }

    fn name(&self) -> &str {
        PersistentLocals::name(self)
    }

    fn signature(&self) -> String {
        PersistentLocals::signature(self)
    }
}

impl Capture for FrameTracer {
    fn call(&self, vm: &mut Vm, args: CallArgs) -> Result<Value, RuntimeError> {
        FrameTracer::call(self, vm, args)
    }

    fn locals(&self) -> LocalsSnapshot {
        FrameTracer::locals(self)
    }

    fn reset(&self) {
        FrameTracer::reset(self)
    }

    fn name(&self) -> &str {
        FrameTracer::name(self)
    }

    fn signature(&self) -> String {
        FrameTracer::signature(self)
    }
}

impl From<CarrierStyle> for CarrierConvention {
    fn from(style: CarrierStyle) -> Self {
        match style {
            CarrierStyle::Receiver => CarrierConvention::Receiver,
            CarrierStyle::Keyword => CarrierConvention::Keyword,
        }
    }
}

/// Wrap `function` with the strategy `config` selects.
pub fn wrap(
    function: &Arc<residue_runtime::Function>,
    config: &CaptureConfig,
) -> Result<Box<dyn Capture>, WrapError> {
    match config.strategy {
        Strategy::Rewrite => {
            let mut transformer =
                Transformer::new(config.carrier.into()).validate_output(config.validate);
            if let Some(name) = &config.carrier_name {
                transformer = transformer.with_carrier_name(name.as_str());
            }
            Ok(Box::new(PersistentLocals::with_transformer(
                function,
                &transformer,
            )?))
        }
        Strategy::Trace => Ok(Box::new(FrameTracer::new(function))),
    }
}

/// Expose a capture as a native function value, callable from bytecode.
pub fn into_value(capture: Arc<dyn Capture>) -> Value {
    let name = capture.name().to_string();
    Value::Native(NativeFunction::new(&name, move |vm, args| {
        capture.call(vm, args)
    }))
}

/// VM with the configured call depth limit.
pub fn new_vm(runtime: &RuntimeConfig) -> Vm {
    Vm::with_max_depth(runtime.max_call_depth)
}
