//! Locals capture through the VM's trace hook

use residue_runtime::vm::trace;
use residue_runtime::{
    CallArgs, Carrier, FrameId, FrameView, Function, FunctionProto, LocalsSnapshot, RuntimeError,
    TraceEvent, TraceHook, Value, Vm,
};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

/// Captures a function's locals without rewriting it.
///
/// Each call installs a process-wide trace hook for its duration and copies
/// the bindings of the outermost frame of the function when that frame
/// returns or unwinds. Only one traced call can run at a time in the whole
/// process; an overlapping call fails with [`RuntimeError::TraceHookBusy`].
#[derive(Debug)]
pub struct FrameTracer {
    function: Arc<Function>,
    carrier: Arc<Carrier>,
}

impl FrameTracer {
    pub fn new(function: &Arc<Function>) -> Self {
        Self {
            function: Arc::clone(function),
            carrier: Arc::new(Carrier::new()),
        }
    }

    pub fn call(&self, vm: &mut Vm, args: CallArgs) -> Result<Value, RuntimeError> {
        let hook = Arc::new(CaptureHook {
            target: Arc::clone(&self.function.proto),
            thread: thread::current().id(),
            traced: Mutex::new(None),
            carrier: Arc::clone(&self.carrier),
        });
        let _guard = trace::install(hook)?;
        vm.call_function(&self.function, args)
    }

    /// Locals of the last call; empty before the first.
    pub fn locals(&self) -> LocalsSnapshot {
        self.carrier.snapshot()
    }

    pub fn reset(&self) {
        self.carrier.reset();
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn signature(&self) -> String {
        self.function.proto.signature()
    }

    pub fn function(&self) -> &Arc<Function> {
        &self.function
    }
}

/// Hook for one traced call.
struct CaptureHook {
    target: Arc<FunctionProto>,
    thread: ThreadId,
    /// First frame of `target` entered on `thread`
    traced: Mutex<Option<FrameId>>,
    carrier: Arc<Carrier>,
}

impl TraceHook for CaptureHook {
    fn on_event(&self, event: &TraceEvent<'_>, frame: &FrameView<'_>) {
        if thread::current().id() != self.thread || !Arc::ptr_eq(frame.proto(), &self.target) {
            return;
        }
        let mut traced = self
            .traced
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match event {
            TraceEvent::Call => {
                if traced.is_none() {
                    *traced = Some(frame.id());
                    tracing::trace!(function = %frame.name(), frame = %frame.id(), "tracing frame");
                }
            }
            TraceEvent::Return(_) | TraceEvent::Unwind(_) => {
                if *traced == Some(frame.id()) {
                    self.carrier.replace(frame.locals());
                    tracing::trace!(function = %frame.name(), frame = %frame.id(), "captured locals");
                }
            }
        }
    }
}
