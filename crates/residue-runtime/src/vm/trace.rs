//! Frame lifecycle hooks
//!
//! A single process-wide [`TraceHook`] can observe every frame the VM enters
//! and leaves. The VM calls [`TraceHook::on_event`] after a frame is pushed
//! and just before it is popped, so a hook sees the frame's final bindings on
//! both normal and error exits.
//!
//! Installing a hook while another is active fails with
//! [`RuntimeError::TraceHookBusy`]; the slot is freed when the returned
//! [`HookGuard`] is dropped.

use super::frame::{CallFrame, FrameId};
use crate::carrier::LocalsSnapshot;
use crate::function::{Function, FunctionProto};
use crate::value::{RuntimeError, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Frame lifecycle event.
#[derive(Debug)]
pub enum TraceEvent<'a> {
    /// Frame pushed, arguments bound, no instruction run yet
    Call,
    /// Frame about to be popped after returning a value
    Return(&'a Value),
    /// Frame about to be popped by an error nothing in it handled
    Unwind(&'a RuntimeError),
}

/// Read-only view of the frame an event is about.
pub struct FrameView<'a> {
    frame: &'a CallFrame,
    stack: &'a [Value],
    depth: usize,
}

impl<'a> FrameView<'a> {
    pub(crate) fn new(frame: &'a CallFrame, stack: &'a [Value], depth: usize) -> Self {
        Self { frame, stack, depth }
    }

    pub fn id(&self) -> FrameId {
        self.frame.id
    }

    pub fn function(&self) -> &Arc<Function> {
        &self.frame.function
    }

    pub fn proto(&self) -> &Arc<FunctionProto> {
        self.frame.proto()
    }

    pub fn name(&self) -> &str {
        self.frame.name()
    }

    /// Number of frames on the VM, this one included.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Current bindings of the frame.
    pub fn locals(&self) -> LocalsSnapshot {
        self.frame.locals(self.stack)
    }
}

/// Observer of frame lifecycle events.
pub trait TraceHook: Send + Sync {
    fn on_event(&self, event: &TraceEvent<'_>, frame: &FrameView<'_>);
}

static ACTIVE: AtomicBool = AtomicBool::new(false);
static SLOT: Mutex<Option<Arc<dyn TraceHook>>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<Arc<dyn TraceHook>>> {
    SLOT.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps a hook installed; uninstalls it on drop.
#[must_use = "the hook is removed as soon as the guard is dropped"]
#[derive(Debug)]
pub struct HookGuard {
    _private: (),
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        let mut slot = slot();
        *slot = None;
        ACTIVE.store(false, Ordering::Release);
        tracing::debug!("trace hook removed");
    }
}

/// Install `hook` as the process-wide trace hook.
pub fn install(hook: Arc<dyn TraceHook>) -> Result<HookGuard, RuntimeError> {
    let mut slot = slot();
    if slot.is_some() {
        return Err(RuntimeError::TraceHookBusy);
    }
    *slot = Some(hook);
    ACTIVE.store(true, Ordering::Release);
    tracing::debug!("trace hook installed");
    Ok(HookGuard { _private: () })
}

/// True while a hook is installed.
pub fn is_installed() -> bool {
    ACTIVE.load(Ordering::Acquire)
}

/// Deliver an event to the installed hook, if any.
///
/// The hook is cloned out of the slot first and runs without the lock held.
pub(crate) fn dispatch(event: &TraceEvent<'_>, frame: &FrameView<'_>) {
    if !ACTIVE.load(Ordering::Acquire) {
        return;
    }
    let hook = slot().clone();
    if let Some(hook) = hook {
        hook.on_event(event, frame);
    }
}
