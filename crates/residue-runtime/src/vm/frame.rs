//! Call frame implementation for function calls

use crate::carrier::LocalsSnapshot;
use crate::function::{Function, FunctionProto};
use crate::value::{Cell, RuntimeError, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-unique identity of one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        FrameId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Active protected region: where its cleanup starts and the stack height
/// to restore on entry to it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Block {
    pub handler: usize,
    pub stack_level: usize,
}

/// How a frame was leaving when a cleanup interrupted it.
#[derive(Debug, Clone)]
pub(crate) enum Completion {
    Return(Value),
    Raise(RuntimeError),
}

/// Call frame for function calls
///
/// ## Stack Layout
///
/// ```text
/// [caller temporaries] | [slot 0][slot 1]...[slot n-1][temporaries]
///                        ^
///                        stack_base
/// ```
///
/// Local slot N is at `stack[stack_base + N]`. Cells live outside the stack:
/// the frame's own cell variables first, then the function's free cells.
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub id: FrameId,
    pub function: Arc<Function>,
    /// Next instruction to execute
    pub ip: usize,
    /// Stack index where this frame's local slots begin
    pub stack_base: usize,
    pub cells: Vec<Cell>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) pending: Option<Completion>,
}

impl CallFrame {
    pub fn proto(&self) -> &Arc<FunctionProto> {
        &self.function.proto
    }

    pub fn name(&self) -> &str {
        &self.function.proto.name
    }

    pub fn local_count(&self) -> usize {
        self.function.proto.local_names.len()
    }

    /// Every binding visible in this frame.
    ///
    /// Free variables are overridden by same-named locals, and locals by
    /// same-named cell variables, since a captured variable lives in its cell.
    pub fn locals(&self, stack: &[Value]) -> LocalsSnapshot {
        let proto = &self.function.proto;
        let own_cells = proto.cell_names.len();
        let mut map = BTreeMap::new();

        let free_cells = self.cells.get(own_cells..).unwrap_or_default();
        for (name, cell) in proto.free_names.iter().zip(free_cells) {
            map.insert(name.clone(), cell.get());
        }
        for (slot, name) in proto.local_names.iter().enumerate() {
            let value = stack
                .get(self.stack_base + slot)
                .cloned()
                .unwrap_or_default();
            map.insert(name.clone(), value);
        }
        for (name, cell) in proto.cell_names.iter().zip(&self.cells) {
            map.insert(name.clone(), cell.get());
        }

        LocalsSnapshot::from(map)
    }
}
