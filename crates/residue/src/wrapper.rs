//! Callable wrapper around a rewritten function

use crate::transform::{CarrierConvention, Transformer};
use crate::WrapError;
use residue_runtime::{CallArgs, Carrier, Function, LocalsSnapshot, RuntimeError, Value, Vm};
use std::sync::Arc;

/// A function whose locals survive the call.
///
/// Each call runs a rewritten copy of the function that stores its final
/// bindings into a carrier owned by the wrapper; [`locals`](Self::locals)
/// returns the bindings of the most recent call, however it ended.
///
/// Concurrent calls on one wrapper share the carrier, so the snapshot then
/// reflects whichever call finished last.
#[derive(Debug)]
pub struct PersistentLocals {
    original: Arc<Function>,
    transformed: Arc<Function>,
    carrier: Arc<Carrier>,
    convention: CarrierConvention,
    carrier_name: String,
}

impl PersistentLocals {
    /// Wrap `function`, passing the carrier as a leading argument.
    pub fn new(function: &Arc<Function>) -> Result<Self, WrapError> {
        Self::with_transformer(function, &Transformer::new(CarrierConvention::Receiver))
    }

    /// Wrap `function`, binding the carrier as the default of a trailing parameter.
    ///
    /// The rewritten function then captures even when called directly.
    pub fn with_keyword_carrier(function: &Arc<Function>) -> Result<Self, WrapError> {
        Self::with_transformer(function, &Transformer::new(CarrierConvention::Keyword))
    }

    pub fn with_transformer(
        function: &Arc<Function>,
        transformer: &Transformer,
    ) -> Result<Self, WrapError> {
        let rewritten = transformer.transform(&function.proto)?;
        let transformed = Arc::new(Function::with_cells(
            rewritten.proto,
            function.cells.clone(),
        ));
        tracing::debug!(
            function = %function.name(),
            convention = %transformer.convention(),
            "wrapped for locals capture"
        );
        Ok(Self {
            original: Arc::clone(function),
            transformed,
            carrier: rewritten.carrier,
            convention: transformer.convention(),
            carrier_name: rewritten.carrier_name,
        })
    }

    /// Call the function, then record its locals.
    ///
    /// Arguments bind against the original signature, so a caller keyword
    /// spelled like the carrier lands where the original would put it. The
    /// carrier then fills the slot the rewrite appended after the original
    /// locals.
    pub fn call(&self, vm: &mut Vm, args: CallArgs) -> Result<Value, RuntimeError> {
        let mut slots = self.original.proto.bind(args)?;
        slots.push(Value::Carrier(Arc::clone(&self.carrier)));
        vm.call_bound(&self.transformed, slots)
    }

    /// Locals of the last call; empty before the first.
    pub fn locals(&self) -> LocalsSnapshot {
        self.carrier.snapshot()
    }

    pub fn reset(&self) {
        self.carrier.reset();
    }

    pub fn name(&self) -> &str {
        self.original.name()
    }

    /// Parameter list of the wrapped function, without the carrier.
    pub fn signature(&self) -> String {
        self.original.proto.signature()
    }

    pub fn doc(&self) -> Option<&str> {
        self.original.proto.doc.as_deref()
    }

    /// Help text: signature, documentation and a note on [`locals`](Self::locals).
    pub fn help(&self) -> String {
        format!(
            "{}{}\n\n{}\n\nLocals of the most recent call are available through locals().",
            self.name(),
            self.signature(),
            self.doc().unwrap_or("<no docstring>")
        )
    }

    pub fn convention(&self) -> CarrierConvention {
        self.convention
    }

    pub fn carrier_name(&self) -> &str {
        &self.carrier_name
    }

    pub fn original(&self) -> &Arc<Function> {
        &self.original
    }

    /// The rewritten function. With the keyword convention it can be called
    /// on its own and still fills this wrapper's snapshot.
    pub fn transformed(&self) -> &Arc<Function> {
        &self.transformed
    }
}
