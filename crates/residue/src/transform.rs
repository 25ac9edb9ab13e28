//! Bytecode rewriting
//!
//! [`Transformer::transform`] wraps a function body in a protected region
//! whose cleanup copies the frame's locals into a [`Carrier`]:
//!
//! ```text
//!     SetupFinally cleanup
//!     <original body>
//! cleanup:
//!     GetLocal <carrier>
//!     Locals
//!     Constant "<carrier name>"
//!     RemoveKey
//!     StoreLocals
//!     EndFinally
//!     Null
//!     Return
//! ```
//!
//! The body is decoded into a labelled [`Listing`] so every branch keeps its
//! target when the prologue shifts the code, then reassembled, validated and
//! compared back against the original instruction by instruction.

use residue_runtime::bytecode::{
    validate, AssembleError, Instruction, Item, Label, Listing, Operand, ValidationError,
};
use residue_runtime::{Carrier, FunctionProto, Opcode, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Parameter name used by [`CarrierConvention::Receiver`]
pub const RECEIVER_NAME: &str = "self";

/// Parameter name used by [`CarrierConvention::Keyword`]
pub const KEYWORD_NAME: &str = "_selfref";

/// How the rewritten function gets hold of its carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierConvention {
    /// Leading positional parameter; callers pass the carrier explicitly.
    Receiver,
    /// Trailing parameter defaulting to the carrier, so plain calls capture too.
    Keyword,
}

impl CarrierConvention {
    pub fn default_name(self) -> &'static str {
        match self {
            CarrierConvention::Receiver => RECEIVER_NAME,
            CarrierConvention::Keyword => KEYWORD_NAME,
        }
    }
}

impl fmt::Display for CarrierConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarrierConvention::Receiver => write!(f, "receiver"),
            CarrierConvention::Keyword => write!(f, "keyword"),
        }
    }
}

/// Failures while rewriting a function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("{function}: {reason}")]
    IncompatibleSignature { function: String, reason: String },

    #[error("{function}: cannot decode body: {source}")]
    Decode {
        function: String,
        #[source]
        source: AssembleError,
    },

    #[error("{function}: cannot assemble rewritten body: {source}")]
    Assemble {
        function: String,
        #[source]
        source: AssembleError,
    },

    #[error("{function}: rewritten body is invalid: {}", join_errors(.errors))]
    Invalid {
        function: String,
        errors: Vec<ValidationError>,
    },

    #[error("{function}: too many {what} to add a carrier")]
    Capacity {
        function: String,
        what: &'static str,
    },

    #[error("{function}: expected {expected} parameters after rewriting, found {found}")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("{function}: rewritten body differs from the original at item {index}")]
    BodyAltered { function: String, index: usize },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Output of a successful rewrite.
#[derive(Debug, Clone)]
pub struct Rewritten {
    pub proto: Arc<FunctionProto>,
    /// Carrier the epilogue stores into. For the keyword convention it is
    /// also the carrier parameter's default.
    pub carrier: Arc<Carrier>,
    pub carrier_name: String,
}

/// Rewrites function prototypes to capture their locals on exit.
#[derive(Debug, Clone)]
pub struct Transformer {
    convention: CarrierConvention,
    /// Explicitly chosen carrier name; `None` derives one per function
    carrier_name: Option<String>,
    validate: bool,
}

impl Transformer {
    pub fn new(convention: CarrierConvention) -> Self {
        Self {
            convention,
            carrier_name: None,
            validate: true,
        }
    }

    /// Use `name` for the carrier parameter instead of the convention's default.
    ///
    /// An explicit name is taken as is; functions that already bind it are
    /// rejected rather than renamed.
    pub fn with_carrier_name(mut self, name: impl Into<String>) -> Self {
        self.carrier_name = Some(name.into());
        self
    }

    /// Toggle the validator pass over the output.
    pub fn validate_output(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn convention(&self) -> CarrierConvention {
        self.convention
    }

    /// Requested carrier name. Without an explicit name this is the
    /// convention's default, which [`transform`](Self::transform) suffixes
    /// with `_` until it is free in the function.
    pub fn carrier_name(&self) -> &str {
        self.carrier_name
            .as_deref()
            .unwrap_or_else(|| self.convention.default_name())
    }

    /// Produce a capturing copy of `proto` bound to a fresh carrier.
    pub fn transform(&self, proto: &FunctionProto) -> Result<Rewritten, TransformError> {
        let carrier_name = self.resolve_name(proto)?;
        let function = proto.name.clone();
        let name = carrier_name.as_str();

        let original =
            Listing::decode(&proto.code.instructions).map_err(|source| TransformError::Decode {
                function: function.clone(),
                source,
            })?;

        let mut out = proto.clone();
        out.local_names.push(name.to_string());
        let slot = u16::try_from(out.local_names.len() - 1).map_err(|_| TransformError::Capacity {
            function: function.clone(),
            what: "locals",
        })?;
        if out.code.constants.len() > usize::from(u16::MAX) {
            return Err(TransformError::Capacity {
                function,
                what: "constants",
            });
        }
        let key = out.code.intern_constant(Value::string(name));

        let mut listing = original.clone();
        let cleanup = listing.new_label();
        listing.prepend([Item::Instr(Instruction::jump(Opcode::SetupFinally, cleanup))]);
        listing.mark(cleanup);
        listing.push(Instruction::with_u16(Opcode::GetLocal, slot));
        listing.push(Instruction::simple(Opcode::Locals));
        listing.push(Instruction::with_u16(Opcode::Constant, key));
        listing.push(Instruction::simple(Opcode::RemoveKey));
        listing.push(Instruction::simple(Opcode::StoreLocals));
        listing.push(Instruction::simple(Opcode::EndFinally));
        // Reached only if the body falls off its end.
        listing.push(Instruction::simple(Opcode::Null));
        listing.push(Instruction::simple(Opcode::Return));

        out.code.instructions = listing.assemble().map_err(|source| TransformError::Assemble {
            function: function.clone(),
            source,
        })?;

        let carrier = Arc::new(Carrier::new());
        match self.convention {
            CarrierConvention::Receiver => out.params.insert(0, name.to_string()),
            CarrierConvention::Keyword => {
                out.params.push(name.to_string());
                out.defaults.push(Value::Carrier(Arc::clone(&carrier)));
            }
        }

        if self.validate {
            validate(&out).map_err(|errors| TransformError::Invalid {
                function: function.clone(),
                errors,
            })?;
        }
        if out.arity() != proto.arity() + 1 {
            return Err(TransformError::ArityMismatch {
                function,
                expected: proto.arity() + 1,
                found: out.arity(),
            });
        }
        verify_body_preserved(&function, &original, &out.code.instructions)?;

        tracing::debug!(
            function = %function,
            convention = %self.convention,
            carrier = name,
            "rewrote function"
        );
        tracing::trace!("{}", out.describe());

        Ok(Rewritten {
            proto: Arc::new(out),
            carrier,
            carrier_name: name.to_string(),
        })
    }

    /// Check the signature and pick the carrier name for `proto`.
    fn resolve_name(&self, proto: &FunctionProto) -> Result<String, TransformError> {
        let incompatible = |reason: String| TransformError::IncompatibleSignature {
            function: proto.name.clone(),
            reason,
        };

        if self.convention == CarrierConvention::Keyword {
            if let Some(rest) = &proto.varargs {
                return Err(incompatible(format!(
                    "the keyword carrier cannot follow the variadic parameter '*{}'",
                    rest
                )));
            }
        }

        match &self.carrier_name {
            Some(name) if is_bound(proto, name) => Err(incompatible(format!(
                "carrier name '{}' is already bound in the function",
                name
            ))),
            Some(name) => Ok(name.clone()),
            None => {
                let mut name = self.convention.default_name().to_string();
                while is_bound(proto, &name) {
                    name.push('_');
                }
                Ok(name)
            }
        }
    }
}

fn is_bound(proto: &FunctionProto, name: &str) -> bool {
    proto.params.iter().any(|p| p == name)
        || proto.varargs.as_deref() == Some(name)
        || proto.varkwargs.as_deref() == Some(name)
        || proto.binds(name)
}

/// Check that `rewritten` is the prologue followed by exactly the original
/// items, with branch labels mapped one-to-one.
fn verify_body_preserved(
    function: &str,
    original: &Listing,
    rewritten: &[u8],
) -> Result<(), TransformError> {
    let decoded = Listing::decode(rewritten).map_err(|source| TransformError::Decode {
        function: function.to_string(),
        source,
    })?;
    let altered = |index: usize| TransformError::BodyAltered {
        function: function.to_string(),
        index,
    };

    let items = decoded.items();
    match items.first() {
        Some(Item::Instr(first)) if first.opcode == Opcode::SetupFinally => {}
        _ => return Err(altered(0)),
    }
    let body = items
        .get(1..1 + original.items().len())
        .ok_or_else(|| altered(original.items().len()))?;

    let mut forward: HashMap<Label, Label> = HashMap::new();
    let mut backward: HashMap<Label, Label> = HashMap::new();
    let mut same_label = |a: Label, b: Label| {
        *forward.entry(a).or_insert(b) == b && *backward.entry(b).or_insert(a) == a
    };

    for (index, (before, after)) in original.items().iter().zip(body).enumerate() {
        let same = match (before, after) {
            (Item::Mark(a), Item::Mark(b)) => same_label(*a, *b),
            (Item::Instr(a), Item::Instr(b)) => {
                a.opcode == b.opcode
                    && match (&a.operand, &b.operand) {
                        (Operand::Jump(x), Operand::Jump(y)) => same_label(*x, *y),
                        (x, y) => x == y,
                    }
            }
            _ => false,
        };
        if !same {
            return Err(altered(index));
        }
    }
    Ok(())
}
