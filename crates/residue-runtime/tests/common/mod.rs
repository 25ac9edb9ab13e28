//! Shared helpers for runtime integration tests
#![allow(dead_code)]

use residue_runtime::{CallArgs, Function, FunctionBuilder, RuntimeError, Value, Vm};
use std::sync::Arc;

pub fn num(n: f64) -> Value {
    Value::Number(n)
}

pub fn text(s: &str) -> Value {
    Value::string(s)
}

pub fn build(builder: FunctionBuilder) -> Arc<Function> {
    builder.build_function().expect("test function should build")
}

/// Run `function` on a fresh VM with positional arguments.
pub fn call(function: &Arc<Function>, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Vm::new().call_function(function, CallArgs::positional(args))
}
