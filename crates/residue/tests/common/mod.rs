//! Sample functions shared by the capture tests
#![allow(dead_code)]

use residue_runtime::{Function, FunctionBuilder, LocalsSnapshot, Opcode, Value};
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

pub fn snapshot(entries: &[(&str, Value)]) -> LocalsSnapshot {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// `f(x) { z = 2 * x; return z }`
pub fn f() -> Arc<Function> {
    let mut b = FunctionBuilder::new("f");
    b.param("x").doc("Double x.");
    b.constant(num(2.0)).get_local("x").op(Opcode::Mul).set_local("z");
    b.get_local("z").op(Opcode::Return);
    build(b)
}

/// `g(a, b, c) { s = a + b + c; p = a * b * c; return s < p }`
pub fn g() -> Arc<Function> {
    let mut b = FunctionBuilder::new("g");
    b.param("a").param("b").param("c");
    b.get_local("a").get_local("b").op(Opcode::Add);
    b.get_local("c").op(Opcode::Add).set_local("s");
    b.get_local("a").get_local("b").op(Opcode::Mul);
    b.get_local("c").op(Opcode::Mul).set_local("p");
    b.get_local("s").get_local("p").op(Opcode::Less).op(Opcode::Return);
    build(b)
}

/// `h(x, *rest) { return (x, rest) }`
pub fn h() -> Arc<Function> {
    let mut b = FunctionBuilder::new("h");
    b.param("x").varargs("rest");
    b.get_local("x").get_local("rest").op_u16(Opcode::Tuple, 2);
    b.op(Opcode::Return);
    build(b)
}

/// `opts(a, b=2, **opts) { s = a + b; return (s, opts) }`
pub fn opts() -> Arc<Function> {
    let mut b = FunctionBuilder::new("opts");
    b.param("a").param_with_default("b", num(2.0)).varkwargs("opts");
    b.get_local("a").get_local("b").op(Opcode::Add).set_local("s");
    b.get_local("s").get_local("opts").op_u16(Opcode::Tuple, 2);
    b.op(Opcode::Return);
    build(b)
}

/// `k(x) { y = x / 0 }`
pub fn k() -> Arc<Function> {
    let mut b = FunctionBuilder::new("k");
    b.param("x");
    b.get_local("x").constant(num(0.0)).op(Opcode::Div).set_local("y");
    b.op(Opcode::Null).op(Opcode::Return);
    build(b)
}

/// `fact(n) { if n <= 1 { return 1 }; m = fact(n - 1); return n * m }`,
/// recursing through the `fact` global.
pub fn fact() -> Arc<Function> {
    let mut b = FunctionBuilder::new("fact");
    b.param("n");
    let recurse = b.new_label();
    b.get_local("n").constant(num(1.0)).op(Opcode::LessEqual);
    b.jump(Opcode::JumpIfFalse, recurse);
    b.constant(num(1.0)).op(Opcode::Return);
    b.mark(recurse);
    b.get_global("fact").get_local("n").constant(num(1.0)).op(Opcode::Sub);
    b.call(1).set_local("m");
    b.get_local("n").get_local("m").op(Opcode::Mul).op(Opcode::Return);
    build(b)
}
