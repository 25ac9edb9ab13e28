//! Rewriting wrapper: results, captured locals, errors and scoping

mod common;

use common::{build, f, fact, g, h, k, num, opts, snapshot, text};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use residue::{
    into_value, new_vm, wrap, Capture, CarrierConvention, PersistentLocals, Transformer,
    WrapError,
};
use residue_config::{CaptureConfig, CarrierStyle, RuntimeConfig};
use residue_runtime::{CallArgs, Cell, Function, FunctionBuilder, Opcode, RuntimeError, Value, Vm};
use rstest::rstest;
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn wrap_with(function: &Arc<Function>, convention: CarrierConvention) -> PersistentLocals {
    PersistentLocals::with_transformer(function, &Transformer::new(convention))
        .expect("function should wrap")
}

fn positional(values: &[f64]) -> CallArgs {
    CallArgs::positional(values.iter().copied().map(num).collect())
}

fn keywords(entries: &[(&str, Value)]) -> Value {
    let entries: BTreeMap<String, Value> = entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();
    Value::map(entries)
}

/// `echo(<param>) { return <param> }`
fn echo(param: &str) -> Arc<Function> {
    let mut b = FunctionBuilder::new("echo");
    b.param(param);
    b.get_local(param).op(Opcode::Return);
    build(b)
}

// ============================================================================
// Scenarios
// ============================================================================

#[rstest]
#[case::receiver(CarrierConvention::Receiver)]
#[case::keyword(CarrierConvention::Keyword)]
fn test_double(#[case] convention: CarrierConvention) {
    let wrapped = wrap_with(&f(), convention);
    let mut vm = Vm::new();

    assert_eq!(wrapped.call(&mut vm, positional(&[2.0])), Ok(num(4.0)));
    assert_eq!(
        wrapped.locals(),
        snapshot(&[("x", num(2.0)), ("z", num(4.0))])
    );
}

#[rstest]
#[case::receiver(CarrierConvention::Receiver)]
#[case::keyword(CarrierConvention::Keyword)]
fn test_sum_and_product(#[case] convention: CarrierConvention) {
    let wrapped = wrap_with(&g(), convention);
    let mut vm = Vm::new();
    assert!(wrapped.locals().is_empty());

    assert_eq!(
        wrapped.call(&mut vm, positional(&[2.0, 3.0, 4.0])),
        Ok(Value::Bool(true))
    );
    let locals = wrapped.locals();
    assert_eq!(locals.keys().collect::<Vec<_>>(), vec!["a", "b", "c", "p", "s"]);
    assert_eq!(locals["s"], num(9.0));
    assert_eq!(locals["p"], num(24.0));
}

#[test]
fn test_rest_parameter() {
    let wrapped = wrap_with(&h(), CarrierConvention::Receiver);
    let mut vm = Vm::new();

    let rest = Value::tuple(vec![num(3.0), num(4.0)]);
    assert_eq!(
        wrapped.call(&mut vm, positional(&[2.0, 3.0, 4.0])),
        Ok(Value::tuple(vec![num(2.0), rest.clone()]))
    );
    assert_eq!(wrapped.locals(), snapshot(&[("x", num(2.0)), ("rest", rest)]));
}

#[test]
fn test_keyword_carrier_rejects_rest_parameter() {
    let err = PersistentLocals::with_keyword_carrier(&h()).unwrap_err();
    match err {
        WrapError::IncompatibleSignature { function, reason } => {
            assert_eq!(function, "h");
            assert!(reason.contains("*rest"), "{}", reason);
        }
        other => panic!("expected an incompatible signature, got {:?}", other),
    }
}

#[rstest]
#[case::receiver(CarrierConvention::Receiver)]
#[case::keyword(CarrierConvention::Keyword)]
fn test_error_still_captures(#[case] convention: CarrierConvention) {
    let wrapped = wrap_with(&k(), convention);
    let mut vm = Vm::new();

    assert_eq!(
        wrapped.call(&mut vm, positional(&[5.0])),
        Err(RuntimeError::DivideByZero)
    );
    let locals = wrapped.locals();
    assert_eq!(locals["x"], num(5.0));
    // never assigned on this run
    assert_eq!(locals["y"], Value::Null);
}

#[test]
fn test_raised_value_passes_through_unchanged() {
    let mut b = FunctionBuilder::new("fail");
    b.param("x");
    b.get_local("x").constant(num(1.0)).op(Opcode::Add).set_local("before");
    b.constant(text("boom")).op(Opcode::Raise);
    let function = build(b);

    let direct = Vm::new().call_function(&function, positional(&[1.0]));
    let wrapped = PersistentLocals::new(&function).unwrap();
    let captured = wrapped.call(&mut Vm::new(), positional(&[1.0]));

    assert_eq!(captured, direct);
    assert_eq!(captured, Err(RuntimeError::Raised(text("boom"))));
    assert_eq!(wrapped.locals()["before"], num(2.0));
}

// ============================================================================
// Snapshot lifecycle
// ============================================================================

#[test]
fn test_each_call_replaces_snapshot() {
    let wrapped = PersistentLocals::new(&g()).unwrap();
    let mut vm = Vm::new();

    wrapped.call(&mut vm, positional(&[2.0, 3.0, 4.0])).unwrap();
    wrapped.call(&mut vm, positional(&[1.0, 1.0, 1.0])).unwrap();

    assert_eq!(
        wrapped.locals(),
        snapshot(&[
            ("a", num(1.0)),
            ("b", num(1.0)),
            ("c", num(1.0)),
            ("s", num(3.0)),
            ("p", num(1.0)),
        ])
    );
}

#[rstest]
#[case::receiver(CarrierConvention::Receiver)]
#[case::keyword(CarrierConvention::Keyword)]
fn test_carrier_name_never_exposed(#[case] convention: CarrierConvention) {
    let wrapped = wrap_with(&f(), convention);
    wrapped.call(&mut Vm::new(), positional(&[1.0])).unwrap();
    assert!(!wrapped.locals().contains(convention.default_name()));
}

#[test]
fn test_failed_binding_keeps_previous_snapshot() {
    let wrapped = PersistentLocals::new(&f()).unwrap();
    let mut vm = Vm::new();
    wrapped.call(&mut vm, positional(&[2.0])).unwrap();

    let err = wrapped.call(&mut vm, CallArgs::new()).unwrap_err();
    assert_eq!(
        err,
        RuntimeError::type_error("f() missing required argument 'x'")
    );
    assert_eq!(wrapped.locals()["z"], num(4.0));
}

#[rstest]
#[case::receiver(CarrierConvention::Receiver, "self")]
#[case::keyword(CarrierConvention::Keyword, "_selfref")]
fn test_binding_errors_match_direct_call(
    #[case] convention: CarrierConvention,
    #[case] carrier: &str,
) {
    let original = g();
    let wrapped = wrap_with(&original, convention);

    let cases = vec![
        positional(&[1.0]),
        positional(&[1.0, 2.0, 3.0, 4.0]),
        positional(&[1.0, 2.0]).with_keyword("a", num(0.0)),
        positional(&[1.0, 2.0, 3.0]).with_keyword(carrier, num(0.0)),
    ];
    for args in cases {
        let direct = Vm::new().call_function(&original, args.clone());
        assert!(direct.is_err());
        assert_eq!(wrapped.call(&mut Vm::new(), args), direct);
    }
}

#[test]
fn test_keyword_arguments_forwarded() {
    let wrapped = PersistentLocals::with_keyword_carrier(&g()).unwrap();
    let args = positional(&[2.0])
        .with_keyword("c", num(4.0))
        .with_keyword("b", num(3.0));

    assert_eq!(wrapped.call(&mut Vm::new(), args), Ok(Value::Bool(true)));
    assert_eq!(wrapped.locals()["c"], num(4.0));
}

#[test]
fn test_keyword_carrier_captures_direct_calls() {
    let wrapped = PersistentLocals::with_keyword_carrier(&f()).unwrap();
    let mut vm = Vm::new();

    let result = vm.call_function(wrapped.transformed(), positional(&[7.0]));
    assert_eq!(result, Ok(num(14.0)));
    assert_eq!(wrapped.locals()["z"], num(14.0));
}

// ============================================================================
// Keyword collectors and carrier names
// ============================================================================

#[rstest]
#[case::receiver(CarrierConvention::Receiver)]
#[case::keyword(CarrierConvention::Keyword)]
fn test_keyword_collector(#[case] convention: CarrierConvention) {
    let original = opts();
    let wrapped = wrap_with(&original, convention);
    let args = positional(&[1.0]).with_keyword("z", num(5.0));

    let direct = Vm::new().call_function(&original, args.clone());
    assert_eq!(
        direct,
        Ok(Value::tuple(vec![num(3.0), keywords(&[("z", num(5.0))])]))
    );
    assert_eq!(wrapped.call(&mut Vm::new(), args), direct);

    let locals = wrapped.locals();
    assert_eq!(locals.keys().collect::<Vec<_>>(), vec!["a", "b", "opts", "s"]);
    assert_eq!(locals["b"], num(2.0));
    assert_eq!(locals["opts"], keywords(&[("z", num(5.0))]));
    assert!(!locals.contains(wrapped.carrier_name()));
}

#[rstest]
#[case::receiver(CarrierConvention::Receiver, "self")]
#[case::keyword(CarrierConvention::Keyword, "_selfref")]
fn test_keyword_named_like_carrier_goes_to_collector(
    #[case] convention: CarrierConvention,
    #[case] carrier: &str,
) {
    let original = opts();
    let wrapped = wrap_with(&original, convention);
    assert_eq!(wrapped.carrier_name(), carrier);
    let args = positional(&[1.0]).with_keyword(carrier, num(9.0));

    let direct = Vm::new().call_function(&original, args.clone());
    assert_eq!(
        direct,
        Ok(Value::tuple(vec![num(3.0), keywords(&[(carrier, num(9.0))])]))
    );
    assert_eq!(wrapped.call(&mut Vm::new(), args), direct);

    let locals = wrapped.locals();
    assert_eq!(locals.keys().collect::<Vec<_>>(), vec!["a", "b", "opts", "s"]);
    assert_eq!(locals["opts"], keywords(&[(carrier, num(9.0))]));
}

#[rstest]
#[case::receiver(CarrierStyle::Receiver, "self")]
#[case::keyword(CarrierStyle::Keyword, "_selfref")]
fn test_default_carrier_name_steps_aside(#[case] style: CarrierStyle, #[case] param: &str) {
    let original = echo(param);
    let capture = wrap(&original, &CaptureConfig::rewrite(style)).unwrap();

    assert_eq!(capture.signature(), format!("({})", param));
    assert_eq!(capture.call(&mut Vm::new(), positional(&[7.0])), Ok(num(7.0)));
    assert_eq!(capture.locals(), snapshot(&[(param, num(7.0))]));

    let by_name = CallArgs::new().with_keyword(param, num(8.0));
    assert_eq!(capture.call(&mut Vm::new(), by_name), Ok(num(8.0)));
    assert_eq!(capture.locals(), snapshot(&[(param, num(8.0))]));
}

#[test]
fn test_explicit_carrier_name_must_be_free() {
    let config = CaptureConfig {
        carrier_name: Some("self".to_string()),
        ..CaptureConfig::default()
    };
    match wrap(&echo("self"), &config) {
        Err(WrapError::IncompatibleSignature { function, reason }) => {
            assert_eq!(function, "echo");
            assert!(reason.contains("'self'"), "{}", reason);
        }
        Err(other) => panic!("expected an incompatible signature, got {:?}", other),
        Ok(_) => panic!("expected wrapping to fail"),
    }
}

// ============================================================================
// Scoping
// ============================================================================

/// `inner() { return y }` closed over `y`, or `inner() { y = 99 }` when `assign`.
fn closure_over_y(cell: &Cell, assign: bool) -> Arc<Function> {
    let mut b = FunctionBuilder::new("inner");
    b.free("y");
    if assign {
        b.constant(num(99.0)).set_deref("y");
    }
    b.get_deref("y").op(Opcode::Return);
    let proto = b.build().unwrap();
    Arc::new(Function::with_cells(Arc::new(proto), vec![cell.clone()]))
}

#[test]
fn test_enclosing_variable_read_shows_outer_value() {
    let cell = Cell::new(num(10.0));
    let wrapped = PersistentLocals::new(&closure_over_y(&cell, false)).unwrap();

    assert_eq!(wrapped.call(&mut Vm::new(), CallArgs::new()), Ok(num(10.0)));
    assert_eq!(wrapped.locals(), snapshot(&[("y", num(10.0))]));
}

#[test]
fn test_enclosing_variable_reassigned_shows_new_value() {
    let cell = Cell::new(num(10.0));
    let wrapped = PersistentLocals::new(&closure_over_y(&cell, true)).unwrap();

    wrapped.call(&mut Vm::new(), CallArgs::new()).unwrap();
    assert_eq!(wrapped.locals()["y"], num(99.0));
    assert_eq!(cell.get(), num(99.0));
}

#[test]
fn test_local_shadows_global() {
    let mut b = FunctionBuilder::new("shadow");
    b.constant(num(5.0)).set_local("y");
    b.get_global("y").get_local("y").op(Opcode::Add).op(Opcode::Return);
    let wrapped = PersistentLocals::new(&build(b)).unwrap();

    let mut vm = Vm::new();
    vm.set_global("y", num(10.0));
    assert_eq!(wrapped.call(&mut vm, CallArgs::new()), Ok(num(15.0)));
    assert_eq!(wrapped.locals(), snapshot(&[("y", num(5.0))]));
}

#[test]
fn test_cell_parameter_reports_cell_value() {
    let mut inc = FunctionBuilder::new("inc");
    inc.free("x");
    inc.get_deref("x").constant(num(1.0)).op(Opcode::Add).set_deref("x");
    inc.op(Opcode::Null).op(Opcode::Return);
    let inc = inc.build().unwrap();

    let mut outer = FunctionBuilder::new("outer");
    outer.param("x").cell("x");
    outer.load_cell("x").make_closure(inc, 1).set_local("bump");
    outer.get_local("bump").call(0).op(Opcode::Pop);
    outer.get_deref("x").op(Opcode::Return);
    let wrapped = PersistentLocals::new(&build(outer)).unwrap();

    assert_eq!(wrapped.call(&mut Vm::new(), positional(&[1.0])), Ok(num(2.0)));
    assert_eq!(wrapped.locals()["x"], num(2.0));
    assert!(wrapped.locals().contains("bump"));
}

#[test]
fn test_globals_read_at_call_time() {
    let mut b = FunctionBuilder::new("scaled");
    b.param("x");
    b.get_local("x").get_global("scale").op(Opcode::Mul).op(Opcode::Return);
    let wrapped = PersistentLocals::new(&build(b)).unwrap();
    let mut vm = Vm::new();

    vm.set_global("scale", num(2.0));
    assert_eq!(wrapped.call(&mut vm, positional(&[3.0])), Ok(num(6.0)));
    vm.set_global("scale", num(3.0));
    assert_eq!(wrapped.call(&mut vm, positional(&[3.0])), Ok(num(9.0)));
}

#[test]
fn test_survives_removal_of_original_global() {
    let original = f();
    let mut vm = Vm::new();
    vm.set_global("f", Value::Function(Arc::clone(&original)));
    let wrapped = PersistentLocals::new(&original).unwrap();

    vm.remove_global("f");
    assert_eq!(wrapped.call(&mut vm, positional(&[4.0])), Ok(num(8.0)));
}

// ============================================================================
// Recursion and depth
// ============================================================================

#[test]
fn test_recursion_through_original_keeps_outer_locals() {
    let original = fact();
    let wrapped = PersistentLocals::new(&original).unwrap();
    let mut vm = Vm::new();
    vm.set_global("fact", Value::Function(original));

    assert_eq!(wrapped.call(&mut vm, positional(&[5.0])), Ok(num(120.0)));
    assert_eq!(wrapped.locals(), snapshot(&[("n", num(5.0)), ("m", num(24.0))]));
}

#[test]
fn test_recursion_through_transformed_ends_with_outermost() {
    let wrapped = PersistentLocals::with_keyword_carrier(&fact()).unwrap();
    let mut vm = Vm::new();
    vm.set_global("fact", Value::Function(Arc::clone(wrapped.transformed())));

    assert_eq!(wrapped.call(&mut vm, positional(&[5.0])), Ok(num(120.0)));
    assert_eq!(wrapped.locals()["n"], num(5.0));
}

#[test]
fn test_stack_overflow_unwinds_through_capture() {
    let original = fact();
    let wrapped = PersistentLocals::new(&original).unwrap();
    let mut vm = new_vm(&RuntimeConfig { max_call_depth: 3 });
    vm.set_global("fact", Value::Function(original));

    assert_eq!(
        wrapped.call(&mut vm, positional(&[10.0])),
        Err(RuntimeError::StackOverflow { depth: 3 })
    );
    assert_eq!(wrapped.locals(), snapshot(&[("n", num(10.0)), ("m", Value::Null)]));
    assert_eq!(vm.frame_depth(), 0);
}

// ============================================================================
// Entry points
// ============================================================================

#[test]
fn test_wrap_from_config() {
    let config = CaptureConfig {
        carrier_name: Some("_frame".to_string()),
        ..CaptureConfig::rewrite(CarrierStyle::Keyword)
    };
    let capture = wrap(&f(), &config).unwrap();

    assert_eq!(capture.name(), "f");
    assert_eq!(capture.signature(), "(x)");
    assert_eq!(capture.call(&mut Vm::new(), positional(&[3.0])), Ok(num(6.0)));
    assert_eq!(capture.locals(), snapshot(&[("x", num(3.0)), ("z", num(6.0))]));
    capture.reset();
    assert!(capture.locals().is_empty());
}

#[test]
fn test_call_isolated_uses_runtime_config() {
    let capture = wrap(&g(), &CaptureConfig::default()).unwrap();
    let result = capture.call_isolated(&RuntimeConfig::default(), positional(&[1.0, 2.0, 3.0]));
    assert_eq!(result, Ok(Value::Bool(false)));
    assert_eq!(capture.locals()["s"], num(6.0));
}

#[test]
fn test_capture_callable_from_bytecode() {
    let capture: Arc<dyn Capture> = Arc::from(wrap(&f(), &CaptureConfig::default()).unwrap());

    let mut caller = FunctionBuilder::new("caller");
    caller.get_global("twice").constant(num(21.0)).call(1).op(Opcode::Return);

    let mut vm = Vm::new();
    vm.set_global("twice", into_value(Arc::clone(&capture)));
    assert_eq!(vm.call_function(&build(caller), CallArgs::new()), Ok(num(42.0)));
    assert_eq!(capture.locals()["x"], num(21.0));
}

// ============================================================================
// Properties
// ============================================================================

/// `piecewise(a, b) { t = a * b; if t > 10 { return t - a }; u = t + b; return u % 7 }`
fn piecewise() -> Arc<Function> {
    let mut b = FunctionBuilder::new("piecewise");
    b.param("a").param("b");
    let small = b.new_label();
    b.get_local("a").get_local("b").op(Opcode::Mul).set_local("t");
    b.get_local("t").constant(num(10.0)).op(Opcode::Greater);
    b.jump(Opcode::JumpIfFalse, small);
    b.get_local("t").get_local("a").op(Opcode::Sub).op(Opcode::Return);
    b.mark(small);
    b.get_local("t").get_local("b").op(Opcode::Add).set_local("u");
    b.get_local("u").constant(num(7.0)).op(Opcode::Mod).op(Opcode::Return);
    build(b)
}

proptest! {
    #[test]
    fn prop_wrapped_call_matches_direct(
        a in -50i32..50,
        b in -50i32..50,
        by_keyword in any::<bool>(),
        keyword_carrier in any::<bool>(),
    ) {
        let original = piecewise();
        let convention = if keyword_carrier {
            CarrierConvention::Keyword
        } else {
            CarrierConvention::Receiver
        };
        let wrapped = wrap_with(&original, convention);
        let args = if by_keyword {
            positional(&[a as f64]).with_keyword("b", num(b as f64))
        } else {
            positional(&[a as f64, b as f64])
        };

        let direct = Vm::new().call_function(&original, args.clone());
        prop_assert_eq!(wrapped.call(&mut Vm::new(), args), direct);

        let locals = wrapped.locals();
        prop_assert_eq!(&locals["a"], &num(a as f64));
        prop_assert_eq!(&locals["t"], &num((a * b) as f64));
    }
}
