//! Arithmetic operator semantics: checked integer math, IEEE doubles, and
//! overload mismatches.

use celo::{Activation, Environment, ErrorKind, EvalResult, Value};
use pretty_assertions::assert_eq;

fn eval(source: &str) -> EvalResult<Value> {
    let env = Environment::new("");
    env.compile(source).expect("expression should parse").evaluate(&Activation::new())
}

fn kind(source: &str) -> ErrorKind {
    eval(source).expect_err("expected evaluation error").kind()
}

#[test]
fn int_arithmetic() {
    assert_eq!(eval("2 + 3 * 4").unwrap(), Value::Int(14));
    assert_eq!(eval("(2 + 3) * 4").unwrap(), Value::Int(20));
    assert_eq!(eval("7 / 2").unwrap(), Value::Int(3));
    assert_eq!(eval("7 % 2").unwrap(), Value::Int(1));
    assert_eq!(eval("-7 % 2").unwrap(), Value::Int(-1));
}

#[test]
fn int_overflow_is_an_error() {
    assert_eq!(kind("9223372036854775807 + 1"), ErrorKind::Overflow);
    assert_eq!(kind("-9223372036854775808 - 1"), ErrorKind::Overflow);
    assert_eq!(kind("-9223372036854775808 * -1"), ErrorKind::Overflow);
    assert_eq!(kind("-9223372036854775808 / -1"), ErrorKind::Overflow);
}

#[test]
fn uint_arithmetic_and_underflow() {
    assert_eq!(eval("3u + 4u").unwrap(), Value::Uint(7));
    assert_eq!(eval("0u - 0u").unwrap(), Value::Uint(0));
    assert_eq!(kind("0u - 1u"), ErrorKind::Overflow);
    assert_eq!(kind("18446744073709551615u + 1u"), ErrorKind::Overflow);
}

#[test]
fn division_and_modulus_by_zero() {
    assert_eq!(kind("1 / 0"), ErrorKind::DivideByZero);
    assert_eq!(kind("1u / 0u"), ErrorKind::DivideByZero);
    assert_eq!(kind("1 % 0"), ErrorKind::ModulusByZero);
    assert_eq!(kind("1u % 0u"), ErrorKind::ModulusByZero);
    assert!(eval("1 / 0").unwrap_err().message().contains("divide by zero"));
    assert!(eval("1 % 0").unwrap_err().message().contains("modulus by zero"));
}

#[test]
fn double_division_follows_ieee() {
    assert_eq!(eval("1.0 / 0.0").unwrap(), Value::Double(f64::INFINITY));
    // double overflow and underflow are silent
    assert_eq!(eval("1e308 * 10.0").unwrap(), Value::Double(f64::INFINITY));
    assert_eq!(eval("1e-323 / 1e10").unwrap(), Value::Double(0.0));
}

#[test]
fn modulus_is_not_defined_on_double() {
    assert_eq!(kind("5.0 % 2.0"), ErrorKind::NoSuchOverload);
}

#[test]
fn mixed_numeric_arithmetic_has_no_overload() {
    assert_eq!(kind("1 + 1u"), ErrorKind::NoSuchOverload);
    assert_eq!(kind("1 + 1.0"), ErrorKind::NoSuchOverload);
    assert_eq!(kind("1u + 1.0"), ErrorKind::NoSuchOverload);
}

#[test]
fn unary_minus_restrictions() {
    assert_eq!(eval("-(5)").unwrap(), Value::Int(-5));
    assert_eq!(eval("-1.5").unwrap(), Value::Double(-1.5));
    assert_eq!(kind("-(1u)"), ErrorKind::NoSuchOverload);
    assert_eq!(kind("-true"), ErrorKind::NoSuchOverload);
}

#[test]
fn concatenation_overloads() {
    assert_eq!(eval("'foo' + 'bar'").unwrap(), Value::from("foobar"));
    assert_eq!(eval("b'ab' + b'cd'").unwrap(), Value::bytes(b"abcd".to_vec()));
    assert_eq!(
        eval("[1, 2] + [3]").unwrap(),
        Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
}

#[test]
fn comparisons_require_matching_types() {
    assert_eq!(eval("1 < 2").unwrap(), Value::Bool(true));
    assert_eq!(eval("2u >= 2u").unwrap(), Value::Bool(true));
    assert_eq!(eval("'a' < 'b'").unwrap(), Value::Bool(true));
    assert_eq!(eval("b'a' < b'b'").unwrap(), Value::Bool(true));
    assert_eq!(eval("false < true").unwrap(), Value::Bool(true));
    assert_eq!(kind("1 < 2.0"), ErrorKind::NoSuchOverload);
    assert_eq!(kind("[1] < [2]"), ErrorKind::NoSuchOverload);
    assert_eq!(kind("{'a': 1} < {'b': 2}"), ErrorKind::NoSuchOverload);
    assert_eq!(kind("null < null"), ErrorKind::NoSuchOverload);
}

#[test]
fn numeric_equality_crosses_variants() {
    assert_eq!(eval("1 == 1u").unwrap(), Value::Bool(true));
    assert_eq!(eval("1 == 1.0").unwrap(), Value::Bool(true));
    assert_eq!(eval("1u == 1.0").unwrap(), Value::Bool(true));
    assert_eq!(eval("1 == 1.5").unwrap(), Value::Bool(false));
    assert_eq!(eval("-1 == 18446744073709551615u").unwrap(), Value::Bool(false));
    // i64::MAX is not representable as f64; the rounded double is unequal
    assert_eq!(eval("9223372036854775807 == 9223372036854775807.0").unwrap(), Value::Bool(false));
}

#[test]
fn nan_ordering_is_false_not_an_error() {
    assert_eq!(eval("0.0/0.0 < 1.0").unwrap(), Value::Bool(false));
    assert_eq!(eval("1.0 < 0.0/0.0").unwrap(), Value::Bool(false));
    assert_eq!(eval("0.0/0.0 >= 0.0/0.0").unwrap(), Value::Bool(false));
}

#[test]
fn nan_equality_follows_cel_convention() {
    assert_eq!(eval("0.0/0.0 == 0.0/0.0").unwrap(), Value::Bool(true));
    assert_eq!(eval("0.0/0.0 != 1.0").unwrap(), Value::Bool(true));
}

#[test]
fn self_equality_holds_for_every_value() {
    for source in ["null", "true", "3", "3u", "3.5", "'s'", "b'x'", "[1, [2]]", "{'k': {'n': 1}}", "type(1)"] {
        let expr = format!("({source}) == ({source})");
        assert_eq!(eval(&expr).unwrap(), Value::Bool(true), "self-equality failed for {source}");
    }
}
