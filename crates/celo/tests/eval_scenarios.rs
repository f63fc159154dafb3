//! End-to-end conformance scenarios evaluated through the public API.

use std::sync::Arc;

use celo::{
    Activation, DynField, DynStructType, Environment, ErrorKind, EvalResult, Value, json_to_value,
};
use pretty_assertions::assert_eq;

fn eval(source: &str) -> EvalResult<Value> {
    let env = Environment::new("");
    let program = env.compile(source).expect("expression should parse");
    program.evaluate(&Activation::new())
}

fn eval_with(source: &str, activation: &Activation) -> EvalResult<Value> {
    let env = Environment::new("");
    let program = env.compile(source).expect("expression should parse");
    program.evaluate(activation)
}

#[test]
fn integer_literals_and_min_negation() {
    assert_eq!(eval("0").unwrap(), Value::Int(0));
    assert_eq!(
        eval("-9223372036854775808").unwrap(),
        Value::Int(-9_223_372_036_854_775_808)
    );
    let err = eval("-(-9223372036854775808)").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Overflow);
    assert!(err.message().contains("return error for overflow"));
}

#[test]
fn bound_variables_compare() {
    let mut activation = Activation::new();
    activation.bind("x", Value::Int(113)).bind("tot", Value::Int(355));
    assert_eq!(eval_with("x > tot", &activation).unwrap(), Value::Bool(false));
}

#[test]
fn exists_masks_error_behind_later_match() {
    assert_eq!(eval("[1, 'foo', 3].exists(e, e != '1')").unwrap(), Value::Bool(true));
}

#[test]
fn exists_surfaces_error_when_nothing_matches() {
    let err = eval("[1, 'foo', 3].exists(e, e == '10')").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchOverload);
    assert!(err.message().contains("no such overload"));
}

#[test]
fn map_equality_is_order_insensitive_but_value_sensitive() {
    assert_eq!(eval("{'k':'v'} == {'k':'v1'}").unwrap(), Value::Bool(false));
    assert_eq!(
        eval("{'k1':'v1','k2':'v2'} == {'k2':'v2','k1':'v1'}").unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn timestamp_projection_across_timezone() {
    assert_eq!(
        eval("timestamp('2009-02-13T23:31:30Z').getDayOfMonth('+11:00')").unwrap(),
        Value::Int(13)
    );
}

#[test]
fn timestamp_arithmetic_out_of_range() {
    let err = eval("timestamp('9999-12-31T23:59:59Z') + duration('10s')").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);
    assert!(err.message().contains("range"));
}

#[test]
fn struct_literal_resolves_through_container() {
    let ty = Arc::new(
        DynStructType::new("cel.expr.conformance.proto3.TestAllTypes")
            .with_field("single_int32_wrapper", DynField::Wrapper),
    );
    let mut env = Environment::new("cel.expr.conformance.proto3");
    env.register_struct_type("cel.expr.conformance.proto3.TestAllTypes", ty);
    let program = env
        .compile("TestAllTypes{single_int32_wrapper: 642}.single_int32_wrapper")
        .unwrap();
    assert_eq!(program.evaluate(&Activation::new()).unwrap(), Value::Int(642));
}

#[test]
fn has_on_map_keys() {
    assert_eq!(eval("has({'a':1}.a)").unwrap(), Value::Bool(true));
    assert_eq!(eval("has({'a':1}.b)").unwrap(), Value::Bool(false));
}

#[test]
fn longest_prefix_binding_beats_field_selection() {
    let env = Environment::new("a.b");
    let mut activation = Activation::new();
    activation.bind("a.b.c", Value::from("yeah"));
    activation.bind("a.b", json_to_value(&serde_json::json!({"c": "oops"})));
    let program = env.compile("a.b.c").unwrap();
    assert_eq!(program.evaluate(&activation).unwrap(), Value::from("yeah"));
}

#[test]
fn shorter_prefix_falls_back_to_field_selection() {
    let env = Environment::new("a.b");
    let mut activation = Activation::new();
    activation.bind("a.b", json_to_value(&serde_json::json!({"c": "via-field"})));
    let program = env.compile("a.b.c").unwrap();
    assert_eq!(program.evaluate(&activation).unwrap(), Value::from("via-field"));
}

#[test]
fn bare_dyn_is_an_unknown_variable() {
    let err = eval("dyn").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndeclaredReference);
    // as a call it is the identity conversion
    assert_eq!(eval("dyn(5)").unwrap(), Value::Int(5));
}

#[test]
fn unparse_round_trips_through_the_program_api() {
    let env = Environment::new("");
    let program = env.compile("[1, 2, 3].map(v, v * 2)[1] == 4 ? 'yes' : 'no'").unwrap();
    let printed = program.unparse();
    let reparsed = env.compile(&printed).unwrap();
    assert_eq!(reparsed.evaluate(&Activation::new()).unwrap(), Value::from("yes"));
    assert_eq!(reparsed.unparse(), printed);
}

#[test]
fn evaluation_is_deterministic() {
    let env = Environment::new("");
    let program = env.compile("{'a': 1, 'b': 2}.map(k, k)").unwrap();
    let first = program.evaluate(&Activation::new()).unwrap();
    let second = program.evaluate(&Activation::new()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, Value::list(vec![Value::from("a"), Value::from("b")]));
}
