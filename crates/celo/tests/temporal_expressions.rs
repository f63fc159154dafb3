//! Timestamp and duration behavior through the expression surface.

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
fn timestamp_plus_duration_commutes() {
    assert_eq!(
        eval("timestamp('2009-02-13T23:31:30Z') + duration('30s') == timestamp('2009-02-13T23:32:00Z')").unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        eval("duration('30s') + timestamp('2009-02-13T23:31:30Z') == timestamp('2009-02-13T23:32:00Z')").unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn timestamp_difference_is_a_duration() {
    assert_eq!(
        eval("timestamp('2009-02-13T23:32:00Z') - timestamp('2009-02-13T23:31:30Z') == duration('30s')").unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        eval("timestamp('2009-02-13T23:32:00Z') - duration('1m') == timestamp('2009-02-13T23:31:00Z')").unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn duration_arithmetic_and_comparison() {
    assert_eq!(eval("duration('1h') + duration('30m') == duration('90m')").unwrap(), Value::Bool(true));
    assert_eq!(eval("duration('1h') - duration('1h') == duration('0s')").unwrap(), Value::Bool(true));
    assert_eq!(eval("duration('59s') < duration('1m')").unwrap(), Value::Bool(true));
    assert_eq!(eval("-duration('10s') == duration('-10s')").unwrap(), Value::Bool(true));
}

#[test]
fn timestamps_compare_chronologically() {
    assert_eq!(
        eval("timestamp('2009-01-01T00:00:00Z') < timestamp('2010-01-01T00:00:00Z')").unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn parse_range_errors() {
    assert_eq!(kind("timestamp('10000-01-01T00:00:00Z')"), ErrorKind::Range);
    assert_eq!(kind("timestamp('not a timestamp')"), ErrorKind::Range);
    assert_eq!(kind("timestamp('0000-12-31T23:59:59Z')"), ErrorKind::Range);
}

#[test]
fn arithmetic_range_errors() {
    assert_eq!(kind("timestamp('0001-01-01T00:00:00Z') - duration('1s')"), ErrorKind::Range);
}

#[test]
fn accessors_default_to_utc() {
    assert_eq!(eval("timestamp('2009-02-13T23:31:30Z').getFullYear()").unwrap(), Value::Int(2009));
    assert_eq!(eval("timestamp('2009-02-13T23:31:30Z').getMonth()").unwrap(), Value::Int(1));
    assert_eq!(eval("timestamp('2009-02-13T23:31:30Z').getDate()").unwrap(), Value::Int(13));
    assert_eq!(eval("timestamp('2009-02-13T23:31:30Z').getDayOfWeek()").unwrap(), Value::Int(5));
    assert_eq!(eval("timestamp('2009-02-13T23:31:30Z').getHours()").unwrap(), Value::Int(23));
    assert_eq!(eval("timestamp('2009-02-13T23:31:30.125Z').getMilliseconds()").unwrap(), Value::Int(125));
}

#[test]
fn accessors_accept_iana_names() {
    assert_eq!(
        eval("timestamp('2009-07-01T12:00:00Z').getHours('America/New_York')").unwrap(),
        Value::Int(8)
    );
    assert_eq!(kind("timestamp('2009-07-01T12:00:00Z').getHours('Not/AZone')"), ErrorKind::InvalidArgument);
}

#[test]
fn duration_accessors() {
    assert_eq!(eval("duration('90m').getHours()").unwrap(), Value::Int(1));
    assert_eq!(eval("duration('90m').getMinutes()").unwrap(), Value::Int(90));
    assert_eq!(eval("duration('1.5s').getMilliseconds()").unwrap(), Value::Int(500));
}

#[test]
fn conversions_round_trip() {
    assert_eq!(eval("int(timestamp('1970-01-01T01:00:00Z'))").unwrap(), Value::Int(3600));
    assert_eq!(eval("timestamp(3600) == timestamp('1970-01-01T01:00:00Z')").unwrap(), Value::Bool(true));
    assert_eq!(eval("string(duration('5400s'))").unwrap(), Value::from("5400s"));
    assert_eq!(
        eval("string(timestamp('2009-02-13T23:31:30Z'))").unwrap(),
        Value::from("2009-02-13T23:31:30Z")
    );
    assert_eq!(eval("duration('1h2m3s') == duration('3723s')").unwrap(), Value::Bool(true));
}

#[test]
fn invalid_duration_strings_error() {
    assert_eq!(kind("duration('10')"), ErrorKind::InvalidArgument);
    assert_eq!(kind("duration('abc')"), ErrorKind::InvalidArgument);
}
