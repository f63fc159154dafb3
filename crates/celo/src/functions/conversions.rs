//! Type conversion functions: `int`, `uint`, `double`, `string`, `bytes`,
//! `duration`, `timestamp`, `type`, and `dyn`.
//!
//! Numeric conversions round half away from zero; conversions whose result
//! leaves the target range are overflow errors. All conversions are also
//! registered receiver-style so `x.int()` style calls resolve, matching the
//! global forms.

use std::sync::Arc;

use crate::{
    error::{EvalError, EvalResult},
    functions::{FunctionRegistry, ParamKind},
    temporal::{Duration, Timestamp},
    value::{Value, format_double},
};

pub(super) fn register(registry: &mut FunctionRegistry) {
    register_int(registry);
    register_uint(registry);
    register_double(registry);
    register_string(registry);
    register_bytes(registry);
    register_duration(registry);
    register_timestamp(registry);
    registry.register_fn("type", &[ParamKind::Dyn], false, |args| {
        Ok(Value::Type(args[0].cel_type()))
    });
    // dyn() erases static type information; at runtime it is the identity
    registry.register_fn("dyn", &[ParamKind::Dyn], false, |args| Ok(args[0].clone()));
}

fn register_int(registry: &mut FunctionRegistry) {
    registry.register_fn("int", &[ParamKind::Int], false, |args| Ok(args[0].clone()));
    registry.register_fn("int", &[ParamKind::Uint], false, |args| {
        let Value::Uint(u) = &args[0] else { unreachable!() };
        i64::try_from(*u).map(Value::Int).map_err(|_| EvalError::overflow())
    });
    registry.register_fn("int", &[ParamKind::Double], false, |args| {
        let Value::Double(d) = &args[0] else { unreachable!() };
        double_to_int(*d)
    });
    registry.register_fn("int", &[ParamKind::String], false, |args| {
        let Value::String(s) = &args[0] else { unreachable!() };
        s.parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EvalError::conversion(format!("invalid int conversion: '{s}'")))
    });
    registry.register_fn("int", &[ParamKind::Timestamp], false, |args| {
        let Value::Timestamp(t) = &args[0] else { unreachable!() };
        Ok(Value::Int(t.epoch_seconds()))
    });
}

fn register_uint(registry: &mut FunctionRegistry) {
    registry.register_fn("uint", &[ParamKind::Uint], false, |args| Ok(args[0].clone()));
    registry.register_fn("uint", &[ParamKind::Int], false, |args| {
        let Value::Int(i) = &args[0] else { unreachable!() };
        u64::try_from(*i).map(Value::Uint).map_err(|_| EvalError::overflow())
    });
    registry.register_fn("uint", &[ParamKind::Double], false, |args| {
        let Value::Double(d) = &args[0] else { unreachable!() };
        double_to_uint(*d)
    });
    registry.register_fn("uint", &[ParamKind::String], false, |args| {
        let Value::String(s) = &args[0] else { unreachable!() };
        s.parse::<u64>()
            .map(Value::Uint)
            .map_err(|_| EvalError::conversion(format!("invalid uint conversion: '{s}'")))
    });
}

fn register_double(registry: &mut FunctionRegistry) {
    registry.register_fn("double", &[ParamKind::Double], false, |args| Ok(args[0].clone()));
    registry.register_fn("double", &[ParamKind::Int], false, |args| {
        let Value::Int(i) = &args[0] else { unreachable!() };
        Ok(Value::Double(*i as f64))
    });
    registry.register_fn("double", &[ParamKind::Uint], false, |args| {
        let Value::Uint(u) = &args[0] else { unreachable!() };
        Ok(Value::Double(*u as f64))
    });
    registry.register_fn("double", &[ParamKind::String], false, |args| {
        let Value::String(s) = &args[0] else { unreachable!() };
        // accepts signed mantissas with an optional exponent, e.g. "-1.5e3"
        s.parse::<f64>()
            .map(Value::Double)
            .map_err(|_| EvalError::conversion(format!("invalid double conversion: '{s}'")))
    });
}

fn register_string(registry: &mut FunctionRegistry) {
    registry.register_fn("string", &[ParamKind::String], false, |args| Ok(args[0].clone()));
    registry.register_fn("string", &[ParamKind::Bool], false, |args| {
        let Value::Bool(b) = &args[0] else { unreachable!() };
        Ok(Value::from(if *b { "true" } else { "false" }))
    });
    registry.register_fn("string", &[ParamKind::Int], false, |args| {
        let Value::Int(i) = &args[0] else { unreachable!() };
        Ok(Value::String(Arc::from(i.to_string())))
    });
    registry.register_fn("string", &[ParamKind::Uint], false, |args| {
        let Value::Uint(u) = &args[0] else { unreachable!() };
        Ok(Value::String(Arc::from(u.to_string())))
    });
    registry.register_fn("string", &[ParamKind::Double], false, |args| {
        let Value::Double(d) = &args[0] else { unreachable!() };
        Ok(Value::String(Arc::from(format_double(*d))))
    });
    registry.register_fn("string", &[ParamKind::Bytes], false, |args| {
        let Value::Bytes(b) = &args[0] else { unreachable!() };
        match std::str::from_utf8(b) {
            Ok(text) => Ok(Value::from(text)),
            Err(_) => Err(EvalError::conversion("invalid UTF-8 in bytes, cannot convert to string")),
        }
    });
    registry.register_fn("string", &[ParamKind::Timestamp], false, |args| {
        let Value::Timestamp(t) = &args[0] else { unreachable!() };
        Ok(Value::String(Arc::from(t.to_string())))
    });
    registry.register_fn("string", &[ParamKind::Duration], false, |args| {
        let Value::Duration(d) = &args[0] else { unreachable!() };
        Ok(Value::String(Arc::from(d.to_string())))
    });
}

fn register_bytes(registry: &mut FunctionRegistry) {
    registry.register_fn("bytes", &[ParamKind::Bytes], false, |args| Ok(args[0].clone()));
    registry.register_fn("bytes", &[ParamKind::String], false, |args| {
        let Value::String(s) = &args[0] else { unreachable!() };
        Ok(Value::Bytes(Arc::from(s.as_bytes().to_vec())))
    });
}

fn register_duration(registry: &mut FunctionRegistry) {
    registry.register_fn("duration", &[ParamKind::Duration], false, |args| Ok(args[0].clone()));
    registry.register_fn("duration", &[ParamKind::String], false, |args| {
        let Value::String(s) = &args[0] else { unreachable!() };
        Duration::parse(s).map(Value::Duration)
    });
}

fn register_timestamp(registry: &mut FunctionRegistry) {
    registry.register_fn("timestamp", &[ParamKind::Timestamp], false, |args| Ok(args[0].clone()));
    registry.register_fn("timestamp", &[ParamKind::String], false, |args| {
        let Value::String(s) = &args[0] else { unreachable!() };
        Timestamp::parse(s).map(Value::Timestamp)
    });
    registry.register_fn("timestamp", &[ParamKind::Int], false, |args| {
        let Value::Int(secs) = &args[0] else { unreachable!() };
        Timestamp::from_epoch_seconds(*secs).map(Value::Timestamp)
    });
}

/// `int(double)`: round half away from zero, error outside i64 range.
fn double_to_int(d: f64) -> EvalResult<Value> {
    if d.is_nan() {
        return Err(EvalError::overflow());
    }
    let rounded = d.round();
    if rounded < -(2_f64.powi(63)) || rounded >= 2_f64.powi(63) {
        return Err(EvalError::overflow());
    }
    Ok(Value::Int(rounded as i64))
}

/// `uint(double)`: round half away from zero, error outside u64 range.
fn double_to_uint(d: f64) -> EvalResult<Value> {
    if d.is_nan() {
        return Err(EvalError::overflow());
    }
    let rounded = d.round();
    if rounded < 0.0 || rounded >= 2_f64.powi(64) {
        return Err(EvalError::overflow());
    }
    Ok(Value::Uint(rounded as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::functions::standard_registry;

    fn call(name: &str, arg: Value) -> EvalResult<Value> {
        standard_registry().call(name, false, &[arg])
    }

    #[test]
    fn double_to_int_rounds_half_away_from_zero() {
        assert_eq!(call("int", Value::Double(1.5)).unwrap(), Value::Int(2));
        assert_eq!(call("int", Value::Double(-1.5)).unwrap(), Value::Int(-2));
        assert_eq!(call("int", Value::Double(0.4)).unwrap(), Value::Int(0));
    }

    #[test]
    fn out_of_range_conversions_overflow() {
        assert_eq!(call("int", Value::Double(1e99)).unwrap_err().kind(), ErrorKind::Overflow);
        assert_eq!(call("uint", Value::Int(-1)).unwrap_err().kind(), ErrorKind::Overflow);
        assert_eq!(
            call("uint", Value::Double(6.022e23)).unwrap_err().kind(),
            ErrorKind::Overflow
        );
    }

    #[test]
    fn bytes_to_string_requires_utf8() {
        let err = call("string", Value::bytes(vec![0xff, 0xfe])).unwrap_err();
        assert!(err.message().contains("invalid UTF-8"));
    }

    #[test]
    fn timestamp_to_int_is_epoch_seconds() {
        let ts = Timestamp::parse("1970-01-01T00:20:34Z").unwrap();
        assert_eq!(call("int", Value::Timestamp(ts)).unwrap(), Value::Int(1234));
    }

    #[test]
    fn string_to_double_accepts_exponents() {
        assert_eq!(call("double", Value::from("-1.5e2")).unwrap(), Value::Double(-150.0));
        assert!(call("double", Value::from("abc")).is_err());
    }

    #[test]
    fn type_of_returns_first_class_type() {
        let t = call("type", Value::Int(1)).unwrap();
        assert_eq!(t, Value::Type(crate::value::CelType::Int));
    }
}
