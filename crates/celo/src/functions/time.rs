//! Timestamp and duration accessors.
//!
//! Every timestamp accessor takes an optional timezone argument (IANA name
//! or `±HH:MM` offset) and defaults to UTC. Month, day-of-month, day-of-year,
//! and day-of-week are zero-based; `getDate` is the one-based day. Duration
//! accessors expose whole hours/minutes/seconds and the sub-second
//! milliseconds.

use crate::{
    error::EvalResult,
    functions::{FunctionRegistry, ParamKind},
    temporal::CivilTime,
    value::Value,
};

const TS: &[ParamKind] = &[ParamKind::Timestamp];
const TS_TZ: &[ParamKind] = &[ParamKind::Timestamp, ParamKind::String];
const DUR: &[ParamKind] = &[ParamKind::Duration];

/// Registers one timestamp accessor in both arities (with and without the
/// timezone argument).
fn register_ts_accessor(registry: &mut FunctionRegistry, name: &str, select: fn(&CivilTime) -> i64) {
    registry.register_fn(name, TS, true, move |args| {
        let Value::Timestamp(t) = &args[0] else { unreachable!() };
        civil_field(t.civil(None), select)
    });
    registry.register_fn(name, TS_TZ, true, move |args| {
        let (Value::Timestamp(t), Value::String(tz)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        civil_field(t.civil(Some(tz)), select)
    });
}

fn civil_field(civil: EvalResult<CivilTime>, select: fn(&CivilTime) -> i64) -> EvalResult<Value> {
    civil.map(|c| Value::Int(select(&c)))
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    register_ts_accessor(registry, "getFullYear", |c| c.year);
    register_ts_accessor(registry, "getMonth", |c| c.month0);
    register_ts_accessor(registry, "getDayOfYear", |c| c.day_of_year0);
    register_ts_accessor(registry, "getDayOfMonth", |c| c.day0);
    register_ts_accessor(registry, "getDate", |c| c.day_1based);
    register_ts_accessor(registry, "getDayOfWeek", |c| c.day_of_week);
    register_ts_accessor(registry, "getHours", |c| c.hour);
    register_ts_accessor(registry, "getMinutes", |c| c.minute);
    register_ts_accessor(registry, "getSeconds", |c| c.second);
    register_ts_accessor(registry, "getMilliseconds", |c| c.millisecond);

    registry.register_fn("getHours", DUR, true, |args| {
        let Value::Duration(d) = &args[0] else { unreachable!() };
        Ok(Value::Int(d.hours()))
    });
    registry.register_fn("getMinutes", DUR, true, |args| {
        let Value::Duration(d) = &args[0] else { unreachable!() };
        Ok(Value::Int(d.minutes()))
    });
    registry.register_fn("getSeconds", DUR, true, |args| {
        let Value::Duration(d) = &args[0] else { unreachable!() };
        Ok(Value::Int(d.seconds()))
    });
    registry.register_fn("getMilliseconds", DUR, true, |args| {
        let Value::Duration(d) = &args[0] else { unreachable!() };
        Ok(Value::Int(d.milliseconds()))
    });
}

#[cfg(test)]
mod tests {
    use crate::{functions::standard_registry, temporal::{Duration, Timestamp}, value::Value};

    fn ts(text: &str) -> Value {
        Value::Timestamp(Timestamp::parse(text).unwrap())
    }

    #[test]
    fn zero_based_and_one_based_days() {
        let registry = standard_registry();
        let t = ts("2009-02-13T23:31:30Z");
        assert_eq!(registry.call("getDayOfMonth", true, &[t.clone()]).unwrap(), Value::Int(12));
        assert_eq!(registry.call("getDate", true, &[t.clone()]).unwrap(), Value::Int(13));
        assert_eq!(registry.call("getMonth", true, &[t]).unwrap(), Value::Int(1));
    }

    #[test]
    fn timezone_shift_changes_civil_day() {
        let registry = standard_registry();
        let args = [ts("2009-02-13T23:31:30Z"), Value::from("+11:00")];
        assert_eq!(registry.call("getDayOfMonth", true, &args).unwrap(), Value::Int(13));
    }

    #[test]
    fn duration_accessors_truncate() {
        let registry = standard_registry();
        let d = Value::Duration(Duration::parse("1h30m10.250s").unwrap());
        assert_eq!(registry.call("getHours", true, &[d.clone()]).unwrap(), Value::Int(1));
        assert_eq!(registry.call("getMinutes", true, &[d.clone()]).unwrap(), Value::Int(90));
        assert_eq!(registry.call("getSeconds", true, &[d.clone()]).unwrap(), Value::Int(5410));
        assert_eq!(registry.call("getMilliseconds", true, &[d]).unwrap(), Value::Int(250));
    }

    #[test]
    fn unknown_timezone_is_an_error() {
        let registry = standard_registry();
        let args = [ts("2009-02-13T23:31:30Z"), Value::from("Mars/Olympus")];
        assert!(registry.call("getFullYear", true, &args).is_err());
    }
}
