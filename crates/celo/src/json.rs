//! The host-value bridge between JSON-shaped data and runtime values.
//!
//! JSON numbers map to `Double` by default (the JSON data model has only one
//! number kind); [`json_to_value_typed`] lets typed declarations coerce
//! numbers to `Int`/`Uint` instead. Going the other way, bytes are base64,
//! timestamps and durations their canonical string forms, and map keys are
//! stringified since JSON object keys are strings.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::{
    error::{EvalError, EvalResult},
    value::{CelType, Key, MapEntries, MapValue, Value},
};

/// Converts a JSON document into a runtime value. Numbers become `Double`.
#[must_use]
pub fn json_to_value(doc: &serde_json::Value) -> Value {
    match doc {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => Value::list(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(fields) => {
            let mut entries = MapEntries::with_capacity_and_hasher(fields.len(), ahash::RandomState::default());
            for (k, v) in fields {
                entries.insert(Key::String(k.as_str().into()), json_to_value(v));
            }
            Value::Map(MapValue::from_entries(entries))
        }
    }
}

/// Converts a JSON document, coercing numbers per a declared type.
///
/// The declaration applies shallowly: a `CelType::Int` declaration coerces a
/// top-level number, `CelType::List`/`CelType::Map` keep Double elements.
pub fn json_to_value_typed(doc: &serde_json::Value, declared: &CelType) -> EvalResult<Value> {
    match (declared, doc) {
        (CelType::Int, serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| EvalError::conversion(format!("cannot represent {n} as int"))),
        (CelType::Uint, serde_json::Value::Number(n)) => n
            .as_u64()
            .map(Value::Uint)
            .ok_or_else(|| EvalError::conversion(format!("cannot represent {n} as uint"))),
        (CelType::Double, serde_json::Value::Number(n)) => Ok(Value::Double(n.as_f64().unwrap_or(f64::NAN))),
        _ => Ok(json_to_value(doc)),
    }
}

/// Converts a runtime value back into a JSON document.
///
/// Non-finite doubles and opaque objects have no JSON form and produce a
/// conversion error.
pub fn value_to_json(value: &Value) -> EvalResult<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Uint(u) => serde_json::Value::Number((*u).into()),
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .ok_or_else(|| EvalError::conversion("cannot convert non-finite double to JSON"))?,
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Bytes(b) => serde_json::Value::String(BASE64.encode(b)),
        Value::Duration(d) => serde_json::Value::String(d.to_string()),
        Value::Timestamp(t) => serde_json::Value::String(t.to_string()),
        Value::List(elems) => {
            let mut items = Vec::with_capacity(elems.len());
            for e in elems.iter() {
                items.push(value_to_json(e)?);
            }
            serde_json::Value::Array(items)
        }
        Value::Map(map) => {
            let mut fields = serde_json::Map::with_capacity(map.len());
            for (k, v) in map.iter() {
                fields.insert(k.to_string(), value_to_json(v)?);
            }
            serde_json::Value::Object(fields)
        }
        Value::Type(t) => serde_json::Value::String(t.to_string()),
        Value::Object(obj) => {
            return Err(EvalError::conversion(format!(
                "cannot convert message {} to JSON",
                obj.type_name()
            )));
        }
    })
}
