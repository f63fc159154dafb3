//! The accessor interface for structured message values.
//!
//! The evaluator never understands message encodings. It sees an opaque
//! [`StructValue`] that can name its type and answer field lookups with a
//! value plus a presence marker; `has(msg.field)` and `msg.field` are both
//! driven entirely through this interface. Embedders with protobuf-like
//! data implement [`StructValue`] (and [`StructFactory`] when struct
//! literals should construct their types); [`DynStruct`] is a ready-made
//! map-backed implementation with wrapper/repeated/scalar presence
//! semantics, used by the test suite and handy for ad-hoc embedding.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;

use crate::{
    error::{EvalError, EvalResult},
    value::{MapValue, Value},
};

/// Presence of a message field as reported by the accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPresence {
    /// The field is explicitly set (for wrappers: set even to the zero
    /// value; for repeated/map fields: nonempty).
    Present,
    /// The field exists on the type but is unset or carries its default.
    Default,
}

/// An opaque structured message, field-addressable by name.
///
/// `field` returns `None` for names the type does not declare at all; that
/// is a "no such field" error at the language level, for selection and
/// `has()` alike.
pub trait StructValue: fmt::Debug + Send + Sync {
    /// The fully-qualified type name, e.g. `cel.expr.conformance.proto3.TestAllTypes`.
    fn type_name(&self) -> &str;

    /// Looks up a field, returning its (possibly defaulted) value and
    /// whether it is present.
    fn field(&self, name: &str) -> Option<(Value, FieldPresence)>;
}

/// Constructs message values from struct-literal field lists.
///
/// Registered on the [`Environment`](crate::Environment) under the type's
/// fully-qualified name; struct literals resolve the written name against
/// the container, then call `instantiate`.
pub trait StructFactory: Send + Sync {
    fn instantiate(&self, fields: Vec<(Arc<str>, Value)>) -> EvalResult<Value>;
}

/// Field classification for [`DynStruct`], fixing the presence semantics of
/// each declared field.
#[derive(Debug, Clone)]
pub enum DynField {
    /// Proto3-style scalar: present iff set to a non-default value. Carries
    /// the default returned for unset lookups.
    Scalar(Value),
    /// Nullable boxed scalar: absent reads as null, present even when set
    /// to the zero value.
    Wrapper,
    /// Repeated field: present iff nonempty; unset reads as an empty list.
    Repeated,
    /// Map field: present iff nonempty; unset reads as an empty map.
    MapField,
    /// Nested message: present iff set; unset reads as null.
    Message,
}

/// Declaration of a dynamic message type: a name plus its field layout.
#[derive(Debug, Clone)]
pub struct DynStructType {
    type_name: Arc<str>,
    fields: IndexMap<String, DynField, ahash::RandomState>,
}

impl DynStructType {
    #[must_use]
    pub fn new(type_name: impl Into<Arc<str>>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: IndexMap::default(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, field: DynField) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Builds an instance with the given explicit fields. Unknown field
    /// names are rejected.
    pub fn instance(self: &Arc<Self>, fields: Vec<(Arc<str>, Value)>) -> EvalResult<DynStruct> {
        let mut values: IndexMap<String, Value, ahash::RandomState> = IndexMap::default();
        for (name, value) in fields {
            if !self.fields.contains_key(name.as_ref()) {
                return Err(EvalError::no_such_field(&name));
            }
            values.insert(name.to_string(), value);
        }
        Ok(DynStruct {
            ty: Arc::clone(self),
            values,
        })
    }
}

impl StructFactory for DynStructType {
    fn instantiate(&self, fields: Vec<(Arc<str>, Value)>) -> EvalResult<Value> {
        // StructFactory is object-safe, so rebuild the Arc'd self the
        // environment stores separately
        let ty = Arc::new(self.clone());
        ty.instance(fields).map(|s| Value::Object(Arc::new(s)))
    }
}

/// A map-backed [`StructValue`] with per-field presence semantics.
#[derive(Debug, Clone)]
pub struct DynStruct {
    ty: Arc<DynStructType>,
    values: IndexMap<String, Value, ahash::RandomState>,
}

impl StructValue for DynStruct {
    fn type_name(&self) -> &str {
        &self.ty.type_name
    }

    fn field(&self, name: &str) -> Option<(Value, FieldPresence)> {
        let kind = self.ty.fields.get(name)?;
        let set = self.values.get(name);
        Some(match kind {
            DynField::Scalar(default) => match set {
                Some(v) if v != default => (v.clone(), FieldPresence::Present),
                Some(v) => (v.clone(), FieldPresence::Default),
                None => (default.clone(), FieldPresence::Default),
            },
            DynField::Wrapper => match set {
                Some(v) => (v.clone(), FieldPresence::Present),
                None => (Value::Null, FieldPresence::Default),
            },
            DynField::Repeated => match set {
                Some(Value::List(elems)) if !elems.is_empty() => {
                    (Value::List(Arc::clone(elems)), FieldPresence::Present)
                }
                Some(v) => (v.clone(), FieldPresence::Default),
                None => (Value::list(vec![]), FieldPresence::Default),
            },
            DynField::MapField => match set {
                Some(Value::Map(map)) if !map.is_empty() => (Value::Map(map.clone()), FieldPresence::Present),
                Some(v) => (v.clone(), FieldPresence::Default),
                None => (Value::Map(MapValue::from_entries(IndexMap::default())), FieldPresence::Default),
            },
            DynField::Message => match set {
                Some(v) => (v.clone(), FieldPresence::Present),
                None => (Value::Null, FieldPresence::Default),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_type() -> Arc<DynStructType> {
        Arc::new(
            DynStructType::new("test.Widget")
                .with_field("name", DynField::Scalar(Value::from("")))
                .with_field("count_wrapper", DynField::Wrapper)
                .with_field("tags", DynField::Repeated),
        )
    }

    #[test]
    fn wrapper_set_to_zero_is_present() {
        let ty = test_type();
        let msg = ty
            .instance(vec![(Arc::from("count_wrapper"), Value::Int(0))])
            .unwrap();
        let (value, presence) = msg.field("count_wrapper").unwrap();
        assert_eq!(value, Value::Int(0));
        assert_eq!(presence, FieldPresence::Present);
    }

    #[test]
    fn unset_wrapper_reads_as_null() {
        let ty = test_type();
        let msg = ty.instance(vec![]).unwrap();
        let (value, presence) = msg.field("count_wrapper").unwrap();
        assert_eq!(value, Value::Null);
        assert_eq!(presence, FieldPresence::Default);
    }

    #[test]
    fn scalar_presence_follows_default() {
        let ty = test_type();
        let set = ty.instance(vec![(Arc::from("name"), Value::from("x"))]).unwrap();
        assert_eq!(set.field("name").unwrap().1, FieldPresence::Present);
        let unset = ty.instance(vec![]).unwrap();
        assert_eq!(unset.field("name").unwrap().1, FieldPresence::Default);
    }

    #[test]
    fn unknown_field_is_rejected_at_construction() {
        let ty = test_type();
        let err = ty.instance(vec![(Arc::from("bogus"), Value::Null)]).unwrap_err();
        assert!(err.message().contains("no such field"));
    }

    #[test]
    fn empty_repeated_field_is_not_present() {
        let ty = test_type();
        let msg = ty.instance(vec![(Arc::from("tags"), Value::list(vec![]))]).unwrap();
        assert_eq!(msg.field("tags").unwrap().1, FieldPresence::Default);
    }
}
