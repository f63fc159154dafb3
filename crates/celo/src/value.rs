use std::{
    cmp::Ordering,
    fmt::{self, Display, Write},
    hash::{Hash, Hasher},
    sync::Arc,
};

use indexmap::IndexMap;

use crate::{
    error::{EvalError, EvalResult},
    object::StructValue,
    temporal::{Duration, Timestamp},
};

/// Identity of a runtime value's type. First-class: `type(x)` evaluates to
/// one of these wrapped in [`Value::Type`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CelType {
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Duration,
    Timestamp,
    List,
    Map,
    /// The type of type values themselves.
    Type,
    /// A structured message type, identified by its full name.
    Object(Arc<str>),
}

impl Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null_type",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Double => "double",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Duration => "duration",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Map => "map",
            Self::Type => "type",
            Self::Object(name) => name,
        };
        f.write_str(name)
    }
}

/// A map key. CEL maps admit bool, int, uint, and string keys only.
///
/// Numeric keys are compared and hashed by mathematical value, so `Int(3)`
/// and `Uint(3)` address the same slot; a map literal mixing them is a
/// repeated-key error, and `3.0` used in a lookup finds either.
#[derive(Debug, Clone, Eq)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(Arc<str>),
}

impl Key {
    /// The mathematical value of a numeric key, or None for bool/string.
    fn numeric(&self) -> Option<i128> {
        match self {
            Self::Int(i) => Some(i128::from(*i)),
            Self::Uint(u) => Some(i128::from(*u)),
            Self::Bool(_) | Self::String(_) => None,
        }
    }

    /// The value form of this key, used when iterating map keys.
    pub(crate) fn to_value(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Uint(u) => Value::Uint(*u),
            Self::String(s) => Value::String(s.clone()),
        }
    }

    /// Converts a value into a key for map construction.
    ///
    /// Double and null keys are rejected with "unsupported key type" per the
    /// map-literal rules; so is anything non-scalar.
    pub(crate) fn for_construction(value: Value) -> EvalResult<Self> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Int(i) => Ok(Self::Int(i)),
            Value::Uint(u) => Ok(Self::Uint(u)),
            Value::String(s) => Ok(Self::String(s)),
            other => Err(EvalError::unsupported_key_type(other.cel_type())),
        }
    }

    /// Converts a value into a key for operator lookup (`m[k]`, `k in m`).
    ///
    /// Cross-variant numeric lookups are permitted: an exactly-integral
    /// double becomes an int/uint key. A lossy double (`3.1`) and every
    /// non-key type fail with "no such key".
    pub(crate) fn for_lookup(value: &Value) -> EvalResult<Self> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Int(i) => Ok(Self::Int(*i)),
            Value::Uint(u) => Ok(Self::Uint(*u)),
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Double(d) => {
                if d.is_finite() && d.trunc() == *d {
                    if *d >= -(2_f64.powi(63)) && *d < 2_f64.powi(63) {
                        return Ok(Self::Int(*d as i64));
                    }
                    if *d >= 0.0 && *d < 2_f64.powi(64) {
                        return Ok(Self::Uint(*d as u64));
                    }
                }
                Err(EvalError::no_such_key(format_double(*d)))
            }
            other => Err(EvalError::no_such_key(other.cel_type())),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            _ => match (self.numeric(), other.numeric()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // numeric keys hash by mathematical value so Int(3) and Uint(3)
        // land in the same bucket
        match self {
            Self::Bool(b) => {
                state.write_u8(0);
                b.hash(state);
            }
            Self::String(s) => {
                state.write_u8(1);
                s.hash(state);
            }
            Self::Int(_) | Self::Uint(_) => {
                state.write_u8(2);
                state.write_i128(self.numeric().unwrap_or_default());
            }
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

pub(crate) type MapEntries = IndexMap<Key, Value, ahash::RandomState>;

/// An immutable CEL map preserving insertion order for iteration while
/// ignoring it for equality.
#[derive(Debug, Clone)]
pub struct MapValue(Arc<MapEntries>);

impl MapValue {
    pub(crate) fn from_entries(entries: MapEntries) -> Self {
        Self(Arc::new(entries))
    }

    /// Builds a map from key/value pairs, rejecting duplicate keys the same
    /// way a map literal does.
    pub fn new(pairs: impl IntoIterator<Item = (Key, Value)>) -> EvalResult<Self> {
        let mut entries = MapEntries::default();
        for (key, value) in pairs {
            if entries.contains_key(&key) {
                return Err(EvalError::repeated_key(key));
            }
            entries.insert(key, value);
        }
        Ok(Self(Arc::new(entries)))
    }

    /// Builds a map from evaluated literal entries, enforcing the key-type
    /// and no-duplicate invariants.
    pub(crate) fn build(pairs: Vec<(Value, Value)>) -> EvalResult<Self> {
        let mut entries = MapEntries::with_capacity_and_hasher(pairs.len(), ahash::RandomState::default());
        for (key, value) in pairs {
            let key = Key::for_construction(key)?;
            if entries.contains_key(&key) {
                return Err(EvalError::repeated_key(key));
            }
            entries.insert(key, value);
        }
        Ok(Self(Arc::new(entries)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.0.iter()
    }

    pub(crate) fn get(&self, key: &Key) -> Option<&Value> {
        self.0.get(key)
    }

    /// Operator lookup: `m[k]`. Missing keys and lossy numeric keys produce
    /// "no such key".
    pub(crate) fn index(&self, key: &Value) -> EvalResult<Value> {
        let key = Key::for_lookup(key)?;
        self.0.get(&key).cloned().ok_or_else(|| EvalError::no_such_key(key))
    }

    /// Membership test `k in m`.
    ///
    /// A key whose type can never match (or a lossy double) surfaces the
    /// lookup error; an absent but well-typed key is plain `false`.
    pub(crate) fn contains(&self, key: &Value) -> EvalResult<bool> {
        // a well-typed key that is simply absent is false; a lossy numeric
        // key or a non-key type cannot match anything exactly, so the
        // lookup error surfaces
        let key = Key::for_lookup(key)?;
        Ok(self.0.contains_key(&key))
    }

    /// Keys in insertion order; this is the comprehension iteration order.
    pub(crate) fn keys(&self) -> impl Iterator<Item = &Key> {
        self.0.keys()
    }
}

/// Primary runtime value type.
///
/// Scalars are stored inline; strings, bytes, lists, and maps share their
/// payload through `Arc` so cloning a value is cheap and evaluation never
/// mutates shared state. Evaluation errors are NOT a variant: they travel in
/// the `Err` arm of [`EvalResult`] and the short-circuiting operators decide
/// whether to mask or surface them.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    Duration(Duration),
    Timestamp(Timestamp),
    List(Arc<Vec<Value>>),
    Map(MapValue),
    Type(CelType),
    /// An opaque structured message addressed through the accessor interface.
    Object(Arc<dyn StructValue>),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    pub fn bytes(b: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes(b.into())
    }

    pub fn list(elems: Vec<Self>) -> Self {
        Self::List(Arc::new(elems))
    }

    /// The runtime type used for overload dispatch and error messages.
    #[must_use]
    pub fn cel_type(&self) -> CelType {
        match self {
            Self::Null => CelType::Null,
            Self::Bool(_) => CelType::Bool,
            Self::Int(_) => CelType::Int,
            Self::Uint(_) => CelType::Uint,
            Self::Double(_) => CelType::Double,
            Self::String(_) => CelType::String,
            Self::Bytes(_) => CelType::Bytes,
            Self::Duration(_) => CelType::Duration,
            Self::Timestamp(_) => CelType::Timestamp,
            Self::List(_) => CelType::List,
            Self::Map(_) => CelType::Map,
            Self::Type(_) => CelType::Type,
            Self::Object(obj) => CelType::Object(Arc::from(obj.type_name())),
        }
    }

    /// CEL equality. Total for like types, mathematical across the numeric
    /// variants, and an error ("no such overload") between unrelated types.
    ///
    /// NaN equals NaN here; host-level `PartialEq` keeps IEEE semantics.
    pub(crate) fn eq_value(&self, other: &Self) -> EvalResult<bool> {
        match (self, other) {
            (Self::Null, Self::Null) => Ok(true),
            (Self::Bool(a), Self::Bool(b)) => Ok(a == b),
            (Self::Int(a), Self::Int(b)) => Ok(a == b),
            (Self::Uint(a), Self::Uint(b)) => Ok(a == b),
            (Self::Double(a), Self::Double(b)) => Ok(a == b || (a.is_nan() && b.is_nan())),
            (Self::Int(a), Self::Uint(b)) => Ok(int_eq_uint(*a, *b)),
            (Self::Uint(a), Self::Int(b)) => Ok(int_eq_uint(*b, *a)),
            (Self::Int(a), Self::Double(b)) => Ok(int_eq_double(*a, *b)),
            (Self::Double(a), Self::Int(b)) => Ok(int_eq_double(*b, *a)),
            (Self::Uint(a), Self::Double(b)) => Ok(uint_eq_double(*a, *b)),
            (Self::Double(a), Self::Uint(b)) => Ok(uint_eq_double(*b, *a)),
            (Self::String(a), Self::String(b)) => Ok(a == b),
            (Self::Bytes(a), Self::Bytes(b)) => Ok(a == b),
            (Self::Duration(a), Self::Duration(b)) => Ok(a == b),
            (Self::Timestamp(a), Self::Timestamp(b)) => Ok(a == b),
            (Self::Type(a), Self::Type(b)) => Ok(a == b),
            (Self::List(a), Self::List(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.eq_value(y)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Self::Map(a), Self::Map(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (key, value) in a.iter() {
                    let Some(other_value) = b.get(key) else {
                        return Ok(false);
                    };
                    if !value.eq_value(other_value)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Err(EvalError::no_such_overload_binary("==", self.cel_type(), other.cel_type())),
        }
    }

    /// CEL ordering. Defined only for matching scalar types; everything else
    /// (lists, maps, null, mixed types) is "no such overload". `Ok(None)`
    /// marks an unordered pair (a NaN operand): every ordering operator on
    /// it is `false`, not an error.
    pub(crate) fn compare(&self, other: &Self, op: &str) -> EvalResult<Option<Ordering>> {
        let mismatch = || EvalError::no_such_overload_binary(op, self.cel_type(), other.cel_type());
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Ok(Some(a.cmp(b))),
            (Self::Uint(a), Self::Uint(b)) => Ok(Some(a.cmp(b))),
            (Self::Double(a), Self::Double(b)) => Ok(a.partial_cmp(b)),
            (Self::String(a), Self::String(b)) => Ok(Some(a.as_ref().cmp(b.as_ref()))),
            (Self::Bytes(a), Self::Bytes(b)) => Ok(Some(a.as_ref().cmp(b.as_ref()))),
            (Self::Bool(a), Self::Bool(b)) => Ok(Some(a.cmp(b))),
            (Self::Duration(a), Self::Duration(b)) => Ok(Some(a.cmp(b))),
            (Self::Timestamp(a), Self::Timestamp(b)) => Ok(Some(a.cmp(b))),
            _ => Err(mismatch()),
        }
    }

    /// Addition / concatenation.
    pub(crate) fn op_add(&self, other: &Self) -> EvalResult<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.checked_add(*b).map(Self::Int).ok_or_else(EvalError::overflow),
            (Self::Uint(a), Self::Uint(b)) => a.checked_add(*b).map(Self::Uint).ok_or_else(EvalError::overflow),
            (Self::Double(a), Self::Double(b)) => Ok(Self::Double(a + b)),
            (Self::String(a), Self::String(b)) => {
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(a);
                joined.push_str(b);
                Ok(Self::String(Arc::from(joined)))
            }
            (Self::Bytes(a), Self::Bytes(b)) => {
                let mut joined = Vec::with_capacity(a.len() + b.len());
                joined.extend_from_slice(a);
                joined.extend_from_slice(b);
                Ok(Self::Bytes(Arc::from(joined)))
            }
            (Self::List(a), Self::List(b)) => {
                let mut joined = Vec::with_capacity(a.len() + b.len());
                joined.extend(a.iter().cloned());
                joined.extend(b.iter().cloned());
                Ok(Self::list(joined))
            }
            (Self::Duration(a), Self::Duration(b)) => a.checked_add(b).map(Self::Duration),
            (Self::Timestamp(t), Self::Duration(d)) => t.checked_add(d).map(Self::Timestamp),
            (Self::Duration(d), Self::Timestamp(t)) => t.checked_add(d).map(Self::Timestamp),
            _ => Err(EvalError::no_such_overload_binary("+", self.cel_type(), other.cel_type())),
        }
    }

    pub(crate) fn op_sub(&self, other: &Self) -> EvalResult<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.checked_sub(*b).map(Self::Int).ok_or_else(EvalError::overflow),
            (Self::Uint(a), Self::Uint(b)) => a.checked_sub(*b).map(Self::Uint).ok_or_else(EvalError::overflow),
            (Self::Double(a), Self::Double(b)) => Ok(Self::Double(a - b)),
            (Self::Duration(a), Self::Duration(b)) => a.checked_sub(b).map(Self::Duration),
            (Self::Timestamp(t), Self::Duration(d)) => t.checked_sub(d).map(Self::Timestamp),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.since(b).map(Self::Duration),
            _ => Err(EvalError::no_such_overload_binary("-", self.cel_type(), other.cel_type())),
        }
    }

    pub(crate) fn op_mul(&self, other: &Self) -> EvalResult<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.checked_mul(*b).map(Self::Int).ok_or_else(EvalError::overflow),
            (Self::Uint(a), Self::Uint(b)) => a.checked_mul(*b).map(Self::Uint).ok_or_else(EvalError::overflow),
            (Self::Double(a), Self::Double(b)) => Ok(Self::Double(a * b)),
            _ => Err(EvalError::no_such_overload_binary("*", self.cel_type(), other.cel_type())),
        }
    }

    /// Division. Integer division by zero is an error; double division
    /// follows IEEE-754 (infinities, no error).
    pub(crate) fn op_div(&self, other: &Self) -> EvalResult<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => {
                if *b == 0 {
                    return Err(EvalError::divide_by_zero());
                }
                a.checked_div(*b).map(Self::Int).ok_or_else(EvalError::overflow)
            }
            (Self::Uint(a), Self::Uint(b)) => {
                if *b == 0 {
                    return Err(EvalError::divide_by_zero());
                }
                Ok(Self::Uint(a / b))
            }
            (Self::Double(a), Self::Double(b)) => Ok(Self::Double(a / b)),
            _ => Err(EvalError::no_such_overload_binary("/", self.cel_type(), other.cel_type())),
        }
    }

    /// Modulus. Not defined on double.
    pub(crate) fn op_rem(&self, other: &Self) -> EvalResult<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => {
                if *b == 0 {
                    return Err(EvalError::modulus_by_zero());
                }
                a.checked_rem(*b).map(Self::Int).ok_or_else(EvalError::overflow)
            }
            (Self::Uint(a), Self::Uint(b)) => {
                if *b == 0 {
                    return Err(EvalError::modulus_by_zero());
                }
                Ok(Self::Uint(a % b))
            }
            _ => Err(EvalError::no_such_overload_binary("%", self.cel_type(), other.cel_type())),
        }
    }

    /// Unary minus. Not defined on uint or bool; `-i64::MIN` overflows.
    pub(crate) fn op_neg(&self) -> EvalResult<Self> {
        match self {
            Self::Int(i) => i.checked_neg().map(Self::Int).ok_or_else(EvalError::overflow),
            Self::Double(d) => Ok(Self::Double(-d)),
            Self::Duration(d) => d.checked_neg().map(Self::Duration),
            _ => Err(EvalError::no_such_overload_unary("-", self.cel_type())),
        }
    }

    pub(crate) fn op_not(&self) -> EvalResult<Self> {
        match self {
            Self::Bool(b) => Ok(Self::Bool(!b)),
            _ => Err(EvalError::no_such_overload_unary("!", self.cel_type())),
        }
    }

    /// Index operator `e[k]` for lists and maps.
    pub(crate) fn op_index(&self, index: &Self) -> EvalResult<Self> {
        match self {
            Self::List(elems) => {
                let i = match index {
                    Self::Int(i) => *i,
                    Self::Uint(u) => i64::try_from(*u).map_err(|_| EvalError::index_out_of_range(u))?,
                    other => {
                        return Err(EvalError::no_such_overload_binary("[]", CelType::List, other.cel_type()));
                    }
                };
                if i < 0 || i as usize >= elems.len() {
                    return Err(EvalError::index_out_of_range(i));
                }
                Ok(elems[i as usize].clone())
            }
            Self::Map(map) => map.index(index),
            other => Err(EvalError::no_such_overload_binary(
                "[]",
                other.cel_type(),
                index.cel_type(),
            )),
        }
    }

    /// Membership `e in coll`.
    ///
    /// For lists, an element-equality error is suppressed when a later
    /// element matches; otherwise the first error surfaces. For maps the
    /// key-lookup rules apply.
    pub(crate) fn contains(collection: &Self, element: &Self) -> EvalResult<bool> {
        match collection {
            Self::List(elems) => {
                let mut deferred: Option<EvalError> = None;
                for e in elems.iter() {
                    match element.eq_value(e) {
                        Ok(true) => return Ok(true),
                        Ok(false) => {}
                        Err(err) => {
                            if deferred.is_none() {
                                deferred = Some(err);
                            }
                        }
                    }
                }
                match deferred {
                    Some(err) => Err(err),
                    None => Ok(false),
                }
            }
            Self::Map(map) => map.contains(element),
            Self::String(haystack) => match element {
                Self::String(needle) => Ok(haystack.contains(needle.as_ref())),
                other => Err(EvalError::no_such_overload_binary("in", other.cel_type(), CelType::String)),
            },
            other => Err(EvalError::no_such_overload_binary(
                "in",
                element.cel_type(),
                other.cel_type(),
            )),
        }
    }
}

fn int_eq_uint(i: i64, u: u64) -> bool {
    i >= 0 && (i as u64) == u
}

fn int_eq_double(i: i64, d: f64) -> bool {
    if !d.is_finite() || d.trunc() != d {
        return false;
    }
    // exact range check before casting: f64 can represent 2^63 but not
    // i64::MAX, so compare in f64 bounds first
    if d < -(2_f64.powi(63)) || d >= 2_f64.powi(63) {
        return false;
    }
    (d as i64) == i
}

fn uint_eq_double(u: u64, d: f64) -> bool {
    if !d.is_finite() || d.trunc() != d {
        return false;
    }
    if d < 0.0 || d >= 2_f64.powi(64) {
        return false;
    }
    (d as u64) == u
}

/// Host-level structural equality used by tests and the CLI; keeps IEEE
/// double semantics and compares objects by identity. CEL `==` lives in
/// [`Value::eq_value`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Uint(a), Self::Uint(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Duration(a), Self::Duration(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v == w))
            }
            (Self::Type(a), Self::Type(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(Arc::from(v))
    }
}

impl Display for Value {
    /// Renders the value in CEL literal form where one exists. Used by the
    /// CLI for plain output; not part of the evaluation semantics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}u"),
            Self::Double(d) => f.write_str(&format_double(*d)),
            Self::String(s) => write!(f, "\"{}\"", s.escape_default()),
            Self::Bytes(b) => {
                f.write_str("b\"")?;
                for byte in b.iter() {
                    write!(f, "\\x{byte:02x}")?;
                }
                f.write_char('"')
            }
            Self::Duration(d) => write!(f, "duration(\"{d}\")"),
            Self::Timestamp(t) => write!(f, "timestamp(\"{t}\")"),
            Self::List(elems) => {
                f.write_char('[')?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_char(']')
            }
            Self::Map(map) => {
                f.write_char('{')?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match k {
                        Key::String(s) => write!(f, "\"{}\": {v}", s.escape_default())?,
                        Key::Uint(u) => write!(f, "{u}u: {v}")?,
                        other => write!(f, "{other}: {v}")?,
                    }
                }
                f.write_char('}')
            }
            Self::Type(t) => write!(f, "{t}"),
            Self::Object(obj) => write!(f, "{}{{...}}", obj.type_name()),
        }
    }
}

/// Shortest round-trip decimal form of a double, with CEL spellings for the
/// non-finite values.
pub(crate) fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_owned();
    }
    if d.is_infinite() {
        return if d > 0.0 { "+Inf" } else { "-Inf" }.to_owned();
    }
    let mut buffer = ryu::Buffer::new();
    buffer.format(d).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn numeric_keys_collide_across_variants() {
        let map = MapValue::build(vec![(Value::Int(3), Value::Int(30))]).unwrap();
        assert_eq!(map.index(&Value::Uint(3)).unwrap(), Value::Int(30));
        assert_eq!(map.index(&Value::Double(3.0)).unwrap(), Value::Int(30));
        let err = map.index(&Value::Double(3.1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSuchKey);
    }

    #[test]
    fn duplicate_keys_across_variants_are_rejected() {
        let err = MapValue::build(vec![
            (Value::Int(1), Value::Null),
            (Value::Uint(1), Value::Null),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RepeatedKey);
    }

    #[test]
    fn int_min_negation_overflows() {
        let err = Value::Int(i64::MIN).op_neg().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);
    }

    #[test]
    fn nan_equals_nan_under_cel_equality() {
        let nan = Value::Double(f64::NAN);
        assert!(nan.eq_value(&nan).unwrap());
        // host equality keeps IEEE semantics
        assert!(nan != nan.clone());
    }

    #[test]
    fn cross_type_equality_is_an_overload_error() {
        let err = Value::Int(1).eq_value(&Value::from("10")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSuchOverload);
    }

    #[test]
    fn large_int_is_not_equal_to_rounded_double() {
        // i64::MAX rounds to 2^63 as f64, which is out of i64 range
        assert!(!int_eq_double(i64::MAX, i64::MAX as f64));
        assert!(int_eq_double(1 << 52, (1_i64 << 52) as f64));
    }

    #[test]
    fn double_format_is_shortest_round_trip() {
        assert_eq!(format_double(1.0), "1.0");
        assert_eq!(format_double(-0.5), "-0.5");
        assert_eq!(format_double(f64::INFINITY), "+Inf");
    }
}
