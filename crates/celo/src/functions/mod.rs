//! Function registry, overload resolution, and the standard library.
//!
//! A function is a name plus an ordered list of overloads; each overload
//! declares parameter kinds (with `Dyn` as a wildcard), whether it is
//! receiver-style, and carries its implementation. Resolution evaluates
//! arguments first, then picks the first overload whose declared kinds are
//! satisfied by the runtime types. Failures distinguish "no such overload"
//! (the name exists, the types do not fit) from "unbound function".

mod conversions;
mod strings;
mod time;

use std::sync::Arc;

use ahash::AHashMap;

use crate::{
    error::{EvalError, EvalResult},
    value::{CelType, Value},
};

/// Implementation callback for a registered overload.
pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> EvalResult<Value> + Send + Sync>;

/// Declared parameter kind for overload matching.
///
/// Matching is by runtime type tag; `Dyn` accepts anything and `Object`
/// accepts any structured message regardless of its type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Dyn,
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
    Type,
    Object,
}

impl ParamKind {
    fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Dyn, _) => true,
            (Self::Null, Value::Null) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Int(_)) => true,
            (Self::Uint, Value::Uint(_)) => true,
            (Self::Double, Value::Double(_)) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Bytes, Value::Bytes(_)) => true,
            (Self::Duration, Value::Duration(_)) => true,
            (Self::Timestamp, Value::Timestamp(_)) => true,
            (Self::List, Value::List(_)) => true,
            (Self::Map, Value::Map(_)) => true,
            (Self::Type, Value::Type(_)) => true,
            (Self::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

/// One typed implementation of a named function.
///
/// For receiver-style overloads the receiver is the first parameter; a call
/// only matches overloads of its own style, so `size(x)` and `x.size()` are
/// distinct registrations even when they share an implementation.
pub(crate) struct Overload {
    params: Vec<ParamKind>,
    receiver: bool,
    implementation: FunctionImpl,
}

impl Overload {
    pub fn new(params: &[ParamKind], receiver: bool, implementation: FunctionImpl) -> Self {
        Self {
            params: params.to_vec(),
            receiver,
            implementation,
        }
    }

    fn matches(&self, receiver_style: bool, args: &[Value]) -> bool {
        self.receiver == receiver_style
            && self.params.len() == args.len()
            && self.params.iter().zip(args).all(|(p, a)| p.matches(a))
    }
}

/// Registry of named functions, fixed after environment setup.
#[derive(Default)]
pub(crate) struct FunctionRegistry {
    functions: AHashMap<Arc<str>, Vec<Overload>>,
}

impl FunctionRegistry {
    /// Appends an overload under a name; earlier registrations win ties.
    pub fn register(&mut self, name: impl Into<Arc<str>>, overload: Overload) {
        self.functions.entry(name.into()).or_default().push(overload);
    }

    pub fn register_fn<F>(&mut self, name: &str, params: &[ParamKind], receiver: bool, f: F)
    where
        F: Fn(&[Value]) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.register(name, Overload::new(params, receiver, Arc::new(f)));
    }

    /// Resolves and invokes. `args` includes the receiver first for
    /// receiver-style calls.
    pub fn call(&self, name: &str, receiver_style: bool, args: &[Value]) -> EvalResult<Value> {
        let Some(overloads) = self.functions.get(name) else {
            return Err(EvalError::unbound_function(name));
        };
        for overload in overloads {
            if overload.matches(receiver_style, args) {
                return (overload.implementation)(args);
            }
        }
        let arg_types: Vec<CelType> = args.iter().map(Value::cel_type).collect();
        Err(EvalError::no_such_overload_function(name, &arg_types))
    }
}

/// Builds the registry with the complete standard library.
pub(crate) fn standard_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::default();
    conversions::register(&mut registry);
    strings::register(&mut registry);
    time::register(&mut registry);
    register_size(&mut registry);
    registry
}

/// `size()` in both global and method form for the four sized types.
fn register_size(registry: &mut FunctionRegistry) {
    for receiver in [false, true] {
        registry.register_fn("size", &[ParamKind::String], receiver, |args| {
            let Value::String(s) = &args[0] else { unreachable!() };
            Ok(Value::Int(s.chars().count() as i64))
        });
        registry.register_fn("size", &[ParamKind::Bytes], receiver, |args| {
            let Value::Bytes(b) = &args[0] else { unreachable!() };
            Ok(Value::Int(b.len() as i64))
        });
        registry.register_fn("size", &[ParamKind::List], receiver, |args| {
            let Value::List(l) = &args[0] else { unreachable!() };
            Ok(Value::Int(l.len() as i64))
        });
        registry.register_fn("size", &[ParamKind::Map], receiver, |args| {
            let Value::Map(m) = &args[0] else { unreachable!() };
            Ok(Value::Int(m.len() as i64))
        });
    }
}
