//! Per-evaluation name bindings.
//!
//! An [`Activation`] maps names to values (and optionally to caller-supplied
//! function implementations) for one evaluation. Activations layer: a child
//! activation shadows its parent, the environment's integration defaults sit
//! below the caller's bindings, and the built-in constants `true`, `false`,
//! and `null` are never shadowed by any layer (they are lexed as literals,
//! and direct lookups short-circuit here as well). Transient comprehension
//! bindings are not stored here; the evaluator keeps them in its own frame
//! stack so an activation can be shared across concurrent evaluations.

use std::{fmt, sync::Arc};

use ahash::AHashMap;

use crate::{error::EvalResult, value::Value};

/// A caller-supplied function implementation taking evaluated arguments.
///
/// Functions bound on an activation are consulted before the environment's
/// registry and dispatch dynamically (no declared signature).
pub type NativeFunction = dyn Fn(&[Value]) -> EvalResult<Value> + Send + Sync;

/// Names bound by the language itself; no activation layer may rebind them.
const RESERVED_NAMES: &[&str] = &["true", "false", "null"];

/// A layered map of names to values and functions for one evaluation.
#[derive(Default, Clone)]
pub struct Activation {
    vars: AHashMap<Arc<str>, Value>,
    functions: AHashMap<Arc<str>, Arc<NativeFunction>>,
    parent: Option<Arc<Activation>>,
}

impl Activation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a variable. Binding a reserved name (`true`, `false`, `null`)
    /// is ignored; those resolve to the built-in constants in every scope.
    pub fn bind(&mut self, name: impl Into<Arc<str>>, value: Value) -> &mut Self {
        let name = name.into();
        if !RESERVED_NAMES.contains(&name.as_ref()) {
            self.vars.insert(name, value);
        }
        self
    }

    /// Binds a function implementation under a name. Callable from
    /// expressions like any registered function; takes precedence over the
    /// environment registry.
    pub fn bind_function<F>(&mut self, name: impl Into<Arc<str>>, function: F) -> &mut Self
    where
        F: Fn(&[Value]) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    /// Creates an empty activation layered on top of this one.
    #[must_use]
    pub fn child(self: &Arc<Self>) -> Self {
        Self {
            vars: AHashMap::new(),
            functions: AHashMap::new(),
            parent: Some(Arc::clone(self)),
        }
    }

    /// Looks a name up through the layer chain. Reserved names win over
    /// every layer.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            "true" => return Some(Value::Bool(true)),
            "false" => return Some(Value::Bool(false)),
            "null" => return Some(Value::Null),
            _ => {}
        }
        self.lookup(name)
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.vars.get(name) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    /// Looks up a caller-bound function implementation.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<Arc<NativeFunction>> {
        if let Some(f) = self.functions.get(name) {
            return Some(Arc::clone(f));
        }
        self.parent.as_ref().and_then(|p| p.function(name))
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activation")
            .field("vars", &self.vars)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("parent", &self.parent)
            .finish()
    }
}

impl<N: Into<Arc<str>>> FromIterator<(N, Value)> for Activation {
    fn from_iter<T: IntoIterator<Item = (N, Value)>>(iter: T) -> Self {
        let mut activation = Self::new();
        for (name, value) in iter {
            activation.bind(name, value);
        }
        activation
    }
}
