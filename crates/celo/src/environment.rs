//! The evaluation environment: declarations, function registry, struct-type
//! factories, and the container used for namespace resolution.
//!
//! Lifecycle: construct once, register everything, then compile programs and
//! evaluate each against per-evaluation activations. An environment is
//! immutable once the first program is compiled (enforced by `&self` on
//! [`Environment::compile`]) and may be shared across threads.

use std::sync::Arc;

use ahash::AHashMap;

use crate::{
    activation::Activation,
    error::{EvalResult, ParseError},
    eval::Program,
    functions::{FunctionRegistry, Overload, ParamKind, standard_registry},
    object::StructFactory,
    parse,
    value::{CelType, Value},
};

/// Shared environment for compiling and evaluating programs.
pub struct Environment {
    container: String,
    /// Declared variable types. Kept for diagnostics; runtime dispatch uses
    /// the actual value types.
    declarations: AHashMap<String, CelType>,
    registry: FunctionRegistry,
    struct_types: AHashMap<String, Arc<dyn StructFactory>>,
    /// Integration-supplied default bindings, consulted below the caller's
    /// activation.
    defaults: Activation,
}

impl Environment {
    /// Creates an environment with the standard library registered and the
    /// given container (namespace), e.g. `"a.b"` or `""` for the root.
    #[must_use]
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            declarations: AHashMap::new(),
            registry: standard_registry(),
            struct_types: AHashMap::new(),
            defaults: Activation::new(),
        }
    }

    #[must_use]
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Declares a variable's type. Declarations are documentation; an
    /// undeclared name bound in the activation still resolves.
    pub fn declare(&mut self, name: impl Into<String>, declared: CelType) -> &mut Self {
        self.declarations.insert(name.into(), declared);
        self
    }

    #[must_use]
    pub fn declaration(&self, name: &str) -> Option<&CelType> {
        self.declarations.get(name)
    }

    /// Registers a function overload. Overloads registered earlier under the
    /// same name are preferred when several match.
    pub fn register_function<F>(&mut self, name: &str, params: &[ParamKind], receiver: bool, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.registry.register(name, Overload::new(params, receiver, Arc::new(f)));
        self
    }

    /// Registers a struct-type factory under its fully-qualified name so
    /// struct literals can construct it.
    pub fn register_struct_type(&mut self, name: impl Into<String>, factory: Arc<dyn StructFactory>) -> &mut Self {
        self.struct_types.insert(name.into(), factory);
        self
    }

    /// Binds an integration-supplied default value, layered below the
    /// caller's activation.
    pub fn set_default(&mut self, name: impl Into<Arc<str>>, value: Value) -> &mut Self {
        self.defaults.bind(name, value);
        self
    }

    /// Compiles a source expression into a program bound to this
    /// environment.
    pub fn compile(&self, source: &str) -> Result<Program<'_>, ParseError> {
        let ast = parse::parse(source)?;
        Ok(Program::new(self, ast))
    }

    pub(crate) fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub(crate) fn default_binding(&self, name: &str) -> Option<Value> {
        self.defaults.get(name)
    }

    /// Candidate resolutions of `name` under this container, longest prefix
    /// first: container `a.b` resolves `x` as `a.b.x`, `a.x`, `x`. Absolute
    /// references skip the walk.
    pub(crate) fn resolve_candidates(&self, name: &str, absolute: bool) -> Vec<String> {
        if absolute || self.container.is_empty() {
            return vec![name.to_owned()];
        }
        let mut candidates = Vec::new();
        let mut prefix = self.container.as_str();
        loop {
            candidates.push(format!("{prefix}.{name}"));
            match prefix.rfind('.') {
                Some(idx) => prefix = &prefix[..idx],
                None => break,
            }
        }
        candidates.push(name.to_owned());
        candidates
    }

    /// Resolves a struct-literal type name against the container and returns
    /// its factory.
    pub(crate) fn struct_factory(&self, name: &str, absolute: bool) -> Option<&Arc<dyn StructFactory>> {
        self.resolve_candidates(name, absolute)
            .iter()
            .find_map(|candidate| self.struct_types.get(candidate))
    }
}
