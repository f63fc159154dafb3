//! An embeddable Common Expression Language (CEL) parser and evaluator.
//!
//! The pipeline is `source → AST → (environment, activation) → value or
//! error`: [`Environment::compile`] parses a source expression into an
//! immutable [`Program`], and [`Program::evaluate`] interprets it against a
//! per-evaluation [`Activation`]. Evaluation is pure, deterministic, and
//! never panics on well-formed input; failures come back as a structured
//! [`EvalError`].
//!
//! ```
//! use celo::{Activation, Environment, Value};
//!
//! let env = Environment::new("");
//! let program = env.compile("x * 2 + 1").unwrap();
//! let mut activation = Activation::new();
//! activation.bind("x", Value::Int(20));
//! assert_eq!(program.evaluate(&activation).unwrap(), Value::Int(41));
//! ```

mod activation;
mod environment;
mod error;
mod eval;
mod expressions;
mod functions;
mod json;
mod object;
mod parse;
mod temporal;
mod token;
mod value;

pub use crate::{
    activation::{Activation, NativeFunction},
    environment::Environment,
    error::{ErrorKind, EvalError, EvalResult, ParseError},
    eval::{CancellationToken, Program},
    functions::ParamKind,
    json::{json_to_value, json_to_value_typed, value_to_json},
    object::{DynField, DynStruct, DynStructType, FieldPresence, StructFactory, StructValue},
    temporal::{Duration, Timestamp},
    value::{CelType, Key, MapValue, Value},
};
