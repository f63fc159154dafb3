use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::value::CelType;

/// Result type alias for operations that can produce an evaluation error.
pub type EvalResult<T> = Result<T, EvalError>;

/// Evaluation error kinds the core distinguishes.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string representation matches the variant name exactly
/// (e.g., `NoSuchOverload` -> "NoSuchOverload"). Conformance matching is done on
/// message substrings, not on kind names, so the kind is purely structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed source rejected by the parser.
    Parse,
    /// Identifier not bound in the activation (after container resolution).
    UndeclaredReference,
    /// Operator or function invoked with arguments no overload matches.
    NoSuchOverload,
    /// Function name with no registered overloads at all.
    UnboundFunction,
    /// Missing struct or map field during selection.
    NoSuchField,
    /// Missing map key via operator indexing or `in`.
    NoSuchKey,
    /// Integer or duration/timestamp arithmetic overflow, or conversion out of range.
    Overflow,
    DivideByZero,
    ModulusByZero,
    /// Timestamp/duration outside the representable range, including during parsing.
    Range,
    /// Invalid argument value, e.g. a list index out of range.
    InvalidArgument,
    /// Failed value conversion, e.g. invalid UTF-8 in `string(bytes)`.
    Conversion,
    /// Map construction with a Double or Null key.
    UnsupportedKeyType,
    /// Map construction with a duplicate key.
    RepeatedKey,
    /// Evaluation interrupted through a [`CancellationToken`](crate::CancellationToken).
    Cancelled,
    /// An invariant the evaluator relies on was broken. Reaching this is a bug.
    Internal,
}

/// A structured evaluation error: a kind plus a human-readable message.
///
/// Errors are ordinary values during evaluation. The logical operators, the
/// ternary, `in`, and the short-circuiting comprehensions inspect operand
/// results and may mask an error when the other operand forces the result;
/// anywhere else the error propagates to the caller of
/// [`Program::evaluate`](crate::Program::evaluate). An `EvalError` is never
/// converted into a panic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalError {
    kind: ErrorKind,
    message: String,
}

impl EvalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Overload failure for a binary operator, e.g. `no such overload: int + string`.
    pub(crate) fn no_such_overload_binary(op: &str, left: CelType, right: CelType) -> Self {
        Self::new(
            ErrorKind::NoSuchOverload,
            format!("no such overload: {left} {op} {right}"),
        )
    }

    /// Overload failure for a unary operator, e.g. `no such overload: -uint`.
    pub(crate) fn no_such_overload_unary(op: &str, operand: CelType) -> Self {
        Self::new(ErrorKind::NoSuchOverload, format!("no such overload: {op}{operand}"))
    }

    /// Overload failure for a named function call. The argument type list
    /// includes the receiver for method-style calls.
    pub(crate) fn no_such_overload_function(function: &str, arg_types: &[CelType]) -> Self {
        let mut types = String::new();
        for (i, t) in arg_types.iter().enumerate() {
            if i > 0 {
                types.push_str(", ");
            }
            types.push_str(&t.to_string());
        }
        Self::new(
            ErrorKind::NoSuchOverload,
            format!("no such overload for function '{function}' applied to ({types})"),
        )
    }

    pub(crate) fn unbound_function(function: &str) -> Self {
        Self::new(ErrorKind::UnboundFunction, format!("unbound function: '{function}'"))
    }

    /// Integer, duration, or timestamp arithmetic overflow.
    ///
    /// The message is fixed so conformance suites can match on the
    /// "return error for overflow" substring.
    pub(crate) fn overflow() -> Self {
        Self::new(ErrorKind::Overflow, "return error for overflow")
    }

    pub(crate) fn divide_by_zero() -> Self {
        Self::new(ErrorKind::DivideByZero, "divide by zero")
    }

    pub(crate) fn modulus_by_zero() -> Self {
        Self::new(ErrorKind::ModulusByZero, "modulus by zero")
    }

    pub(crate) fn no_such_key(key: impl Display) -> Self {
        Self::new(ErrorKind::NoSuchKey, format!("no such key: '{key}'"))
    }

    pub(crate) fn no_such_field(field: &str) -> Self {
        Self::new(ErrorKind::NoSuchField, format!("no such field: '{field}'"))
    }

    pub(crate) fn no_such_member(member: &str) -> Self {
        Self::new(ErrorKind::NoSuchField, format!("no such member: '{member}'"))
    }

    pub(crate) fn no_field_selection(actual: CelType) -> Self {
        Self::new(
            ErrorKind::NoSuchOverload,
            format!("type '{actual}' does not support field selection"),
        )
    }

    pub(crate) fn undeclared_reference(name: &str, container: &str) -> Self {
        Self::new(
            ErrorKind::UndeclaredReference,
            format!("undeclared reference to '{name}' (in container '{container}')"),
        )
    }

    pub(crate) fn unsupported_key_type(actual: CelType) -> Self {
        Self::new(
            ErrorKind::UnsupportedKeyType,
            format!("unsupported key type: {actual}"),
        )
    }

    pub(crate) fn repeated_key(key: impl Display) -> Self {
        Self::new(ErrorKind::RepeatedKey, format!("Failed with repeated key: {key}"))
    }

    pub(crate) fn index_out_of_range(index: impl Display) -> Self {
        Self::new(ErrorKind::InvalidArgument, format!("index out of range: {index}"))
    }

    pub(crate) fn range(what: &str) -> Self {
        Self::new(ErrorKind::Range, format!("{what} out of range"))
    }

    pub(crate) fn conversion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conversion, message)
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }
}

impl Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// A syntax error produced by the lexer or parser, with position and a
/// single line of source context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    message: String,
    /// 1-based line of the offending token.
    line: u32,
    /// 1-based column of the offending token, in characters.
    column: u32,
    /// The source line the error points into, for display.
    excerpt: String,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, line: u32, column: u32, excerpt: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            excerpt: excerpt.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn column(&self) -> u32 {
        self.column
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}:{}: {}", self.line, self.column, self.message)?;
        writeln!(f, " | {}", self.excerpt)?;
        // caret under the offending column; the excerpt is a single line
        let pad = " ".repeat(self.column.saturating_sub(1) as usize);
        write!(f, " | {pad}^")
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_strum() {
        let kind: ErrorKind = "NoSuchOverload".parse().unwrap();
        assert_eq!(kind, ErrorKind::NoSuchOverload);
        assert_eq!(kind.to_string(), "NoSuchOverload");
    }

    #[test]
    fn overflow_message_is_conformance_stable() {
        assert_eq!(EvalError::overflow().to_string(), "return error for overflow");
    }

    #[test]
    fn parse_error_display_points_at_column() {
        let err = ParseError::new("unexpected token ']'", 1, 4, "[1,]");
        let rendered = err.to_string();
        assert!(rendered.contains("1:4"));
        assert!(rendered.lines().last().unwrap().ends_with("   ^"));
    }
}
