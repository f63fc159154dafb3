//! String predicates: `startsWith`, `endsWith`, `contains`, and `matches`.
//!
//! `matches` delegates to the regex crate, whose syntax is the RE2-compatible
//! subset CEL uses; the pattern is compiled per call and an invalid pattern
//! is an invalid-argument error, not a parse failure.

use regex::Regex;

use crate::{
    error::{ErrorKind, EvalError, EvalResult},
    functions::{FunctionRegistry, ParamKind},
    value::Value,
};

const STR_STR: &[ParamKind] = &[ParamKind::String, ParamKind::String];

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register_fn("startsWith", STR_STR, true, |args| {
        let (Value::String(s), Value::String(prefix)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        Ok(Value::Bool(s.starts_with(prefix.as_ref())))
    });
    registry.register_fn("endsWith", STR_STR, true, |args| {
        let (Value::String(s), Value::String(suffix)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        Ok(Value::Bool(s.ends_with(suffix.as_ref())))
    });
    registry.register_fn("contains", STR_STR, true, |args| {
        let (Value::String(s), Value::String(needle)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        Ok(Value::Bool(s.contains(needle.as_ref())))
    });
    // matches comes in receiver and global form
    for receiver in [true, false] {
        registry.register_fn("matches", STR_STR, receiver, |args| {
            let (Value::String(s), Value::String(pattern)) = (&args[0], &args[1]) else {
                unreachable!()
            };
            regex_matches(s, pattern)
        });
    }
}

fn regex_matches(text: &str, pattern: &str) -> EvalResult<Value> {
    let re = Regex::new(pattern)
        .map_err(|e| EvalError::new(ErrorKind::InvalidArgument, format!("invalid regex pattern: {e}")))?;
    Ok(Value::Bool(re.is_match(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::standard_registry;

    #[test]
    fn predicates_are_receiver_style() {
        let registry = standard_registry();
        let args = [Value::from("hello world"), Value::from("hello")];
        assert_eq!(registry.call("startsWith", true, &args).unwrap(), Value::Bool(true));
        assert_eq!(registry.call("endsWith", true, &args).unwrap(), Value::Bool(false));
        assert_eq!(registry.call("contains", true, &args).unwrap(), Value::Bool(true));
    }

    #[test]
    fn matches_is_unanchored() {
        let registry = standard_registry();
        let args = [Value::from("cows"), Value::from("ow")];
        assert_eq!(registry.call("matches", true, &args).unwrap(), Value::Bool(true));
    }

    #[test]
    fn invalid_pattern_is_invalid_argument() {
        let registry = standard_registry();
        let args = [Value::from("x"), Value::from("(")];
        let err = registry.call("matches", true, &args).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
