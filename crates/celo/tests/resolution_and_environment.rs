//! Name resolution, activation layering, custom functions, cancellation,
//! and cross-thread sharing of compiled programs.

use std::sync::Arc;

use celo::{
    Activation, CancellationToken, CelType, Environment, ErrorKind, ParamKind, Value, json_to_value,
};
use pretty_assertions::assert_eq;

#[test]
fn undeclared_reference_names_the_container() {
    let env = Environment::new("a.b");
    let program = env.compile("missing").unwrap();
    let err = program.evaluate(&Activation::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndeclaredReference);
    assert!(err.message().contains("undeclared reference to 'missing'"));
    assert!(err.message().contains("in container 'a.b'"));
}

#[test]
fn container_prefix_search_tries_longest_first() {
    let env = Environment::new("a.b");
    let program = env.compile("x").unwrap();

    let mut inner = Activation::new();
    inner.bind("a.b.x", Value::Int(1)).bind("a.x", Value::Int(2)).bind("x", Value::Int(3));
    assert_eq!(program.evaluate(&inner).unwrap(), Value::Int(1));

    let mut middle = Activation::new();
    middle.bind("a.x", Value::Int(2)).bind("x", Value::Int(3));
    assert_eq!(program.evaluate(&middle).unwrap(), Value::Int(2));

    let mut outer = Activation::new();
    outer.bind("x", Value::Int(3));
    assert_eq!(program.evaluate(&outer).unwrap(), Value::Int(3));
}

#[test]
fn absolute_references_skip_the_container() {
    let env = Environment::new("a.b");
    let mut activation = Activation::new();
    activation.bind("a.b.x", Value::Int(1)).bind("x", Value::Int(3));
    assert_eq!(env.compile(".x").unwrap().evaluate(&activation).unwrap(), Value::Int(3));
}

#[test]
fn caller_bindings_shadow_environment_defaults() {
    let mut env = Environment::new("");
    env.set_default("limit", Value::Int(10));
    let program = env.compile("limit").unwrap();
    assert_eq!(program.evaluate(&Activation::new()).unwrap(), Value::Int(10));
    let mut activation = Activation::new();
    activation.bind("limit", Value::Int(99));
    assert_eq!(program.evaluate(&activation).unwrap(), Value::Int(99));
}

#[test]
fn child_activation_layers_shadow() {
    let env = Environment::new("");
    let mut base = Activation::new();
    base.bind("x", Value::Int(1)).bind("y", Value::Int(2));
    let base = Arc::new(base);
    let mut top = base.child();
    top.bind("x", Value::Int(10));
    let program = env.compile("x + y").unwrap();
    assert_eq!(program.evaluate(&top).unwrap(), Value::Int(12));
}

#[test]
fn registered_functions_dispatch_by_type() {
    let mut env = Environment::new("");
    env.register_function("shout", &[ParamKind::String], false, |args| {
        let Value::String(s) = &args[0] else { unreachable!() };
        Ok(Value::string(s.to_uppercase()))
    });
    let program = env.compile("shout('hey')").unwrap();
    assert_eq!(program.evaluate(&Activation::new()).unwrap(), Value::from("HEY"));
    let err = env.compile("shout(1)").unwrap().evaluate(&Activation::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchOverload);
}

#[test]
fn receiver_style_functions_get_the_target_first() {
    let mut env = Environment::new("");
    env.register_function("repeat", &[ParamKind::String, ParamKind::Int], true, |args| {
        let (Value::String(s), Value::Int(n)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        Ok(Value::string(s.repeat(*n as usize)))
    });
    let program = env.compile("'ab'.repeat(3)").unwrap();
    assert_eq!(program.evaluate(&Activation::new()).unwrap(), Value::from("ababab"));
}

#[test]
fn activation_functions_take_precedence() {
    let mut env = Environment::new("");
    env.register_function("answer", &[], false, |_| Ok(Value::Int(1)));
    let program = env.compile("answer()").unwrap();
    let mut activation = Activation::new();
    activation.bind_function("answer", |_| Ok(Value::Int(42)));
    assert_eq!(program.evaluate(&activation).unwrap(), Value::Int(42));
    assert_eq!(program.evaluate(&Activation::new()).unwrap(), Value::Int(1));
}

#[test]
fn declarations_are_documentation() {
    let mut env = Environment::new("");
    env.declare("x", CelType::Int);
    assert_eq!(env.declaration("x"), Some(&CelType::Int));
    // an undeclared binding still resolves; dispatch is by runtime type
    let mut activation = Activation::new();
    activation.bind("y", Value::from("s"));
    assert_eq!(env.compile("y").unwrap().evaluate(&activation).unwrap(), Value::from("s"));
}

#[test]
fn cancellation_stops_comprehensions() {
    let env = Environment::new("");
    let mut activation = Activation::new();
    activation.bind("xs", Value::list((0..1000).map(Value::Int).collect()));
    let program = env.compile("xs.all(v, v >= 0)").unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let err = program.evaluate_cancellable(&activation, &token).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    // without cancelling, the same evaluation succeeds
    assert_eq!(
        program.evaluate_cancellable(&activation, &CancellationToken::new()).unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn programs_are_shareable_across_threads() {
    let mut env = Environment::new("");
    env.set_default("base", Value::Int(100));
    let program = env.compile("base + x * x").unwrap();
    let results: Vec<Value> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let program = &program;
                scope.spawn(move || {
                    let mut activation = Activation::new();
                    activation.bind("x", Value::Int(i));
                    program.evaluate(&activation).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for (i, value) in results.iter().enumerate() {
        assert_eq!(*value, Value::Int(100 + (i as i64) * (i as i64)));
    }
}

#[test]
fn json_documents_bind_and_compare() {
    let env = Environment::new("");
    let mut activation = Activation::new();
    activation.bind(
        "doc",
        json_to_value(&serde_json::json!({"user": {"age": 42, "tags": ["a", "b"]}})),
    );
    let program = env.compile("doc.user.age == 42 && doc.user.tags.size() == 2").unwrap();
    assert_eq!(program.evaluate(&activation).unwrap(), Value::Bool(true));
}
