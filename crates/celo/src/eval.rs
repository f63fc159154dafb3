//! The evaluator: a recursive walk over the AST.
//!
//! Evaluation is pure and deterministic given an activation. Errors are
//! values in the `Err` arm of [`EvalResult`]; the logical operators, the
//! ternary, `in`, and comprehension steps inspect operand results and mask
//! an error whenever the other operand forces the result. Nothing here
//! panics on well-formed input, and no host error escapes as an exception.

use std::{
    cmp::Ordering,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering as AtomicOrdering},
    },
};

use smallvec::SmallVec;

use crate::{
    activation::Activation,
    environment::Environment,
    error::{ErrorKind, EvalError, EvalResult},
    expressions::{Comprehension, Expr, ExprLoc, Literal, operators},
    object::FieldPresence,
    value::{Key, MapValue, Value},
};

/// Cooperative cancellation for long evaluations.
///
/// Consulted at every function call and comprehension iteration boundary;
/// once cancelled, evaluation unwinds with a `Cancelled` error that
/// propagates like any other evaluation error.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, AtomicOrdering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(AtomicOrdering::Relaxed)
    }
}

/// A compiled program: an AST bound to its environment.
///
/// Immutable and shareable; concurrent evaluations against distinct
/// activations are safe.
pub struct Program<'env> {
    env: &'env Environment,
    ast: ExprLoc,
}

impl<'env> Program<'env> {
    pub(crate) fn new(env: &'env Environment, ast: ExprLoc) -> Self {
        Self { env, ast }
    }

    /// Evaluates against an activation, producing a value or a structured
    /// error.
    pub fn evaluate(&self, activation: &Activation) -> EvalResult<Value> {
        let mut interp = Interpreter {
            env: self.env,
            activation,
            cancel: None,
            frames: Vec::new(),
        };
        interp.eval(&self.ast)
    }

    /// Like [`evaluate`](Self::evaluate), with a cancellation token checked
    /// at call and iteration boundaries.
    pub fn evaluate_cancellable(&self, activation: &Activation, token: &CancellationToken) -> EvalResult<Value> {
        let mut interp = Interpreter {
            env: self.env,
            activation,
            cancel: Some(token),
            frames: Vec::new(),
        };
        interp.eval(&self.ast)
    }

    /// The canonical printed form of the parsed expression. Re-parsing it
    /// yields an equivalent program.
    #[must_use]
    pub fn unparse(&self) -> String {
        self.ast.unparse()
    }
}

/// One transient comprehension scope: the iteration variable plus the
/// accumulator. The accumulator slot holds a full result so a masked step
/// error can ride along until a later iteration resolves or surfaces it.
struct Frame {
    iter_name: Arc<str>,
    iter_value: Value,
    accu_name: Arc<str>,
    accu: EvalResult<Value>,
}

struct Interpreter<'a> {
    env: &'a Environment,
    activation: &'a Activation,
    cancel: Option<&'a CancellationToken>,
    /// Innermost comprehension frame last.
    frames: Vec<Frame>,
}

impl Interpreter<'_> {
    fn check_cancelled(&self) -> EvalResult<()> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(EvalError::cancelled()),
            _ => Ok(()),
        }
    }

    fn eval(&mut self, expr: &ExprLoc) -> EvalResult<Value> {
        match &expr.expr {
            Expr::Literal(lit) => Ok(literal_value(lit)),
            Expr::Ident { name, absolute } => self.resolve_chain(&[name.clone()], *absolute),
            Expr::Select {
                operand,
                field,
                test_only,
            } => {
                // a pure ident/select chain resolves as one qualified name,
                // so a binding for "a.b.c" beats field selection off "a.b"
                if !*test_only
                    && let Some((mut parts, absolute)) = flatten_chain(operand)
                {
                    parts.push(field.clone());
                    return self.resolve_chain(&parts, absolute);
                }
                self.eval_select(operand, field, *test_only)
            }
            Expr::Call { function, target, args } => self.eval_call(function, target.as_deref(), args),
            Expr::List(elems) => {
                let mut values = Vec::with_capacity(elems.len());
                for e in elems {
                    values.push(self.eval(e)?);
                }
                Ok(Value::list(values))
            }
            Expr::Map(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = self.eval(k)?;
                    let value = self.eval(v)?;
                    pairs.push((key, value));
                }
                MapValue::build(pairs).map(Value::Map)
            }
            Expr::Struct {
                type_name,
                absolute,
                fields,
            } => self.eval_struct(type_name, *absolute, fields),
            Expr::Comprehension(comp) => self.eval_comprehension(comp),
        }
    }

    // --- name resolution -------------------------------------------------

    /// Resolves a selection chain rooted at an identifier.
    ///
    /// Comprehension bindings shadow everything by simple name. Otherwise
    /// candidates are tried container-prefix first, and within one prefix
    /// the longest dotted name wins before falling back to resolving a
    /// shorter prefix and treating the remainder as field selections.
    fn resolve_chain(&mut self, parts: &[Arc<str>], absolute: bool) -> EvalResult<Value> {
        if let Some(result) = self.frame_lookup(&parts[0]) {
            let mut value = result?;
            for field in &parts[1..] {
                value = self.field_access(&value, field)?;
            }
            return Ok(value);
        }

        let full = parts.join(".");
        for prefix in self.container_prefixes(absolute) {
            for split in (1..=parts.len()).rev() {
                let name = compose_name(&prefix, &parts[..split]);
                if let Some(value) = self.lookup_binding(&name) {
                    let mut value = value;
                    for field in &parts[split..] {
                        value = self.field_access(&value, field)?;
                    }
                    return Ok(value);
                }
            }
        }
        Err(EvalError::undeclared_reference(&full, self.env.container()))
    }

    /// Innermost comprehension binding for a simple name, if any.
    fn frame_lookup(&self, name: &str) -> Option<EvalResult<Value>> {
        for frame in self.frames.iter().rev() {
            if name == frame.accu_name.as_ref() {
                return Some(frame.accu.clone());
            }
            if name == frame.iter_name.as_ref() {
                return Some(Ok(frame.iter_value.clone()));
            }
        }
        None
    }

    fn lookup_binding(&self, name: &str) -> Option<Value> {
        self.activation.get(name).or_else(|| self.env.default_binding(name))
    }

    fn container_prefixes(&self, absolute: bool) -> Vec<String> {
        let container = self.env.container();
        if absolute || container.is_empty() {
            return vec![String::new()];
        }
        let mut prefixes = Vec::new();
        let mut prefix = container;
        loop {
            prefixes.push(prefix.to_owned());
            match prefix.rfind('.') {
                Some(idx) => prefix = &prefix[..idx],
                None => break,
            }
        }
        prefixes.push(String::new());
        prefixes
    }

    // --- selection -------------------------------------------------------

    fn eval_select(&mut self, operand: &ExprLoc, field: &Arc<str>, test_only: bool) -> EvalResult<Value> {
        // the receiver of a presence test still resolves as a qualified name
        let value = if let Some((parts, absolute)) = flatten_chain(operand) {
            self.resolve_chain(&parts, absolute)?
        } else {
            self.eval(operand)?
        };
        if test_only {
            self.presence_test(&value, field)
        } else {
            self.field_access(&value, field)
        }
    }

    fn field_access(&self, value: &Value, field: &str) -> EvalResult<Value> {
        match value {
            Value::Map(map) => map
                .get(&Key::String(Arc::from(field)))
                .cloned()
                .ok_or_else(|| EvalError::no_such_key(field)),
            Value::Object(obj) => match obj.field(field) {
                Some((value, _)) => Ok(value),
                None => Err(EvalError::no_such_field(field)),
            },
            other => Err(EvalError::no_field_selection(other.cel_type())),
        }
    }

    /// `has(e.f)` presence semantics.
    fn presence_test(&self, value: &Value, field: &str) -> EvalResult<Value> {
        match value {
            Value::Map(map) => Ok(Value::Bool(map.get(&Key::String(Arc::from(field))).is_some())),
            Value::Object(obj) => match obj.field(field) {
                Some((_, FieldPresence::Present)) => Ok(Value::Bool(true)),
                Some((_, FieldPresence::Default)) => Ok(Value::Bool(false)),
                None => Err(EvalError::no_such_member(field)),
            },
            other => Err(EvalError::no_field_selection(other.cel_type())),
        }
    }

    // --- calls -----------------------------------------------------------

    fn eval_call(&mut self, function: &str, target: Option<&ExprLoc>, args: &[ExprLoc]) -> EvalResult<Value> {
        use operators as ops;
        match function {
            ops::LOGICAL_AND => return self.eval_and(&args[0], &args[1]),
            ops::LOGICAL_OR => return self.eval_or(&args[0], &args[1]),
            ops::CONDITIONAL => return self.eval_conditional(&args[0], &args[1], &args[2]),
            ops::NOT_STRICTLY_FALSE => {
                return Ok(Value::Bool(!matches!(self.eval(&args[0]), Ok(Value::Bool(false)))));
            }
            _ => {}
        }
        if let Some(op) = strict_operator(function) {
            let left = self.eval(&args[0])?;
            match op {
                StrictOp::Not => return left.op_not(),
                StrictOp::Neg => return left.op_neg(),
                _ => {}
            }
            let right = self.eval(&args[1])?;
            return apply_strict(op, &left, &right);
        }

        // named function: evaluate receiver and arguments left-to-right
        self.check_cancelled()?;
        let mut values: SmallVec<[Value; 4]> = SmallVec::new();
        let receiver_style = target.is_some();
        if let Some(t) = target {
            values.push(self.eval(t)?);
        }
        for a in args {
            values.push(self.eval(a)?);
        }
        if let Some(bound) = self.activation.function(function) {
            return bound(&values);
        }
        self.env.registry().call(function, receiver_style, &values)
    }

    /// `&&` with error masking: a `false` on either side wins over an error
    /// on the other.
    fn eval_and(&mut self, lhs: &ExprLoc, rhs: &ExprLoc) -> EvalResult<Value> {
        let left = self.eval(lhs);
        if matches!(left, Ok(Value::Bool(false))) {
            return Ok(Value::Bool(false));
        }
        let right = self.eval(rhs);
        if matches!(right, Ok(Value::Bool(false))) {
            return Ok(Value::Bool(false));
        }
        match (left, right) {
            (Ok(Value::Bool(true)), Ok(Value::Bool(true))) => Ok(Value::Bool(true)),
            (Err(e), _) | (_, Err(e)) => Err(e),
            (Ok(l), Ok(r)) => Err(EvalError::no_such_overload_binary("&&", l.cel_type(), r.cel_type())),
        }
    }

    /// `||` with error masking: a `true` on either side wins over an error
    /// on the other.
    fn eval_or(&mut self, lhs: &ExprLoc, rhs: &ExprLoc) -> EvalResult<Value> {
        let left = self.eval(lhs);
        if matches!(left, Ok(Value::Bool(true))) {
            return Ok(Value::Bool(true));
        }
        let right = self.eval(rhs);
        if matches!(right, Ok(Value::Bool(true))) {
            return Ok(Value::Bool(true));
        }
        match (left, right) {
            (Ok(Value::Bool(false)), Ok(Value::Bool(false))) => Ok(Value::Bool(false)),
            (Err(e), _) | (_, Err(e)) => Err(e),
            (Ok(l), Ok(r)) => Err(EvalError::no_such_overload_binary("||", l.cel_type(), r.cel_type())),
        }
    }

    /// `c ? a : b`: a condition error surfaces; only the chosen branch is
    /// evaluated.
    fn eval_conditional(&mut self, cond: &ExprLoc, then: &ExprLoc, otherwise: &ExprLoc) -> EvalResult<Value> {
        match self.eval(cond)? {
            Value::Bool(true) => self.eval(then),
            Value::Bool(false) => self.eval(otherwise),
            other => Err(EvalError::new(
                ErrorKind::NoSuchOverload,
                format!("no such overload: ternary condition must be bool, found {}", other.cel_type()),
            )),
        }
    }

    // --- aggregates ------------------------------------------------------

    fn eval_struct(&mut self, type_name: &str, absolute: bool, fields: &[(Arc<str>, ExprLoc)]) -> EvalResult<Value> {
        let Some(factory) = self.env.struct_factory(type_name, absolute) else {
            return Err(EvalError::undeclared_reference(type_name, self.env.container()));
        };
        let factory = Arc::clone(factory);
        let mut values = Vec::with_capacity(fields.len());
        for (name, expr) in fields {
            values.push((name.clone(), self.eval(expr)?));
        }
        factory.instantiate(values)
    }

    fn eval_comprehension(&mut self, comp: &Comprehension) -> EvalResult<Value> {
        let range = self.eval(&comp.iter_range)?;
        let items: Vec<Value> = match &range {
            Value::List(elems) => elems.iter().cloned().collect(),
            Value::Map(map) => map.keys().map(Key::to_value).collect(),
            other => {
                return Err(EvalError::new(
                    ErrorKind::NoSuchOverload,
                    format!("no such overload: cannot iterate {}", other.cel_type()),
                ));
            }
        };

        let accu_init = self.eval(&comp.accu_init)?;
        self.frames.push(Frame {
            iter_name: comp.iter_var.clone(),
            iter_value: Value::Null,
            accu_name: comp.accu_var.clone(),
            accu: Ok(accu_init),
        });

        let result = self.run_comprehension(comp, items);
        self.frames.pop();
        result
    }

    fn run_comprehension(&mut self, comp: &Comprehension, items: Vec<Value>) -> EvalResult<Value> {
        for item in items {
            self.check_cancelled()?;
            let frame = self.frames.last_mut().expect("comprehension frame just pushed");
            frame.iter_value = item;

            match self.eval(&comp.loop_cond) {
                Ok(Value::Bool(true)) => {}
                Ok(Value::Bool(false)) => break,
                Ok(other) => {
                    return Err(EvalError::new(
                        ErrorKind::NoSuchOverload,
                        format!("no such overload: loop condition must be bool, found {}", other.cel_type()),
                    ));
                }
                Err(e) => return Err(e),
            }

            // the step may produce an error; it is kept in the accumulator
            // slot because a later `&&`/`||` step can still mask it
            let next = self.eval(&comp.loop_step);
            let frame = self.frames.last_mut().expect("comprehension frame just pushed");
            frame.accu = next;
        }
        self.eval(&comp.result)
    }
}

// --- operator plumbing ---------------------------------------------------

#[derive(Clone, Copy)]
enum StrictOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Index,
    Not,
    Neg,
}

fn strict_operator(function: &str) -> Option<StrictOp> {
    use operators as ops;
    Some(match function {
        ops::EQUALS => StrictOp::Eq,
        ops::NOT_EQUALS => StrictOp::Ne,
        ops::LESS => StrictOp::Lt,
        ops::LESS_EQUALS => StrictOp::Le,
        ops::GREATER => StrictOp::Gt,
        ops::GREATER_EQUALS => StrictOp::Ge,
        ops::IN => StrictOp::In,
        ops::ADD => StrictOp::Add,
        ops::SUBTRACT => StrictOp::Sub,
        ops::MULTIPLY => StrictOp::Mul,
        ops::DIVIDE => StrictOp::Div,
        ops::MODULO => StrictOp::Rem,
        ops::INDEX => StrictOp::Index,
        ops::LOGICAL_NOT => StrictOp::Not,
        ops::NEGATE => StrictOp::Neg,
        _ => return None,
    })
}

fn apply_strict(op: StrictOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match op {
        StrictOp::Eq => left.eq_value(right).map(Value::Bool),
        StrictOp::Ne => left.eq_value(right).map(|eq| Value::Bool(!eq)),
        StrictOp::Lt => left
            .compare(right, "<")
            .map(|o| Value::Bool(o.is_some_and(Ordering::is_lt))),
        StrictOp::Le => left
            .compare(right, "<=")
            .map(|o| Value::Bool(o.is_some_and(Ordering::is_le))),
        StrictOp::Gt => left
            .compare(right, ">")
            .map(|o| Value::Bool(o.is_some_and(Ordering::is_gt))),
        StrictOp::Ge => left
            .compare(right, ">=")
            .map(|o| Value::Bool(o.is_some_and(Ordering::is_ge))),
        StrictOp::In => Value::contains(right, left).map(Value::Bool),
        StrictOp::Add => left.op_add(right),
        StrictOp::Sub => left.op_sub(right),
        StrictOp::Mul => left.op_mul(right),
        StrictOp::Div => left.op_div(right),
        StrictOp::Rem => left.op_rem(right),
        StrictOp::Index => left.op_index(right),
        StrictOp::Not | StrictOp::Neg => unreachable!("unary operators are handled before operand evaluation"),
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Uint(u) => Value::Uint(*u),
        Literal::Double(d) => Value::Double(*d),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Bytes(b) => Value::Bytes(b.clone()),
    }
}

/// Flattens a pure ident/select chain into its dotted parts, or None when
/// the chain is rooted in anything but an identifier.
fn flatten_chain(expr: &ExprLoc) -> Option<(Vec<Arc<str>>, bool)> {
    match &expr.expr {
        Expr::Ident { name, absolute } => Some((vec![name.clone()], *absolute)),
        Expr::Select {
            operand,
            field,
            test_only: false,
        } => {
            let (mut parts, absolute) = flatten_chain(operand)?;
            parts.push(field.clone());
            Some((parts, absolute))
        }
        _ => None,
    }
}

fn compose_name(prefix: &str, parts: &[Arc<str>]) -> String {
    let dotted = parts.join(".");
    if prefix.is_empty() {
        dotted
    } else {
        format!("{prefix}.{dotted}")
    }
}
