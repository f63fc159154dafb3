use std::{fmt::Write, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::value::format_double;

/// Reserved function names used for operators in `Expr::Call` nodes.
///
/// Operators are ordinary calls with names no user identifier can collide
/// with. The evaluator dispatches on these names before consulting the
/// function registry.
pub(crate) mod operators {
    pub const CONDITIONAL: &str = "_?_:_";
    pub const LOGICAL_AND: &str = "_&&_";
    pub const LOGICAL_OR: &str = "_||_";
    pub const LOGICAL_NOT: &str = "!_";
    pub const EQUALS: &str = "_==_";
    pub const NOT_EQUALS: &str = "_!=_";
    pub const LESS: &str = "_<_";
    pub const LESS_EQUALS: &str = "_<=_";
    pub const GREATER: &str = "_>_";
    pub const GREATER_EQUALS: &str = "_>=_";
    pub const IN: &str = "@in";
    pub const ADD: &str = "_+_";
    pub const SUBTRACT: &str = "_-_";
    pub const MULTIPLY: &str = "_*_";
    pub const DIVIDE: &str = "_/_";
    pub const MODULO: &str = "_%_";
    pub const NEGATE: &str = "-_";
    pub const INDEX: &str = "_[_]";
    /// Comprehension loop condition helper: `true` unless the argument is
    /// strictly `false` (errors count as "not strictly false" so that a later
    /// iteration may still mask them).
    pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";
}

/// 1-based source position of a node, kept for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A literal constant carried directly in the AST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
}

/// An expression with its source position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ExprLoc {
    pub span: Span,
    pub expr: Expr,
}

impl ExprLoc {
    pub fn new(span: Span, expr: Expr) -> Self {
        Self { span, expr }
    }
}

/// An expression in the AST.
///
/// The shape follows the CEL reference representation: operators are `Call`
/// nodes with reserved names (see [`operators`]), macros are lowered to
/// [`Comprehension`] during parsing, and `has(e.f)` becomes a `Select` with
/// `test_only` set. Nodes are immutable after parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Expr {
    Literal(Literal),
    /// A (possibly dotted) identifier to be resolved against the activation
    /// using longest-prefix container resolution. A leading `.` in source
    /// marks the reference absolute, skipping the container walk.
    Ident {
        name: Arc<str>,
        absolute: bool,
    },
    /// Field selection `operand.field`, or a presence test when `test_only`
    /// is set (produced by the `has()` macro).
    Select {
        operand: Box<ExprLoc>,
        field: Arc<str>,
        test_only: bool,
    },
    /// A function or operator call. `target` is the receiver for
    /// method-style calls (`s.startsWith(x)`); operators never have one.
    Call {
        function: Arc<str>,
        target: Option<Box<ExprLoc>>,
        args: Vec<ExprLoc>,
    },
    List(Vec<ExprLoc>),
    /// Map literal entries in source order.
    Map(Vec<(ExprLoc, ExprLoc)>),
    /// Struct literal `Name{field: expr, ...}`. The type name is resolved
    /// against the container at evaluation time.
    Struct {
        type_name: Arc<str>,
        absolute: bool,
        fields: Vec<(Arc<str>, ExprLoc)>,
    },
    Comprehension(Box<Comprehension>),
}

/// Which macro a comprehension was lowered from.
///
/// Kept so the canonical printer can reconstruct the macro call form; the
/// evaluator never consults it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum MacroKind {
    All,
    Exists,
    ExistsOne,
    /// Two-argument `e.map(v, t)`.
    Map,
    /// Three-argument `e.map(v, p, t)` (filter + transform).
    MapFilter,
    Filter,
}

impl MacroKind {
    pub fn function_name(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Exists => "exists",
            Self::ExistsOne => "exists_one",
            Self::Map | Self::MapFilter => "map",
            Self::Filter => "filter",
        }
    }
}

/// The internal form every macro lowers to.
///
/// Semantics: evaluate `iter_range` (List elements or Map keys);
/// bind `accu_var` to `accu_init`; for each element bind `iter_var`, stop
/// early when `loop_cond` is strictly false, reassign `accu_var` from
/// `loop_step`; finally evaluate `result` with the last accumulator bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Comprehension {
    pub kind: MacroKind,
    pub iter_var: Arc<str>,
    pub iter_range: ExprLoc,
    pub accu_var: Arc<str>,
    pub accu_init: ExprLoc,
    pub loop_cond: ExprLoc,
    pub loop_step: ExprLoc,
    pub result: ExprLoc,
}

/// Name of the accumulator variable macros bind. Deliberately not a legal
/// CEL identifier so user code cannot collide with it.
pub(crate) const ACCUMULATOR_VAR: &str = "@result";

impl ExprLoc {
    /// Renders the canonical source form of this expression.
    ///
    /// Re-parsing the output yields an equivalent AST: operators are printed
    /// fully parenthesized and comprehensions are printed back in their macro
    /// call form.
    pub fn unparse(&self) -> String {
        let mut out = String::new();
        self.unparse_into(&mut out);
        out
    }

    fn unparse_into(&self, out: &mut String) {
        match &self.expr {
            Expr::Literal(lit) => unparse_literal(lit, out),
            Expr::Ident { name, absolute } => {
                if *absolute {
                    out.push('.');
                }
                out.push_str(name);
            }
            Expr::Select {
                operand,
                field,
                test_only,
            } => {
                if *test_only {
                    out.push_str("has(");
                }
                operand.unparse_into(out);
                out.push('.');
                out.push_str(field);
                if *test_only {
                    out.push(')');
                }
            }
            Expr::Call { function, target, args } => unparse_call(function, target.as_deref(), args, out),
            Expr::List(elems) => {
                out.push('[');
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    e.unparse_into(out);
                }
                out.push(']');
            }
            Expr::Map(entries) => {
                out.push('{');
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.unparse_into(out);
                    out.push_str(": ");
                    v.unparse_into(out);
                }
                out.push('}');
            }
            Expr::Struct {
                type_name,
                absolute,
                fields,
            } => {
                if *absolute {
                    out.push('.');
                }
                out.push_str(type_name);
                out.push('{');
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(name);
                    out.push_str(": ");
                    value.unparse_into(out);
                }
                out.push('}');
            }
            Expr::Comprehension(comp) => unparse_comprehension(comp, out),
        }
    }
}

fn unparse_literal(lit: &Literal, out: &mut String) {
    match lit {
        Literal::Null => out.push_str("null"),
        Literal::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Literal::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Literal::Uint(u) => {
            let _ = write!(out, "{u}u");
        }
        Literal::Double(d) => out.push_str(&format_double(*d)),
        Literal::String(s) => unparse_string(s, out),
        Literal::Bytes(b) => {
            out.push_str("b\"");
            for byte in b.iter() {
                let _ = write!(out, "\\x{byte:02x}");
            }
            out.push('"');
        }
    }
}

fn unparse_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn unparse_call(function: &str, target: Option<&ExprLoc>, args: &[ExprLoc], out: &mut String) {
    use operators as ops;
    // operator calls print fully parenthesized so precedence never shifts
    // on re-parse
    match function {
        ops::CONDITIONAL => {
            out.push('(');
            args[0].unparse_into(out);
            out.push_str(" ? ");
            args[1].unparse_into(out);
            out.push_str(" : ");
            args[2].unparse_into(out);
            out.push(')');
            return;
        }
        ops::LOGICAL_NOT | ops::NEGATE => {
            out.push('(');
            out.push_str(&function[..1]);
            args[0].unparse_into(out);
            out.push(')');
            return;
        }
        ops::INDEX => {
            args[0].unparse_into(out);
            out.push('[');
            args[1].unparse_into(out);
            out.push(']');
            return;
        }
        ops::IN => {
            out.push('(');
            args[0].unparse_into(out);
            out.push_str(" in ");
            args[1].unparse_into(out);
            out.push(')');
            return;
        }
        _ => {}
    }
    if let Some(symbol) = infix_symbol(function) {
        out.push('(');
        args[0].unparse_into(out);
        let _ = write!(out, " {symbol} ");
        args[1].unparse_into(out);
        out.push(')');
        return;
    }
    if let Some(target) = target {
        target.unparse_into(out);
        out.push('.');
    }
    out.push_str(function);
    out.push('(');
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        a.unparse_into(out);
    }
    out.push(')');
}

fn infix_symbol(function: &str) -> Option<&'static str> {
    use operators as ops;
    Some(match function {
        ops::LOGICAL_AND => "&&",
        ops::LOGICAL_OR => "||",
        ops::EQUALS => "==",
        ops::NOT_EQUALS => "!=",
        ops::LESS => "<",
        ops::LESS_EQUALS => "<=",
        ops::GREATER => ">",
        ops::GREATER_EQUALS => ">=",
        ops::ADD => "+",
        ops::SUBTRACT => "-",
        ops::MULTIPLY => "*",
        ops::DIVIDE => "/",
        ops::MODULO => "%",
        _ => return None,
    })
}

/// Reconstructs the macro call form from the lowered comprehension shape.
///
/// The predicate/transform sub-expressions are recovered from the loop step
/// the parser generated; the shapes here mirror `parse::lower_macro` exactly.
fn unparse_comprehension(comp: &Comprehension, out: &mut String) {
    comp.iter_range.unparse_into(out);
    out.push('.');
    out.push_str(comp.kind.function_name());
    out.push('(');
    out.push_str(&comp.iter_var);
    out.push_str(", ");
    match comp.kind {
        // step: accu && p  /  accu || p
        MacroKind::All | MacroKind::Exists => {
            if let Expr::Call { args, .. } = &comp.loop_step.expr {
                args[1].unparse_into(out);
            }
        }
        // step: p ? accu + 1 : accu
        MacroKind::ExistsOne => {
            if let Expr::Call { args, .. } = &comp.loop_step.expr {
                args[0].unparse_into(out);
            }
        }
        // step: accu + [t]
        MacroKind::Map => {
            if let Expr::Call { args, .. } = &comp.loop_step.expr
                && let Expr::List(elems) = &args[1].expr
            {
                elems[0].unparse_into(out);
            }
        }
        // step: p ? accu + [t] : accu
        MacroKind::MapFilter => {
            if let Expr::Call { args, .. } = &comp.loop_step.expr {
                args[0].unparse_into(out);
                out.push_str(", ");
                if let Expr::Call { args: add, .. } = &args[1].expr
                    && let Expr::List(elems) = &add[1].expr
                {
                    elems[0].unparse_into(out);
                }
            }
        }
        // step: p ? accu + [v] : accu
        MacroKind::Filter => {
            if let Expr::Call { args, .. } = &comp.loop_step.expr {
                args[0].unparse_into(out);
            }
        }
    }
    out.push(')');
}
