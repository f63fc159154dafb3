//! The CEL parser: token stream to AST.
//!
//! Recursive descent with one token of lookahead (plus bounded backtracking
//! for qualified struct-literal names, which a token index makes cheap).
//! Macros are recognized by name and shape here and lowered to
//! [`Comprehension`] nodes; `has(e.f)` becomes a test-only `Select`. The
//! parser never consults the environment.

use std::sync::Arc;

use crate::{
    error::ParseError,
    expressions::{ACCUMULATOR_VAR, Comprehension, Expr, ExprLoc, Literal, MacroKind, Span, operators},
    token::{Lexer, Tok, Token},
};

/// Maximum guard depth for expressions during parsing.
///
/// This prevents stack overflow from deeply nested structures like
/// `((((x))))`. One level of source nesting costs two guard increments
/// (ternary entry plus unary entry); the grammar requires at least 32
/// nesting levels, so the guard sits far above 64.
#[cfg(not(debug_assertions))]
const MAX_NESTING_DEPTH: u16 = 240;
/// In debug builds the limit is lower because stack frames are much larger
/// (no inlining, debug info, etc.).
#[cfg(debug_assertions)]
const MAX_NESTING_DEPTH: u16 = 120;

/// Parses a complete CEL expression.
pub(crate) fn parse(source: &str) -> Result<ExprLoc, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expr()?;
    if !parser.at_end() {
        return Err(parser.error_here("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    depth: u16,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|t| &t.tok)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn span_here(&self) -> Span {
        match self.tokens.get(self.pos).or_else(|| self.tokens.last()) {
            Some(t) => Span::new(t.line, t.column),
            None => Span::new(1, 1),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let span = self.span_here();
        self.error_at(span, message)
    }

    fn error_at(&self, span: Span, message: impl Into<String>) -> ParseError {
        let excerpt = self
            .source
            .lines()
            .nth(span.line.saturating_sub(1) as usize)
            .unwrap_or("");
        ParseError::new(message, span.line, span.column, excerpt)
    }

    fn expect(&mut self, expected: &Tok, what: &str) -> Result<(), ParseError> {
        match self.peek() {
            Some(t) if t == expected => {
                self.bump();
                Ok(())
            }
            Some(t) => Err(self.error_here(format!("expected {what}, found {}", describe(t)))),
            None => Err(self.error_here(format!("expected {what}, found end of input"))),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error_here("expression nesting too deep"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// expr : conditionalOr ('?' expr ':' expr)?
    fn parse_expr(&mut self) -> Result<ExprLoc, ParseError> {
        self.enter()?;
        let result = self.parse_ternary();
        self.leave();
        result
    }

    fn parse_ternary(&mut self) -> Result<ExprLoc, ParseError> {
        let cond = self.parse_or()?;
        if self.peek() != Some(&Tok::Question) {
            return Ok(cond);
        }
        let span = cond.span;
        self.bump();
        let then = self.parse_expr()?;
        self.expect(&Tok::Colon, "':' in conditional")?;
        let otherwise = self.parse_expr()?;
        Ok(call_op(span, operators::CONDITIONAL, vec![cond, then, otherwise]))
    }

    fn parse_or(&mut self) -> Result<ExprLoc, ParseError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Tok::OrOr) {
            self.bump();
            let right = self.parse_and()?;
            let span = left.span;
            left = call_op(span, operators::LOGICAL_OR, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ExprLoc, ParseError> {
        let mut left = self.parse_relation()?;
        while self.peek() == Some(&Tok::AndAnd) {
            self.bump();
            let right = self.parse_relation()?;
            let span = left.span;
            left = call_op(span, operators::LOGICAL_AND, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_relation(&mut self) -> Result<ExprLoc, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Tok::EqEq) => operators::EQUALS,
                Some(Tok::NotEq) => operators::NOT_EQUALS,
                Some(Tok::Lt) => operators::LESS,
                Some(Tok::Le) => operators::LESS_EQUALS,
                Some(Tok::Gt) => operators::GREATER,
                Some(Tok::Ge) => operators::GREATER_EQUALS,
                Some(Tok::In) => operators::IN,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_additive()?;
            let span = left.span;
            left = call_op(span, op, vec![left, right]);
        }
    }

    fn parse_additive(&mut self) -> Result<ExprLoc, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => operators::ADD,
                Some(Tok::Minus) => operators::SUBTRACT,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_multiplicative()?;
            let span = left.span;
            left = call_op(span, op, vec![left, right]);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<ExprLoc, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => operators::MULTIPLY,
                Some(Tok::Slash) => operators::DIVIDE,
                Some(Tok::Percent) => operators::MODULO,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_unary()?;
            let span = left.span;
            left = call_op(span, op, vec![left, right]);
        }
    }

    /// unary : member | '!'+ member | '-'+ member
    fn parse_unary(&mut self) -> Result<ExprLoc, ParseError> {
        self.enter()?;
        let result = self.parse_unary_inner();
        self.leave();
        result
    }

    fn parse_unary_inner(&mut self) -> Result<ExprLoc, ParseError> {
        let span = self.span_here();
        match self.peek() {
            Some(Tok::Not) => {
                let mut count = 0usize;
                while self.peek() == Some(&Tok::Not) {
                    self.bump();
                    count += 1;
                }
                let mut expr = self.parse_member()?;
                for _ in 0..count {
                    expr = call_op(span, operators::LOGICAL_NOT, vec![expr]);
                }
                Ok(expr)
            }
            Some(Tok::Minus) => {
                let mut count = 0usize;
                while self.peek() == Some(&Tok::Minus) {
                    self.bump();
                    count += 1;
                }
                // one adjacent '-' folds into a numeric literal so that
                // -9223372036854775808 parses exactly
                let mut expr = match self.peek() {
                    Some(Tok::IntLit(magnitude)) => {
                        let magnitude = *magnitude;
                        let lit_span = self.span_here();
                        self.bump();
                        count -= 1;
                        let value = negate_magnitude(magnitude)
                            .ok_or_else(|| self.error_at(lit_span, "int literal out of range"))?;
                        let primary = ExprLoc::new(lit_span, Expr::Literal(Literal::Int(value)));
                        self.parse_member_postfix(primary)?
                    }
                    Some(Tok::DoubleLit(d)) => {
                        let d = *d;
                        let lit_span = self.span_here();
                        self.bump();
                        count -= 1;
                        let primary = ExprLoc::new(lit_span, Expr::Literal(Literal::Double(-d)));
                        self.parse_member_postfix(primary)?
                    }
                    _ => self.parse_member()?,
                };
                for _ in 0..count {
                    expr = call_op(span, operators::NEGATE, vec![expr]);
                }
                Ok(expr)
            }
            _ => self.parse_member(),
        }
    }

    fn parse_member(&mut self) -> Result<ExprLoc, ParseError> {
        let primary = self.parse_primary()?;
        self.parse_member_postfix(primary)
    }

    /// Postfix chain: selection, method calls/macros, indexing.
    fn parse_member_postfix(&mut self, mut expr: ExprLoc) -> Result<ExprLoc, ParseError> {
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    let span = self.span_here();
                    self.bump();
                    let field = self.expect_ident("field name after '.'")?;
                    if self.peek() == Some(&Tok::LParen) {
                        expr = self.parse_receiver_call(span, expr, field)?;
                    } else {
                        expr = ExprLoc::new(
                            span,
                            Expr::Select {
                                operand: Box::new(expr),
                                field: Arc::from(field),
                                test_only: false,
                            },
                        );
                    }
                }
                Some(Tok::LBracket) => {
                    let span = self.span_here();
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(&Tok::RBracket, "']'")?;
                    expr = call_op(span, operators::INDEX, vec![expr, index]);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_receiver_call(&mut self, span: Span, target: ExprLoc, function: String) -> Result<ExprLoc, ParseError> {
        self.expect(&Tok::LParen, "'('")?;
        let args = self.parse_expr_list(&Tok::RParen)?;
        self.expect(&Tok::RParen, "')'")?;
        if let Some(kind) = macro_kind(&function, args.len()) {
            return self.lower_macro(span, kind, target, args);
        }
        Ok(ExprLoc::new(
            span,
            Expr::Call {
                function: Arc::from(function),
                target: Some(Box::new(target)),
                args,
            },
        ))
    }

    fn parse_primary(&mut self) -> Result<ExprLoc, ParseError> {
        let span = self.span_here();
        let Some(tok) = self.peek() else {
            return Err(self.error_here("unexpected end of input"));
        };
        match tok {
            Tok::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(&Tok::RParen, "')'")?;
                Ok(inner)
            }
            Tok::LBracket => {
                self.bump();
                let elems = self.parse_expr_list(&Tok::RBracket)?;
                self.expect(&Tok::RBracket, "']'")?;
                Ok(ExprLoc::new(span, Expr::List(elems)))
            }
            Tok::LBrace => {
                self.bump();
                let entries = self.parse_map_entries()?;
                self.expect(&Tok::RBrace, "'}'")?;
                Ok(ExprLoc::new(span, Expr::Map(entries)))
            }
            Tok::Dot => {
                self.bump();
                let name = self.expect_ident("identifier after '.'")?;
                self.parse_name_or_struct(span, name, true)
            }
            Tok::Ident(_) => {
                let Some(Token {
                    tok: Tok::Ident(name), ..
                }) = self.bump()
                else {
                    unreachable!("ident just peeked");
                };
                // global function call f(...); `has` is a macro
                if self.peek() == Some(&Tok::LParen) {
                    return self.parse_global_call(span, name);
                }
                self.parse_name_or_struct(span, name, false)
            }
            Tok::IntLit(magnitude) => {
                let magnitude = *magnitude;
                self.bump();
                let value =
                    i64::try_from(magnitude).map_err(|_| self.error_at(span, "int literal out of range"))?;
                Ok(ExprLoc::new(span, Expr::Literal(Literal::Int(value))))
            }
            Tok::UintLit(u) => {
                let u = *u;
                self.bump();
                Ok(ExprLoc::new(span, Expr::Literal(Literal::Uint(u))))
            }
            Tok::DoubleLit(d) => {
                let d = *d;
                self.bump();
                Ok(ExprLoc::new(span, Expr::Literal(Literal::Double(d))))
            }
            Tok::StringLit(s) => {
                let s = s.clone();
                self.bump();
                Ok(ExprLoc::new(span, Expr::Literal(Literal::String(s))))
            }
            Tok::BytesLit(b) => {
                let b = b.clone();
                self.bump();
                Ok(ExprLoc::new(span, Expr::Literal(Literal::Bytes(b))))
            }
            Tok::True => {
                self.bump();
                Ok(ExprLoc::new(span, Expr::Literal(Literal::Bool(true))))
            }
            Tok::False => {
                self.bump();
                Ok(ExprLoc::new(span, Expr::Literal(Literal::Bool(false))))
            }
            Tok::Null => {
                self.bump();
                Ok(ExprLoc::new(span, Expr::Literal(Literal::Null)))
            }
            Tok::Reserved(word) => Err(self.error_here(format!("reserved word '{word}' may not be used here"))),
            other => Err(self.error_here(format!("unexpected {}", describe(other)))),
        }
    }

    /// After an identifier: a qualified struct literal (`a.b.C{...}`), or a
    /// plain (possibly later-selected) name. The dotted-name lookahead
    /// backtracks when no '{' follows.
    fn parse_name_or_struct(&mut self, span: Span, first: String, absolute: bool) -> Result<ExprLoc, ParseError> {
        let saved = self.pos;
        let mut qualified = first.clone();
        while self.peek() == Some(&Tok::Dot)
            && let Some(Tok::Ident(_)) = self.peek_at(1)
        {
            self.bump();
            let Some(Token {
                tok: Tok::Ident(part), ..
            }) = self.bump()
            else {
                unreachable!("ident just peeked");
            };
            qualified.push('.');
            qualified.push_str(&part);
        }
        if self.peek() == Some(&Tok::LBrace) {
            self.bump();
            let fields = self.parse_struct_fields()?;
            self.expect(&Tok::RBrace, "'}'")?;
            return Ok(ExprLoc::new(
                span,
                Expr::Struct {
                    type_name: Arc::from(qualified),
                    absolute,
                    fields,
                },
            ));
        }
        // not a struct literal: rewind and emit the bare identifier
        self.pos = saved;
        Ok(ExprLoc::new(
            span,
            Expr::Ident {
                name: Arc::from(first),
                absolute,
            },
        ))
    }

    fn parse_global_call(&mut self, span: Span, function: String) -> Result<ExprLoc, ParseError> {
        self.expect(&Tok::LParen, "'('")?;
        let args = self.parse_expr_list(&Tok::RParen)?;
        self.expect(&Tok::RParen, "')'")?;
        if function == "has" {
            return self.lower_has(span, args);
        }
        Ok(ExprLoc::new(
            span,
            Expr::Call {
                function: Arc::from(function),
                target: None,
                args,
            },
        ))
    }

    fn lower_has(&self, span: Span, mut args: Vec<ExprLoc>) -> Result<ExprLoc, ParseError> {
        if args.len() != 1 {
            return Err(self.error_at(span, "has() requires exactly one argument"));
        }
        let arg = args.remove(0);
        match arg.expr {
            Expr::Select {
                operand,
                field,
                test_only: false,
            } => Ok(ExprLoc::new(
                span,
                Expr::Select {
                    operand,
                    field,
                    test_only: true,
                },
            )),
            _ => Err(self.error_at(span, "has() argument must be a field selection")),
        }
    }

    /// Lowers a recognized macro call to its comprehension form.
    ///
    /// The generated shapes are relied upon by the canonical printer; change
    /// them together.
    fn lower_macro(
        &self,
        span: Span,
        kind: MacroKind,
        range: ExprLoc,
        mut args: Vec<ExprLoc>,
    ) -> Result<ExprLoc, ParseError> {
        let Expr::Ident { name: iter_var, .. } = &args[0].expr else {
            return Err(self.error_at(
                span,
                format!("{}() iteration variable must be a simple identifier", kind.function_name()),
            ));
        };
        let iter_var = iter_var.clone();
        let accu: Arc<str> = Arc::from(ACCUMULATOR_VAR);
        let accu_ident = || ExprLoc::new(span, Expr::Ident {
            name: accu.clone(),
            absolute: false,
        });
        let iter_ident = || ExprLoc::new(span, Expr::Ident {
            name: iter_var.clone(),
            absolute: false,
        });
        let lit = |l: Literal| ExprLoc::new(span, Expr::Literal(l));
        let single_list = |e: ExprLoc| ExprLoc::new(span, Expr::List(vec![e]));

        let comp = match kind {
            MacroKind::All => {
                let predicate = args.remove(1);
                Comprehension {
                    kind,
                    iter_var: iter_var.clone(),
                    iter_range: range,
                    accu_var: accu.clone(),
                    accu_init: lit(Literal::Bool(true)),
                    loop_cond: call_op(span, operators::NOT_STRICTLY_FALSE, vec![accu_ident()]),
                    loop_step: call_op(span, operators::LOGICAL_AND, vec![accu_ident(), predicate]),
                    result: accu_ident(),
                }
            }
            MacroKind::Exists => {
                let predicate = args.remove(1);
                Comprehension {
                    kind,
                    iter_var: iter_var.clone(),
                    iter_range: range,
                    accu_var: accu.clone(),
                    accu_init: lit(Literal::Bool(false)),
                    loop_cond: call_op(
                        span,
                        operators::NOT_STRICTLY_FALSE,
                        vec![call_op(span, operators::LOGICAL_NOT, vec![accu_ident()])],
                    ),
                    loop_step: call_op(span, operators::LOGICAL_OR, vec![accu_ident(), predicate]),
                    result: accu_ident(),
                }
            }
            MacroKind::ExistsOne => {
                let predicate = args.remove(1);
                let bump = call_op(span, operators::ADD, vec![accu_ident(), lit(Literal::Int(1))]);
                Comprehension {
                    kind,
                    iter_var: iter_var.clone(),
                    iter_range: range,
                    accu_var: accu.clone(),
                    accu_init: lit(Literal::Int(0)),
                    loop_cond: lit(Literal::Bool(true)),
                    loop_step: call_op(span, operators::CONDITIONAL, vec![predicate, bump, accu_ident()]),
                    result: call_op(span, operators::EQUALS, vec![accu_ident(), lit(Literal::Int(1))]),
                }
            }
            MacroKind::Map => {
                let transform = args.remove(1);
                Comprehension {
                    kind,
                    iter_var: iter_var.clone(),
                    iter_range: range,
                    accu_var: accu.clone(),
                    accu_init: ExprLoc::new(span, Expr::List(vec![])),
                    loop_cond: lit(Literal::Bool(true)),
                    loop_step: call_op(span, operators::ADD, vec![accu_ident(), single_list(transform)]),
                    result: accu_ident(),
                }
            }
            MacroKind::MapFilter => {
                let transform = args.remove(2);
                let predicate = args.remove(1);
                let extend = call_op(span, operators::ADD, vec![accu_ident(), single_list(transform)]);
                Comprehension {
                    kind,
                    iter_var: iter_var.clone(),
                    iter_range: range,
                    accu_var: accu.clone(),
                    accu_init: ExprLoc::new(span, Expr::List(vec![])),
                    loop_cond: lit(Literal::Bool(true)),
                    loop_step: call_op(span, operators::CONDITIONAL, vec![predicate, extend, accu_ident()]),
                    result: accu_ident(),
                }
            }
            MacroKind::Filter => {
                let predicate = args.remove(1);
                let extend = call_op(span, operators::ADD, vec![accu_ident(), single_list(iter_ident())]);
                Comprehension {
                    kind,
                    iter_var: iter_var.clone(),
                    iter_range: range,
                    accu_var: accu.clone(),
                    accu_init: ExprLoc::new(span, Expr::List(vec![])),
                    loop_cond: lit(Literal::Bool(true)),
                    loop_step: call_op(span, operators::CONDITIONAL, vec![predicate, extend, accu_ident()]),
                    result: accu_ident(),
                }
            }
        };
        Ok(ExprLoc::new(span, Expr::Comprehension(Box::new(comp))))
    }

    fn parse_expr_list(&mut self, terminator: &Tok) -> Result<Vec<ExprLoc>, ParseError> {
        let mut items = Vec::new();
        while self.peek() != Some(terminator) {
            items.push(self.parse_expr()?);
            if self.peek() == Some(&Tok::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        Ok(items)
    }

    fn parse_map_entries(&mut self) -> Result<Vec<(ExprLoc, ExprLoc)>, ParseError> {
        let mut entries = Vec::new();
        while self.peek() != Some(&Tok::RBrace) {
            let key = self.parse_expr()?;
            self.expect(&Tok::Colon, "':' in map entry")?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            if self.peek() == Some(&Tok::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        Ok(entries)
    }

    fn parse_struct_fields(&mut self) -> Result<Vec<(Arc<str>, ExprLoc)>, ParseError> {
        let mut fields = Vec::new();
        while self.peek() != Some(&Tok::RBrace) {
            let name = self.expect_ident("field name in struct literal")?;
            self.expect(&Tok::Colon, "':' in struct literal")?;
            let value = self.parse_expr()?;
            fields.push((Arc::from(name), value));
            if self.peek() == Some(&Tok::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        Ok(fields)
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Tok::Ident(_)) => {
                let Some(Token { tok: Tok::Ident(name), .. }) = self.bump() else {
                    unreachable!("ident just peeked");
                };
                Ok(name)
            }
            Some(Tok::Reserved(word)) => {
                Err(self.error_here(format!("reserved word '{word}' may not be used as an identifier")))
            }
            Some(t) => Err(self.error_here(format!("expected {what}, found {}", describe(t)))),
            None => Err(self.error_here(format!("expected {what}, found end of input"))),
        }
    }
}

fn call_op(span: Span, function: &str, args: Vec<ExprLoc>) -> ExprLoc {
    ExprLoc::new(
        span,
        Expr::Call {
            function: Arc::from(function),
            target: None,
            args,
        },
    )
}

fn negate_magnitude(magnitude: u64) -> Option<i64> {
    if magnitude <= i64::MAX as u64 {
        Some(-(magnitude as i64))
    } else if magnitude == (i64::MAX as u64) + 1 {
        Some(i64::MIN)
    } else {
        None
    }
}

fn macro_kind(function: &str, arg_count: usize) -> Option<MacroKind> {
    match (function, arg_count) {
        ("all", 2) => Some(MacroKind::All),
        ("exists", 2) => Some(MacroKind::Exists),
        ("exists_one", 2) => Some(MacroKind::ExistsOne),
        ("map", 2) => Some(MacroKind::Map),
        ("map", 3) => Some(MacroKind::MapFilter),
        ("filter", 2) => Some(MacroKind::Filter),
        _ => None,
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Ident(name) => format!("identifier '{name}'"),
        Tok::IntLit(_) | Tok::UintLit(_) | Tok::DoubleLit(_) => "number literal".to_owned(),
        Tok::StringLit(_) => "string literal".to_owned(),
        Tok::BytesLit(_) => "bytes literal".to_owned(),
        Tok::Reserved(word) => format!("reserved word '{word}'"),
        other => format!("token '{other:?}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> ExprLoc {
        parse(source).unwrap()
    }

    #[test]
    fn min_i64_literal_folds() {
        let ast = parse_ok("-9223372036854775808");
        let Expr::Literal(Literal::Int(v)) = ast.expr else {
            panic!("expected folded literal, got {ast:?}");
        };
        assert_eq!(v, i64::MIN);
    }

    #[test]
    fn min_i64_magnitude_without_sign_is_rejected() {
        assert!(parse("9223372036854775808").is_err());
    }

    #[test]
    fn double_negation_keeps_one_negate_call() {
        let ast = parse_ok("-(-9223372036854775808)");
        let Expr::Call { function, .. } = &ast.expr else {
            panic!("expected negate call");
        };
        assert_eq!(function.as_ref(), operators::NEGATE);
    }

    #[test]
    fn macro_lowering_produces_comprehension() {
        let ast = parse_ok("[1, 2].all(x, x > 0)");
        let Expr::Comprehension(comp) = ast.expr else {
            panic!("expected comprehension");
        };
        assert_eq!(comp.kind, MacroKind::All);
        assert_eq!(comp.iter_var.as_ref(), "x");
        assert_eq!(comp.accu_var.as_ref(), ACCUMULATOR_VAR);
    }

    #[test]
    fn has_lowers_to_test_only_select() {
        let ast = parse_ok("has(a.b)");
        let Expr::Select { test_only, field, .. } = ast.expr else {
            panic!("expected select");
        };
        assert!(test_only);
        assert_eq!(field.as_ref(), "b");
    }

    #[test]
    fn has_rejects_non_selection() {
        assert!(parse("has(a)").is_err());
        assert!(parse("has(a[0])").is_err());
    }

    #[test]
    fn struct_literal_with_qualified_name() {
        let ast = parse_ok("a.b.Msg{x: 1}");
        let Expr::Struct { type_name, fields, .. } = ast.expr else {
            panic!("expected struct literal");
        };
        assert_eq!(type_name.as_ref(), "a.b.Msg");
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn dotted_name_without_brace_is_selects() {
        let ast = parse_ok("a.b.c");
        let Expr::Select { operand, field, .. } = &ast.expr else {
            panic!("expected select chain");
        };
        assert_eq!(field.as_ref(), "c");
        let Expr::Select { field: inner, .. } = &operand.expr else {
            panic!("expected inner select");
        };
        assert_eq!(inner.as_ref(), "b");
    }

    #[test]
    fn reserved_word_as_identifier_is_rejected() {
        assert!(parse("while").is_err());
        assert!(parse("1 + namespace").is_err());
    }

    #[test]
    fn deep_nesting_within_limit_parses() {
        let source = format!("{}1{}", "(".repeat(32), ")".repeat(32));
        assert!(parse(&source).is_ok());
        let bools = vec!["true"; 40].join(" && ");
        assert!(parse(&bools).is_ok());
    }

    #[test]
    fn excessive_nesting_is_rejected_not_a_crash() {
        let source = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert!(parse(&source).is_err());
    }

    #[test]
    fn trailing_input_is_an_error() {
        assert!(parse("1 2").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn unparse_round_trips_equivalently() {
        for source in [
            "1 + 2 * 3",
            "a && b || !c",
            "[1, 'x', true].exists(e, e == 2)",
            "{'k': 1, 2u: b'ab'}.size()",
            "x ? y.f : z[0]",
            "has(a.b) && a.b.c.startsWith('q')",
            "timestamp('2009-02-13T23:31:30Z') - duration('10s')",
        ] {
            let first = parse_ok(source);
            let printed = first.unparse();
            let second = parse(&printed).unwrap_or_else(|e| panic!("reparse of {printed:?} failed: {e}"));
            assert_eq!(printed, second.unparse(), "unparse not stable for {source:?}");
        }
    }
}
