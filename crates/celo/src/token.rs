//! The CEL lexer.
//!
//! Produces a flat token vector the parser indexes into. Tokens carry
//! 1-based line/column positions for error reporting. Numeric literals keep
//! their unsigned magnitude so the parser can fold a leading `-` into the
//! literal (`-9223372036854775808` is a valid int literal even though its
//! magnitude alone is not).

use std::sync::Arc;

use crate::error::ParseError;

/// One lexical token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Ident(String),
    /// Integer literal magnitude (decimal or hex). Sign is applied by the
    /// parser; a bare literal must fit in i64.
    IntLit(u64),
    /// Unsigned literal (`u`/`U` suffix).
    UintLit(u64),
    DoubleLit(f64),
    StringLit(Arc<str>),
    BytesLit(Arc<[u8]>),
    True,
    False,
    Null,
    In,
    /// A reserved word that may not be used as an identifier.
    Reserved(&'static str),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    NotEq,
    EqEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub tok: Tok,
    pub line: u32,
    pub column: u32,
}

/// Words the grammar reserves; using one as an identifier is a syntax error.
const RESERVED: &[&str] = &[
    "as", "break", "const", "continue", "else", "for", "function", "if", "import", "let", "loop", "package",
    "namespace", "return", "var", "void", "while",
];

pub(crate) struct Lexer<'src> {
    source: &'src str,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenizes the whole source.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            if self.at_end() {
                break;
            }
            tokens.push(self.next_token()?);
        }
        Ok(tokens)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                // comments run to end of line
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        self.error_at(message, self.line, self.column)
    }

    fn error_at(&self, message: impl Into<String>, line: u32, column: u32) -> ParseError {
        let excerpt = self.source.lines().nth(line.saturating_sub(1) as usize).unwrap_or("");
        ParseError::new(message, line, column, excerpt)
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        let line = self.line;
        let column = self.column;
        let tok = self.scan()?;
        Ok(Token { tok, line, column })
    }

    fn scan(&mut self) -> Result<Tok, ParseError> {
        let c = self.peek().expect("scan called at end of input");

        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.scan_number();
        }
        if c == '"' || c == '\'' {
            return self.scan_string(false, false);
        }
        if c == 'r' || c == 'R' || c == 'b' || c == 'B' {
            if let Some(tok) = self.try_scan_prefixed_string()? {
                return Ok(tok);
            }
        }
        if c == '_' || c.is_alphabetic() {
            return Ok(self.scan_word());
        }

        self.bump();
        let simple = match c {
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            ',' => Tok::Comma,
            '.' => Tok::Dot,
            ':' => Tok::Colon,
            '?' => Tok::Question,
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '/' => Tok::Slash,
            '%' => Tok::Percent,
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Tok::NotEq
                } else {
                    Tok::Not
                }
            }
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Tok::EqEq
                } else {
                    return Err(self.error("unexpected character '='"));
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Tok::Le
                } else {
                    Tok::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Tok::Ge
                } else {
                    Tok::Gt
                }
            }
            '&' => {
                if self.peek() == Some('&') {
                    self.bump();
                    Tok::AndAnd
                } else {
                    return Err(self.error("unexpected character '&'"));
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.bump();
                    Tok::OrOr
                } else {
                    return Err(self.error("unexpected character '|'"));
                }
            }
            other => return Err(self.error(format!("unexpected character '{other}'"))),
        };
        Ok(simple)
    }

    fn scan_word(&mut self) -> Tok {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match word.as_str() {
            "true" => Tok::True,
            "false" => Tok::False,
            "null" => Tok::Null,
            "in" => Tok::In,
            _ => {
                if let Some(reserved) = RESERVED.iter().find(|r| **r == word) {
                    Tok::Reserved(*reserved)
                } else {
                    Tok::Ident(word)
                }
            }
        }
    }

    fn scan_number(&mut self) -> Result<Tok, ParseError> {
        let line = self.line;
        let column = self.column;

        // hex integer
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    digits.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            if digits.is_empty() {
                return Err(self.error_at("malformed hex literal", line, column));
            }
            let value = u64::from_str_radix(&digits, 16)
                .map_err(|_| self.error_at("hex literal out of range", line, column))?;
            if matches!(self.peek(), Some('u' | 'U')) {
                self.bump();
                return Ok(Tok::UintLit(value));
            }
            return Ok(Tok::IntLit(value));
        }

        let mut text = String::new();
        let mut is_double = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_double = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mut lookahead = 1;
            if matches!(self.peek_at(1), Some('+' | '-')) {
                lookahead = 2;
            }
            if self.peek_at(lookahead).is_some_and(|c| c.is_ascii_digit()) {
                is_double = true;
                text.push('e');
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    text.push(self.bump().expect("sign just peeked"));
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }

        if is_double {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error_at("malformed double literal", line, column))?;
            return Ok(Tok::DoubleLit(value));
        }
        if matches!(self.peek(), Some('u' | 'U')) {
            self.bump();
            let value: u64 = text
                .parse()
                .map_err(|_| self.error_at("uint literal out of range", line, column))?;
            return Ok(Tok::UintLit(value));
        }
        let value: u64 = text
            .parse()
            .map_err(|_| self.error_at("int literal out of range", line, column))?;
        Ok(Tok::IntLit(value))
    }

    /// Handles `r`/`b` string prefixes in either order and case. Returns
    /// None when the word is an ordinary identifier starting with r/b.
    fn try_scan_prefixed_string(&mut self) -> Result<Option<Tok>, ParseError> {
        let mut raw = false;
        let mut bytes = false;
        let mut offset = 0;
        loop {
            match self.peek_at(offset) {
                Some('r' | 'R') if !raw => {
                    raw = true;
                    offset += 1;
                }
                Some('b' | 'B') if !bytes => {
                    bytes = true;
                    offset += 1;
                }
                Some('"' | '\'') => break,
                _ => return Ok(None),
            }
        }
        for _ in 0..offset {
            self.bump();
        }
        self.scan_string(raw, bytes).map(Some)
    }

    fn scan_string(&mut self, raw: bool, bytes: bool) -> Result<Tok, ParseError> {
        let line = self.line;
        let column = self.column;
        let quote = self.bump().expect("string start just peeked");
        // triple-quoted variant
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut out: Vec<u8> = Vec::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error_at("unterminated string literal", line, column));
            };
            if c == quote {
                if triple {
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        self.bump();
                        self.bump();
                        self.bump();
                        break;
                    }
                    self.bump();
                    push_char(&mut out, c);
                    continue;
                }
                self.bump();
                break;
            }
            if c == '\n' && !triple {
                return Err(self.error_at("unterminated string literal", line, column));
            }
            if c == '\\' && !raw {
                self.bump();
                self.scan_escape(&mut out, bytes, line, column)?;
                continue;
            }
            self.bump();
            push_char(&mut out, c);
        }

        if bytes {
            Ok(Tok::BytesLit(Arc::from(out)))
        } else {
            let text = String::from_utf8(out)
                .map_err(|_| self.error_at("invalid UTF-8 in string literal", line, column))?;
            Ok(Tok::StringLit(Arc::from(text)))
        }
    }

    fn scan_escape(&mut self, out: &mut Vec<u8>, bytes: bool, line: u32, column: u32) -> Result<(), ParseError> {
        let Some(c) = self.bump() else {
            return Err(self.error_at("unterminated escape sequence", line, column));
        };
        match c {
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'v' => out.push(0x0b),
            '\\' => out.push(b'\\'),
            '\'' => out.push(b'\''),
            '"' => out.push(b'"'),
            '`' => out.push(b'`'),
            '?' => out.push(b'?'),
            'x' | 'X' => {
                let value = self.scan_hex_digits(2, line, column)?;
                if bytes {
                    out.push(value as u8);
                } else {
                    push_char(out, char::from_u32(value).ok_or_else(|| {
                        self.error_at("invalid hex escape", line, column)
                    })?);
                }
            }
            'u' => {
                if bytes {
                    return Err(self.error_at("\\u escapes are not allowed in bytes literals", line, column));
                }
                let value = self.scan_hex_digits(4, line, column)?;
                let c = char::from_u32(value)
                    .ok_or_else(|| self.error_at("invalid unicode escape (surrogate)", line, column))?;
                push_char(out, c);
            }
            'U' => {
                if bytes {
                    return Err(self.error_at("\\U escapes are not allowed in bytes literals", line, column));
                }
                let value = self.scan_hex_digits(8, line, column)?;
                let c = char::from_u32(value)
                    .ok_or_else(|| self.error_at("invalid unicode escape", line, column))?;
                push_char(out, c);
            }
            '0'..='7' => {
                // up to three octal digits, first already consumed
                let mut value = c as u32 - '0' as u32;
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ '0'..='7') => {
                            value = value * 8 + (d as u32 - '0' as u32);
                            self.bump();
                        }
                        _ => break,
                    }
                }
                if value > 0xff {
                    return Err(self.error_at("octal escape out of range", line, column));
                }
                if bytes {
                    out.push(value as u8);
                } else {
                    push_char(out, char::from_u32(value).expect("octal escapes are <= 0xff"));
                }
            }
            other => {
                return Err(self.error_at(format!("invalid escape sequence '\\{other}'"), line, column));
            }
        }
        Ok(())
    }

    fn scan_hex_digits(&mut self, count: usize, line: u32, column: u32) -> Result<u32, ParseError> {
        let mut value: u32 = 0;
        for _ in 0..count {
            let Some(c) = self.peek() else {
                return Err(self.error_at("truncated hex escape", line, column));
            };
            let digit = c
                .to_digit(16)
                .ok_or_else(|| self.error_at("truncated hex escape", line, column))?;
            value = value * 16 + digit;
            self.bump();
        }
        Ok(value)
    }
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Tok> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(lex("42"), vec![Tok::IntLit(42)]);
        assert_eq!(lex("42u"), vec![Tok::UintLit(42)]);
        assert_eq!(lex("0xFFu"), vec![Tok::UintLit(255)]);
        assert_eq!(lex("1.5e3"), vec![Tok::DoubleLit(1500.0)]);
        assert_eq!(lex(".5"), vec![Tok::DoubleLit(0.5)]);
    }

    #[test]
    fn int_magnitude_allows_min_i64() {
        // magnitude of i64::MIN; the parser folds the sign
        assert_eq!(lex("9223372036854775808"), vec![Tok::IntLit(9_223_372_036_854_775_808)]);
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(lex(r#""hi\n""#), vec![Tok::StringLit(Arc::from("hi\n"))]);
        assert_eq!(lex(r"r'a\nb'"), vec![Tok::StringLit(Arc::from("a\\nb"))]);
        assert_eq!(lex(r#"b'\x00\xff'"#), vec![Tok::BytesLit(Arc::from(vec![0u8, 255u8]))]);
        assert_eq!(lex(r#""é""#), vec![Tok::StringLit(Arc::from("\u{e9}"))]);
        assert_eq!(lex("'''a'b'''"), vec![Tok::StringLit(Arc::from("a'b"))]);
    }

    #[test]
    fn reserved_words_are_flagged() {
        assert_eq!(lex("package"), vec![Tok::Reserved("package")]);
        assert_eq!(lex("in"), vec![Tok::In]);
    }

    #[test]
    fn comments_are_trivia() {
        assert_eq!(lex("1 // comment\n+ 2"), vec![Tok::IntLit(1), Tok::Plus, Tok::IntLit(2)]);
    }

    #[test]
    fn unterminated_string_errors() {
        assert!(Lexer::new("'abc").tokenize().is_err());
    }
}
