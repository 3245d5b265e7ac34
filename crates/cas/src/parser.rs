//! Recursive-descent parser for math input.
//!
//! Grammar (lowest to highest binding):
//!
//! ```text
//! equation = expr ('=' expr)?
//! expr     = term (('+' | '-') term)*
//! term     = unary (('*' | '/' | '%') unary | implicit power)*
//! unary    = ('-' | '+') unary | power
//! power    = primary ('^' unary)?
//! primary  = NUMBER | IDENT | IDENT '(' args ')' | '(' expr ')'
//! ```
//!
//! Implicit multiplication covers `2x`, `3(x+1)`, `(x+1)(x-1)` and
//! `x(x+1)`. Two bare words in a row are rejected, so ordinary English
//! never parses.
//!
//! Input is bounded: at most [`MAX_TOKENS`] tokens and [`MAX_NESTING`]
//! levels of parentheses, calls, signs and exponents, so every later
//! tree walk stays shallow.

use mathtutor_core::EvaluationError;
use num_bigint::BigInt;
use num_rational::BigRational;

use crate::expr::{Constant, Expr};

/// Longest accepted input, in tokens.
pub const MAX_TOKENS: usize = 512;

/// Deepest accepted nesting of `(`, calls, unary signs and `^`.
pub const MAX_NESTING: usize = 64;

/// Longest accepted numeric literal, in characters.
const MAX_NUMBER_LEN: usize = 1000;

/// Function names recognized before an opening parenthesis.
pub const FUNCTIONS: &[&str] = &[
    // numeric
    "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "sqrt", "abs", "exp",
    "ln", "log", "log10", "log2", "floor", "ceil", "round",
    // engine commands
    "integral", "d", "roots", "solve", "simplify",
];

/// Parse a full input string.
pub fn parse(input: &str) -> Result<Expr, EvaluationError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(EvaluationError::Parse("Empty expression".into()));
    }

    let mut parser = Parser::new(&tokens);
    let expr = parser.parse_equation()?;
    if let Some(tok) = parser.peek() {
        return Err(EvaluationError::Parse(format!(
            "Unexpected token at position {}: {:?}",
            parser.pos, tok
        )));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Equals,
    Comma,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvaluationError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if tokens.len() >= MAX_TOKENS {
            return Err(EvaluationError::Parse("expression too long".into()));
        }
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => { tokens.push(Token::Plus); i += 1; }
            '-' | '\u{2212}' => { tokens.push(Token::Minus); i += 1; }
            '*' if chars.get(i + 1) == Some(&'*') => { tokens.push(Token::Caret); i += 2; }
            '*' | '\u{00d7}' | '\u{00b7}' => { tokens.push(Token::Star); i += 1; }
            '/' | '\u{00f7}' => { tokens.push(Token::Slash); i += 1; }
            '^' => { tokens.push(Token::Caret); i += 1; }
            '%' => { tokens.push(Token::Percent); i += 1; }
            '=' => {
                tokens.push(Token::Equals);
                i += 1;
                if chars.get(i) == Some(&'=') {
                    i += 1;
                }
            }
            ',' => { tokens.push(Token::Comma); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i - start > MAX_NUMBER_LEN {
                    return Err(EvaluationError::Parse("number too long".into()));
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c => {
                return Err(EvaluationError::Parse(format!("Unexpected character: '{c}'")));
            }
        }
    }

    Ok(tokens)
}

/// Exact value of a decimal literal such as `3.25`.
fn parse_decimal(text: &str) -> Result<BigRational, EvaluationError> {
    let invalid = || EvaluationError::Parse(format!("Invalid number: {text}"));
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text, ""));
    if frac_part.contains('.') || (int_part.is_empty() && frac_part.is_empty()) {
        return Err(invalid());
    }

    let numer: BigInt = format!("{int_part}{frac_part}").parse().map_err(|_| invalid())?;
    let denom = num_traits::pow(BigInt::from(10), frac_part.len());
    Ok(BigRational::new(numer, denom))
}

/// Single letter, optionally followed by digits or an underscore subscript.
fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() => chars.all(|c| c.is_ascii_digit() || c == '_'),
        _ => false,
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, EvaluationError>,
    ) -> Result<T, EvaluationError> {
        if self.depth >= MAX_NESTING {
            return Err(EvaluationError::Parse("expression nested too deeply".into()));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn consume(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), EvaluationError> {
        match self.consume() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(EvaluationError::Parse(format!(
                "Expected {expected:?}, found {tok:?}"
            ))),
            None => Err(EvaluationError::Parse(format!(
                "Expected {expected:?}, found end of expression"
            ))),
        }
    }

    /// Whether the previous token allows `2x` / `(a)b` style products.
    fn previous_allows_implicit(&self) -> bool {
        self.pos
            .checked_sub(1)
            .and_then(|p| self.tokens.get(p))
            .is_some_and(|t| matches!(t, Token::Number(_) | Token::RParen))
    }

    // equation = expr ('=' expr)?
    fn parse_equation(&mut self) -> Result<Expr, EvaluationError> {
        let left = self.parse_expr()?;
        if let Some(Token::Equals) = self.peek() {
            self.consume();
            let right = self.parse_expr()?;
            return Ok(Expr::Eq(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr, EvaluationError> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.consume();
                    left = left + self.parse_term()?;
                }
                Token::Minus => {
                    self.consume();
                    left = left - self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // term = unary (('*' | '/' | '%') unary | implicit power)*
    fn parse_term(&mut self) -> Result<Expr, EvaluationError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.consume();
                    left = left * self.parse_unary()?;
                }
                Token::Slash => {
                    self.consume();
                    left = left / self.parse_unary()?;
                }
                Token::Percent => {
                    self.consume();
                    let right = self.parse_unary()?;
                    left = Expr::Mod(Box::new(left), Box::new(right));
                }
                Token::LParen => {
                    left = left * self.parse_power()?;
                }
                Token::Ident(_) if self.previous_allows_implicit() => {
                    left = left * self.parse_power()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // unary = ('-' | '+') unary | power
    fn parse_unary(&mut self) -> Result<Expr, EvaluationError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                Ok(-self.nested(Self::parse_unary)?)
            }
            Some(Token::Plus) => {
                self.consume();
                self.nested(Self::parse_unary)
            }
            _ => self.parse_power(),
        }
    }

    // power = primary ('^' unary)?
    fn parse_power(&mut self) -> Result<Expr, EvaluationError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(base.pow(exponent));
        }
        Ok(base)
    }

    // primary = NUMBER | IDENT | IDENT '(' args ')' | '(' expr ')'
    fn parse_primary(&mut self) -> Result<Expr, EvaluationError> {
        let next_is_paren = matches!(self.peek_at(1), Some(Token::LParen));
        match self.consume().cloned() {
            Some(Token::Number(text)) => Ok(Expr::Num(parse_decimal(&text)?)),
            Some(Token::Ident(name)) => {
                if next_is_paren && FUNCTIONS.contains(&name.as_str()) {
                    self.consume();
                    let args = self.nested(Self::parse_args)?;
                    return Ok(Expr::Call(name, args));
                }
                match name.as_str() {
                    "pi" | "\u{03c0}" => Ok(Expr::Const(Constant::Pi)),
                    "e" => Ok(Expr::Const(Constant::E)),
                    n if is_variable_name(n) => Ok(Expr::Var(name)),
                    n if FUNCTIONS.contains(&n) => Err(EvaluationError::Parse(format!(
                        "Function '{n}' needs parentheses"
                    ))),
                    _ if next_is_paren => Err(EvaluationError::UnknownFunction(name)),
                    _ => Err(EvaluationError::UndefinedSymbol(name)),
                }
            }
            Some(Token::LParen) => {
                let inner = self.nested(Self::parse_expr)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(tok) => Err(EvaluationError::Parse(format!("Unexpected token: {tok:?}"))),
            None => Err(EvaluationError::Parse("Unexpected end of expression".into())),
        }
    }

    // args = (equation (',' equation)*)? ')'
    fn parse_args(&mut self) -> Result<Vec<Expr>, EvaluationError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.consume();
            return Ok(args);
        }
        loop {
            args.push(self.parse_equation()?);
            match self.consume() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(tok) => {
                    return Err(EvaluationError::Parse(format!(
                        "Expected ',' or ')' in argument list, found {tok:?}"
                    )));
                }
                None => return Err(EvaluationError::Parse("Unclosed argument list".into())),
            }
        }
        Ok(args)
    }
}
