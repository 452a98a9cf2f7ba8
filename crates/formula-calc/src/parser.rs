//! Formula text to [`Operation`] tree.

use crate::ast::{BinaryOp, CompareOp, Operation, MAX_DEPTH};
use crate::error::{CalcError, CalcResult};
use crate::locale::NumberLocale;
use crate::numeric::Numeric;
use crate::registry::{ConstantRegistry, FunctionRegistry};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected token at byte {0}")]
    UnexpectedToken(usize),
    #[error("the formula is empty")]
    EmptyFormula,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Infix {
    Binary(BinaryOp),
    Compare(CompareOp),
}

// Binding powers, loosest first. `^` binds tighter than unary minus, so `-2^2` is `-(2^2)`.
const COMPARE_BP: (u8, u8) = (1, 2);
const ADDITIVE_BP: (u8, u8) = (3, 4);
const MULTIPLICATIVE_BP: (u8, u8) = (5, 6);
const PREFIX_BP: u8 = 7;
const POWER_BP: (u8, u8) = (9, 9); // right associative

/// Pratt parser for formula text.
///
/// Function calls are validated against `functions` while parsing. Identifiers naming a
/// non-overwritable constant are replaced by the constant's value; every other identifier becomes
/// a [`Operation::Variable`].
pub struct Parser<'a, T> {
    locale: &'a NumberLocale,
    functions: &'a FunctionRegistry<T>,
    constants: &'a ConstantRegistry<T>,
}

impl<'a, T: Numeric> Parser<'a, T> {
    pub fn new(
        locale: &'a NumberLocale,
        functions: &'a FunctionRegistry<T>,
        constants: &'a ConstantRegistry<T>,
    ) -> Self {
        Self {
            locale,
            functions,
            constants,
        }
    }

    /// Parses `formula` into a tree no deeper than [`MAX_DEPTH`].
    pub fn parse(&self, formula: &str) -> CalcResult<Operation<T>> {
        if formula.trim().is_empty() {
            return Err(ParseError::EmptyFormula.into());
        }
        let mut state = ParseState {
            parser: self,
            input: formula,
            pos: 0,
            nesting: 0,
        };
        let (expr, _) = state.parse_bp(0)?;
        state.skip_ws();
        if state.pos != formula.len() {
            return Err(ParseError::UnexpectedToken(state.pos).into());
        }
        Ok(expr)
    }
}

/// A sub-tree together with its depth.
type Parsed<T> = (Operation<T>, usize);

fn too_deep() -> CalcError {
    CalcError::TooDeep { limit: MAX_DEPTH }
}

struct ParseState<'p, 's, T> {
    parser: &'p Parser<'p, T>,
    input: &'s str,
    pos: usize,
    /// Active `parse_bp` frames.
    nesting: usize,
}

impl<'s, T: Numeric> ParseState<'_, 's, T> {
    fn parse_bp(&mut self, min_bp: u8) -> CalcResult<Parsed<T>> {
        self.nesting += 1;
        if self.nesting > MAX_DEPTH {
            return Err(too_deep());
        }
        let parsed = self.parse_infix(min_bp);
        self.nesting -= 1;
        parsed
    }

    fn parse_infix(&mut self, min_bp: u8) -> CalcResult<Parsed<T>> {
        self.skip_ws();
        let (mut lhs, mut depth) = self.parse_prefix()?;
        loop {
            self.skip_ws();
            let Some((op, len, (l_bp, r_bp))) = self.peek_infix_op() else {
                break;
            };
            if l_bp < min_bp {
                break;
            }
            self.pos += len;
            let (rhs, rhs_depth) = self.parse_bp(r_bp)?;
            // Left-associative chains grow the tree without growing the parser's stack.
            depth = depth.max(rhs_depth) + 1;
            if depth > MAX_DEPTH {
                return Err(too_deep());
            }
            lhs = match op {
                Infix::Binary(op) => Operation::binary(op, lhs, rhs),
                Infix::Compare(op) => Operation::compare(op, lhs, rhs),
            };
        }
        Ok((lhs, depth))
    }

    fn parse_prefix(&mut self) -> CalcResult<Parsed<T>> {
        self.skip_ws();
        match self.peek_char() {
            Some('-') => {
                self.pos += 1;
                if let Some(literal) = self.negative_literal()? {
                    return Ok((literal, 1));
                }
                let (operand, depth) = self.parse_bp(PREFIX_BP)?;
                if depth + 1 > MAX_DEPTH {
                    return Err(too_deep());
                }
                Ok((Operation::negate(operand), depth + 1))
            }
            Some('+') => {
                self.pos += 1;
                self.parse_bp(PREFIX_BP)
            }
            Some('(') => {
                self.pos += 1;
                let expr = self.parse_bp(0)?;
                self.skip_ws();
                self.expect(')')?;
                Ok(expr)
            }
            Some(_) if self.at_number() => Ok((self.parse_number(false)?, 1)),
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => self.parse_ident_like(),
            Some(_) => Err(ParseError::UnexpectedToken(self.pos).into()),
            None => Err(ParseError::UnexpectedEof.into()),
        }
    }

    /// After a prefix `-`: folds the sign into a directly following literal, so the most
    /// negative value of a type parses even though its magnitude does not fit. `-2^2` keeps
    /// the negation outside the power.
    fn negative_literal(&mut self) -> CalcResult<Option<Operation<T>>> {
        let start = self.pos;
        self.skip_ws();
        if !self.at_number() {
            self.pos = start;
            return Ok(None);
        }
        let literal = self.parse_number(true)?;
        self.skip_ws();
        // Integer `-0` keeps its negation so `f64` still sees negative zero.
        if self.peek_char() == Some('^') || matches!(literal, Operation::IntegerConstant(0)) {
            self.pos = start;
            return Ok(None);
        }
        Ok(Some(literal))
    }

    fn at_number(&self) -> bool {
        let locale = self.parser.locale;
        match self.peek_char() {
            Some(ch) if ch.is_ascii_digit() => true,
            Some(ch) if ch == locale.decimal_separator || ch == '.' => self
                .peek_char_at(ch.len_utf8())
                .is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    fn scan_number(&mut self) -> &'s str {
        let input: &'s str = self.input;
        let locale = self.parser.locale;
        let start = self.pos;
        let mut end = self.pos;
        for (offset, ch) in input[start..].char_indices() {
            if !locale.is_number_char(ch) {
                break;
            }
            end = start + offset + ch.len_utf8();
        }
        // Exponent: `e`/`E`, optional sign, at least one digit.
        let bytes = input.as_bytes();
        if matches!(bytes.get(end), Some(b'e' | b'E')) {
            let mut exp_end = end + 1;
            if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
                exp_end += 1;
            }
            if bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
                while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
                    exp_end += 1;
                }
                end = exp_end;
            }
        }
        self.pos = end;
        &input[start..end]
    }

    fn parse_number(&mut self, negative: bool) -> CalcResult<Operation<T>> {
        let text = self.scan_number();
        let invalid = || CalcError::InvalidNumber {
            text: text.to_string(),
        };
        let mut canonical = self.parser.locale.normalize(text).ok_or_else(invalid)?;
        if canonical.bytes().all(|b| b.is_ascii_digit()) {
            if negative {
                canonical.insert(0, '-');
            }
            if let Ok(value) = canonical.parse::<i32>() {
                return Ok(Operation::IntegerConstant(value));
            }
        } else if negative {
            canonical.insert(0, '-');
        }
        T::parse_canonical(&canonical)
            .map(Operation::FloatingPointConstant)
            .ok_or_else(invalid)
    }

    fn parse_ident_like(&mut self) -> CalcResult<Parsed<T>> {
        let start = self.pos;
        while let Some(b) = self.input.as_bytes().get(self.pos) {
            match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' => self.pos += 1,
                _ => break,
            }
        }
        let ident = &self.input[start..self.pos];
        self.skip_ws();

        if self.peek_char() == Some('(') {
            self.pos += 1;
            let separator = self.parser.locale.argument_separator;
            let mut arguments = Vec::new();
            let mut depth = 0;
            self.skip_ws();
            if self.peek_char() != Some(')') {
                loop {
                    let (argument, argument_depth) = self.parse_bp(0)?;
                    arguments.push(argument);
                    depth = depth.max(argument_depth);
                    self.skip_ws();
                    match self.peek_char() {
                        Some(ch) if ch == separator => {
                            self.pos += ch.len_utf8();
                        }
                        Some(')') => break,
                        Some(_) => return Err(ParseError::UnexpectedToken(self.pos).into()),
                        None => return Err(ParseError::UnexpectedEof.into()),
                    }
                }
            }
            self.expect(')')?;
            if depth + 1 > MAX_DEPTH {
                return Err(too_deep());
            }
            self.parser.functions.resolve(ident, arguments.len())?;
            return Ok((Operation::call(ident, arguments), depth + 1));
        }

        let leaf = match self.parser.constants.get(ident) {
            Some(info) if !info.overwritable => Operation::FloatingPointConstant(info.value),
            _ => Operation::variable(ident),
        };
        Ok((leaf, 1))
    }

    fn peek_infix_op(&self) -> Option<(Infix, usize, (u8, u8))> {
        let bytes = self.input.as_bytes();
        let b0 = *bytes.get(self.pos)?;
        let b1 = bytes.get(self.pos + 1).copied().unwrap_or(0);
        let (op, len, bp) = match (b0, b1) {
            (b'+', _) => (Infix::Binary(BinaryOp::Add), 1, ADDITIVE_BP),
            (b'-', _) => (Infix::Binary(BinaryOp::Subtract), 1, ADDITIVE_BP),
            (b'*', _) => (Infix::Binary(BinaryOp::Multiply), 1, MULTIPLICATIVE_BP),
            (b'/', _) => (Infix::Binary(BinaryOp::Divide), 1, MULTIPLICATIVE_BP),
            (b'%', _) => (Infix::Binary(BinaryOp::Modulo), 1, MULTIPLICATIVE_BP),
            (b'^', _) => (Infix::Binary(BinaryOp::Power), 1, POWER_BP),
            (b'=', b'=') => (Infix::Compare(CompareOp::Equal), 2, COMPARE_BP),
            (b'=', _) => (Infix::Compare(CompareOp::Equal), 1, COMPARE_BP),
            (b'!', b'=') => (Infix::Compare(CompareOp::NotEqual), 2, COMPARE_BP),
            (b'<', b'>') => (Infix::Compare(CompareOp::NotEqual), 2, COMPARE_BP),
            (b'<', b'=') => (Infix::Compare(CompareOp::LessOrEqual), 2, COMPARE_BP),
            (b'>', b'=') => (Infix::Compare(CompareOp::GreaterOrEqual), 2, COMPARE_BP),
            (b'<', _) => (Infix::Compare(CompareOp::LessThan), 1, COMPARE_BP),
            (b'>', _) => (Infix::Compare(CompareOp::GreaterThan), 1, COMPARE_BP),
            _ => return None,
        };
        Some((op, len, bp))
    }

    fn expect(&mut self, ch: char) -> CalcResult<()> {
        match self.peek_char() {
            Some(c) if c == ch => {
                self.pos += ch.len_utf8();
                Ok(())
            }
            Some(_) => Err(ParseError::UnexpectedToken(self.pos).into()),
            None => Err(ParseError::UnexpectedEof.into()),
        }
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset..)?.chars().next()
    }
}
