//! Integer expressions used in constraint templates.
//!
//! Expressions are trees of operators applied to template parameters and integer literals. Boolean
//! results are represented as 0 (false) and 1 (true). The textual form is functional notation,
//! e.g. `ge(add(a,b),10)`.
#![allow(missing_docs)]
use anyhow::{Context, Result, bail, ensure};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use strum::{EnumString, IntoStaticStr};

/// An operator from the fixed expression vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Abs,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

impl Operator {
    /// The number of operands this operator takes
    pub fn arity(self) -> usize {
        match self {
            Self::Neg | Self::Abs | Self::Not => 1,
            _ => 2,
        }
    }

    /// The name of the operator in functional notation
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// An integer expression over named parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// A reference to a template parameter
    Param(String),
    /// An integer literal
    Int(i64),
    /// An operator applied to operands (the number of operands always matches the arity)
    Apply(Operator, Vec<Expr>),
}

/// A reference to the named parameter
pub fn param(name: &str) -> Expr {
    Expr::Param(name.to_string())
}

/// An integer literal
pub fn int(value: i64) -> Expr {
    Expr::Int(value)
}

fn unary(op: Operator, operand: Expr) -> Expr {
    Expr::Apply(op, vec![operand])
}

fn binary(op: Operator, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Apply(op, vec![lhs, rhs])
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    binary(Operator::Add, lhs, rhs)
}

pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    binary(Operator::Sub, lhs, rhs)
}

pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    binary(Operator::Mul, lhs, rhs)
}

pub fn div(lhs: Expr, rhs: Expr) -> Expr {
    binary(Operator::Div, lhs, rhs)
}

pub fn neg(operand: Expr) -> Expr {
    unary(Operator::Neg, operand)
}

pub fn abs(operand: Expr) -> Expr {
    unary(Operator::Abs, operand)
}

pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    binary(Operator::Eq, lhs, rhs)
}

pub fn le(lhs: Expr, rhs: Expr) -> Expr {
    binary(Operator::Le, lhs, rhs)
}

pub fn ge(lhs: Expr, rhs: Expr) -> Expr {
    binary(Operator::Ge, lhs, rhs)
}

pub fn and(lhs: Expr, rhs: Expr) -> Expr {
    binary(Operator::And, lhs, rhs)
}

/// Sum a sequence of expressions, giving zero if there are none
pub fn sum<I: IntoIterator<Item = Expr>>(terms: I) -> Expr {
    terms.into_iter().reduce(add).unwrap_or(Expr::Int(0))
}

impl Expr {
    /// Evaluate the expression with the given parameter values
    pub fn evaluate(&self, values: &HashMap<&str, i64>) -> Result<i64> {
        let value = match self {
            Self::Param(name) => *values
                .get(name.as_str())
                .with_context(|| format!("No value for parameter {name}"))?,
            Self::Int(value) => *value,
            Self::Apply(op, operands) => {
                let args: Vec<i64> = operands
                    .iter()
                    .map(|operand| operand.evaluate(values))
                    .collect::<Result<_>>()?;
                apply(*op, &args)?
            }
        };

        Ok(value)
    }

    /// Iterate over the names of all parameters referenced in the expression, in order of
    /// appearance (names may repeat)
    pub fn iter_params(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Self::Param(name) => Box::new(std::iter::once(name.as_str())),
            Self::Int(_) => Box::new(std::iter::empty()),
            Self::Apply(_, operands) => Box::new(operands.iter().flat_map(Expr::iter_params)),
        }
    }

    /// Return a copy of the expression with parameters renamed
    pub fn rename_params(&self, names: &HashMap<&str, String>) -> Expr {
        match self {
            Self::Param(name) => {
                Self::Param(names.get(name.as_str()).unwrap_or(name).clone())
            }
            Self::Int(value) => Self::Int(*value),
            Self::Apply(op, operands) => Self::Apply(
                *op,
                operands.iter().map(|e| e.rename_params(names)).collect(),
            ),
        }
    }
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

fn checked(value: Option<i64>, op: Operator) -> Result<i64> {
    value.with_context(|| format!("Integer overflow evaluating {}", op.name()))
}

/// Apply an operator to evaluated operands
fn apply(op: Operator, args: &[i64]) -> Result<i64> {
    let value = match (op, args) {
        (Operator::Neg, [a]) => checked(a.checked_neg(), op)?,
        (Operator::Abs, [a]) => checked(a.checked_abs(), op)?,
        (Operator::Not, [a]) => bool_to_int(*a == 0),
        (Operator::Add, [a, b]) => checked(a.checked_add(*b), op)?,
        (Operator::Sub, [a, b]) => checked(a.checked_sub(*b), op)?,
        (Operator::Mul, [a, b]) => checked(a.checked_mul(*b), op)?,
        (Operator::Div, [a, b]) => {
            ensure!(*b != 0, "Division by zero");
            checked(a.checked_div(*b), op)?
        }
        (Operator::Eq, [a, b]) => bool_to_int(a == b),
        (Operator::Ne, [a, b]) => bool_to_int(a != b),
        (Operator::Lt, [a, b]) => bool_to_int(a < b),
        (Operator::Le, [a, b]) => bool_to_int(a <= b),
        (Operator::Gt, [a, b]) => bool_to_int(a > b),
        (Operator::Ge, [a, b]) => bool_to_int(a >= b),
        (Operator::And, [a, b]) => bool_to_int(*a != 0 && *b != 0),
        (Operator::Or, [a, b]) => bool_to_int(*a != 0 || *b != 0),
        _ => bail!(
            "Operator {} takes {} operands, got {}",
            op.name(),
            op.arity(),
            args.len()
        ),
    };

    Ok(value)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Param(name) => write!(f, "{name}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Apply(op, operands) => {
                write!(f, "{}(", op.name())?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{operand}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl FromStr for Expr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parser = Parser { input: s, pos: 0 };
        let expr = parser.parse_expr()?;
        parser.skip_whitespace();
        ensure!(
            parser.pos == s.len(),
            "Unexpected trailing characters in expression: {}",
            &s[parser.pos..]
        );

        Ok(expr)
    }
}

/// Recursive-descent parser for functional notation
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        self.skip_whitespace();
        ensure!(
            self.peek() == Some(c),
            "Expected '{c}' at position {} in expression {}",
            self.pos,
            self.input
        );
        self.pos += c.len_utf8();
        Ok(())
    }

    /// Take the longest prefix made of characters matching the predicate
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &str {
        let rest = self.rest();
        let len = rest.find(|c| !pred(c)).unwrap_or(rest.len());
        let token = &self.input[self.pos..self.pos + len];
        self.pos += len;
        token
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let start = self.pos;
                self.pos += c.len_utf8();
                self.take_while(|c| c.is_ascii_digit());
                let token = &self.input[start..self.pos];
                let value = token
                    .parse()
                    .with_context(|| format!("Invalid integer literal: {token}"))?;
                Ok(Expr::Int(value))
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let ident = self
                    .take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                    .to_string();
                self.skip_whitespace();
                if self.peek() != Some('(') {
                    return Ok(Expr::Param(ident));
                }

                let op = Operator::from_str(&ident)
                    .with_context(|| format!("Unknown operator: {ident}"))?;
                self.expect('(')?;
                let mut operands = vec![self.parse_expr()?];
                for _ in 1..op.arity() {
                    self.expect(',')?;
                    operands.push(self.parse_expr()?);
                }
                self.expect(')')?;

                Ok(Expr::Apply(op, operands))
            }
            _ => bail!(
                "Unexpected input at position {} in expression {}",
                self.pos,
                self.input
            ),
        }
    }
}
