//! Postfix condition expressions attached to triggers.
//!
//! A condition is a flattened reverse-Polish sequence of tokens as sent by the server:
//!
//! ```json
//! [{"p": "level"}, {"i": 5}, {"o": "greater than"}, {"p": "mode"}, {"s": "hard"}, {"o": "equal to"}, {"o": "and"}]
//! ```
//!
//! Evaluation never fails loudly. Stack underflow, unknown operators, missing parameters and
//! operands of incompatible kinds all evaluate the whole condition to `false`.
use std::{cmp::Ordering, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{event::timestamp_serde, try_parse::TryParse, ParamValue, Params};

/// A condition expression. The empty expression is always true.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Condition {
    tokens: Vec<TryParse<Token>>,
}

impl Condition {
    /// Build a condition from already parsed tokens.
    pub fn new(tokens: impl IntoIterator<Item = Token>) -> Self {
        Condition {
            tokens: tokens.into_iter().map(TryParse::Parsed).collect(),
        }
    }

    /// Returns `true` if the condition has no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Evaluate the condition against event parameters. Returns `false` if the expression is
    /// malformed or cannot be applied to the parameters.
    pub fn evaluate(&self, params: &Params) -> bool {
        self.try_evaluate(params).unwrap_or(false)
    }

    /// Try evaluating the condition, returning `None` if evaluation failed.
    fn try_evaluate(&self, params: &Params) -> Option<bool> {
        let mut stack: Vec<Operand> = Vec::with_capacity(self.tokens.len());

        for token in &self.tokens {
            let token = match token {
                TryParse::Parsed(token) => token,
                TryParse::ParseFailed(raw) => {
                    log::warn!(target: "ddna", token:serde = raw; "unrecognized condition token");
                    return None;
                }
            };

            let operand = match token {
                Token::Operator(op) => {
                    let (Some(right), Some(left)) = (stack.pop(), stack.pop()) else {
                        log::warn!(target: "ddna", operator:display = op; "not enough operands for operator");
                        return None;
                    };
                    let result = op.apply(&left, &right);
                    if result.is_none() {
                        log::debug!(target: "ddna",
                                    operator:display = op;
                                    "operator cannot be applied to operands of these kinds");
                    }
                    Operand::Bool(result?)
                }
                Token::Param(key) => match params.get(key) {
                    Some(value) => Operand::from(value),
                    None => {
                        log::debug!(target: "ddna", key:display = key; "parameter not found in event");
                        return None;
                    }
                },
                Token::Bool(b) => Operand::Bool(*b),
                Token::Int(i) => Operand::Int(*i),
                Token::Long(l) => Operand::Long(*l),
                Token::Float(f) => Operand::Float(*f),
                Token::Double(d) => Operand::Double(*d),
                Token::String(s) => Operand::String(s),
                Token::Timestamp(t) => Operand::Timestamp(*t),
            };
            stack.push(operand);
        }

        match stack.as_slice() {
            [] => Some(true),
            [Operand::Bool(result)] => Some(*result),
            _ => None,
        }
    }
}

/// A single token of a condition expression.
///
/// On the wire every token is an object with a single key naming its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Token {
    /// Reference to an event parameter by key.
    #[serde(rename = "p")]
    Param(String),
    /// Boolean literal.
    #[serde(rename = "b")]
    Bool(bool),
    /// 32-bit integer literal.
    #[serde(rename = "i")]
    Int(i32),
    /// 64-bit integer literal.
    #[serde(rename = "l")]
    Long(i64),
    /// Single precision float literal.
    #[serde(rename = "f")]
    Float(f32),
    /// Double precision float literal.
    #[serde(rename = "d")]
    Double(f64),
    /// String literal.
    #[serde(rename = "s")]
    String(String),
    /// Timestamp literal in the `yyyy-MM-dd'T'HH:mm:ss.SSSZ` format.
    #[serde(rename = "t")]
    Timestamp(#[serde(with = "timestamp_serde")] DateTime<Utc>),
    /// Operator applied to the two topmost operands.
    #[serde(rename = "o")]
    Operator(Operator),
}

/// Operators supported in condition expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    /// Logical conjunction of two booleans.
    And,
    /// Logical disjunction of two booleans.
    Or,
    /// Equality of two values of the same kind.
    EqualTo,
    /// Case-insensitive equality of two strings.
    EqualToIgnoreCase,
    /// Inequality of two values of the same kind.
    NotEqualTo,
    /// Case-insensitive inequality of two strings.
    NotEqualToIgnoreCase,
    /// Numbers and timestamps only.
    GreaterThan,
    /// Numbers and timestamps only.
    GreaterThanEq,
    /// Numbers and timestamps only.
    LessThan,
    /// Numbers and timestamps only.
    LessThanEq,
    /// Left string contains the right one.
    Contains,
    /// Case-insensitive [`Operator::Contains`].
    ContainsIgnoreCase,
    /// Left string starts with the right one.
    StartsWith,
    /// Case-insensitive [`Operator::StartsWith`].
    StartsWithIgnoreCase,
    /// Left string ends with the right one.
    EndsWith,
    /// Case-insensitive [`Operator::EndsWith`].
    EndsWithIgnoreCase,
}

impl Operator {
    const ALL: [Operator; 16] = [
        Self::And,
        Self::Or,
        Self::EqualTo,
        Self::EqualToIgnoreCase,
        Self::NotEqualTo,
        Self::NotEqualToIgnoreCase,
        Self::GreaterThan,
        Self::GreaterThanEq,
        Self::LessThan,
        Self::LessThanEq,
        Self::Contains,
        Self::ContainsIgnoreCase,
        Self::StartsWith,
        Self::StartsWithIgnoreCase,
        Self::EndsWith,
        Self::EndsWithIgnoreCase,
    ];

    /// Name of the operator as sent by the server.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::EqualTo => "equal to",
            Self::EqualToIgnoreCase => "equal to ic",
            Self::NotEqualTo => "not equal to",
            Self::NotEqualToIgnoreCase => "not equal to ic",
            Self::GreaterThan => "greater than",
            Self::GreaterThanEq => "greater than eq",
            Self::LessThan => "less than",
            Self::LessThanEq => "less than eq",
            Self::Contains => "contains",
            Self::ContainsIgnoreCase => "contains ic",
            Self::StartsWith => "starts with",
            Self::StartsWithIgnoreCase => "starts with ic",
            Self::EndsWith => "ends with",
            Self::EndsWithIgnoreCase => "ends with ic",
        }
    }

    /// Apply the operator to `left` (pushed first) and `right` (pushed last). Returns `None` if
    /// the operator cannot be applied to operands of these kinds.
    fn apply(&self, left: &Operand, right: &Operand) -> Option<bool> {
        use Operand::{Bool, String};

        match self {
            Self::And | Self::Or => {
                let (Bool(l), Bool(r)) = (left, right) else {
                    return None;
                };
                Some(if *self == Self::And { *l && *r } else { *l || *r })
            }

            Self::EqualTo => Some(left.compare(right)? == Ordering::Equal),
            Self::NotEqualTo => Some(left.compare(right)? != Ordering::Equal),

            Self::GreaterThan => Some(left.compare_ordered(right)?.is_gt()),
            Self::GreaterThanEq => Some(left.compare_ordered(right)?.is_ge()),
            Self::LessThan => Some(left.compare_ordered(right)?.is_lt()),
            Self::LessThanEq => Some(left.compare_ordered(right)?.is_le()),

            _ => {
                let (String(l), String(r)) = (left, right) else {
                    return None;
                };
                Some(self.apply_to_strings(l, r))
            }
        }
    }

    fn apply_to_strings(&self, left: &str, right: &str) -> bool {
        match self {
            Self::EqualTo => left == right,
            Self::NotEqualTo => left != right,
            Self::Contains => left.contains(right),
            Self::StartsWith => left.starts_with(right),
            Self::EndsWith => left.ends_with(right),
            Self::EqualToIgnoreCase
            | Self::NotEqualToIgnoreCase
            | Self::ContainsIgnoreCase
            | Self::StartsWithIgnoreCase
            | Self::EndsWithIgnoreCase => {
                let sensitive = match self {
                    Self::EqualToIgnoreCase => Self::EqualTo,
                    Self::NotEqualToIgnoreCase => Self::NotEqualTo,
                    Self::ContainsIgnoreCase => Self::Contains,
                    Self::StartsWithIgnoreCase => Self::StartsWith,
                    _ => Self::EndsWith,
                };
                sensitive.apply_to_strings(&left.to_lowercase(), &right.to_lowercase())
            }
            _ => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for operator names the SDK does not know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator(String);

impl fmt::Display for UnknownOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operator {:?}", self.0)
    }
}

impl std::error::Error for UnknownOperator {}

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownOperator(s.to_owned()))
    }
}

impl TryFrom<String> for Operator {
    type Error = UnknownOperator;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        value.as_str().to_owned()
    }
}

/// Value on the evaluation stack.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Operand<'a> {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(&'a str),
    Timestamp(DateTime<Utc>),
}

impl<'a> From<&'a ParamValue> for Operand<'a> {
    fn from(value: &'a ParamValue) -> Self {
        match value {
            ParamValue::Bool(b) => Operand::Bool(*b),
            ParamValue::Int(i) => Operand::Int(*i),
            ParamValue::Long(l) => Operand::Long(*l),
            ParamValue::Float(f) => Operand::Float(*f),
            ParamValue::Double(d) => Operand::Double(*d),
            ParamValue::String(s) => Operand::String(s),
            ParamValue::Timestamp(t) => Operand::Timestamp(*t),
        }
    }
}

impl Operand<'_> {
    /// Compare two operands of the same kind. Operands of different kinds are not comparable.
    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(l), Self::Bool(r)) => Some(l.cmp(r)),
            (Self::Int(l), Self::Int(r)) => Some(l.cmp(r)),
            (Self::Long(l), Self::Long(r)) => Some(l.cmp(r)),
            (Self::Float(l), Self::Float(r)) => l.partial_cmp(r),
            (Self::Double(l), Self::Double(r)) => l.partial_cmp(r),
            (Self::String(l), Self::String(r)) => Some(l.cmp(r)),
            (Self::Timestamp(l), Self::Timestamp(r)) => Some(l.cmp(r)),
            _ => None,
        }
    }

    /// Like [`Operand::compare`], but booleans and strings have no ordering.
    fn compare_ordered(&self, other: &Self) -> Option<Ordering> {
        if matches!(self, Self::Bool(_) | Self::String(_)) {
            return None;
        }
        self.compare(other)
    }
}
