use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ValueError, ValueResult};
use crate::list::{List, ListDefinitions};

/// The dynamic value that story logic computes with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// A text value.
    String(String),
    /// A set of list items.
    List(List),
}

/// The kind of a [`Value`], ordered by numeric promotion (`Bool < Int < Float`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// See [`Value::Bool`].
    Bool,
    /// See [`Value::Int`].
    Int,
    /// See [`Value::Float`].
    Float,
    /// See [`Value::String`].
    String,
    /// See [`Value::List`].
    List,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::List => "list",
        };
        write!(f, "{s}")
    }
}

/// Binary operators understood by [`Value::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`: addition, string concatenation, list union or list shift.
    Add,
    /// `-`: subtraction, list difference or list shift.
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%` / `mod`
    Modulo,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `<=`
    LessEq,
    /// `>=`
    GreaterEq,
    /// `&&` / `and`
    And,
    /// `||` / `or`
    Or,
    /// `?` / `has`: substring or list containment.
    Contains,
    /// `!?` / `hasnt`
    NotContains,
    /// `&`
    BitAnd,
    /// `^`: bitwise xor on integers, intersection on lists.
    BitXor,
    /// `|`
    BitOr,
    /// `<<`
    ShiftLeft,
    /// `>>`
    ShiftRight,
}

impl BinaryOp {
    /// Whether the operator yields a truth value and degrades to "no value"
    /// instead of failing on incompatible kinds.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::Less
                | Self::Greater
                | Self::LessEq
                | Self::GreaterEq
                | Self::Contains
                | Self::NotContains
        )
    }

    /// Source spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessEq => "<=",
            Self::GreaterEq => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Contains => "?",
            Self::NotContains => "!?",
            Self::BitAnd => "&",
            Self::BitXor => "^",
            Self::BitOr => "|",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operators understood by [`Value::apply_unary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Prefix `-`.
    Negate,
    /// `!` / `not`.
    Not,
    /// `++`
    Increment,
    /// `--`
    Decrement,
}

impl UnaryOp {
    /// Source spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Negate => "-",
            Self::Not => "!",
            Self::Increment => "++",
            Self::Decrement => "--",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

enum Numeric {
    Int(i64, i64),
    Float(f64, f64),
}

impl Value {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::List(_) => ValueKind::List,
        }
    }

    /// Truthiness used by conditions, guards and `and`/`or`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(n) => *n != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::List(l) => !l.is_empty(),
        }
    }

    /// Whether this is a bool, int or float.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Bool(_) | Self::Int(_) | Self::Float(_))
    }

    /// Integer view: floats truncate, lists yield their largest item value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(n) => Some(*n),
            Self::Float(n) => Some(*n as i64),
            Self::String(_) => None,
            Self::List(l) => Some(l.value()),
        }
    }

    /// Float view of a numeric value.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            Self::String(_) => None,
            Self::List(l) => Some(l.value() as f64),
        }
    }

    /// Borrow the list, if this is one.
    pub fn as_list(&self) -> Option<&List> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Borrow the string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Apply a binary operator.
    ///
    /// `Ok(None)` means the operator has no defined result for this pair of
    /// kinds. Only integer division by zero and list operations against an
    /// unknown definition are errors.
    pub fn apply(
        op: BinaryOp,
        lhs: &Value,
        rhs: &Value,
        definitions: &ListDefinitions,
    ) -> ValueResult<Option<Value>> {
        match op {
            BinaryOp::And => return Ok(Some(Value::Bool(lhs.is_truthy() && rhs.is_truthy()))),
            BinaryOp::Or => return Ok(Some(Value::Bool(lhs.is_truthy() || rhs.is_truthy()))),
            _ => {}
        }

        match (lhs, rhs) {
            (Value::List(a), Value::List(b)) => Ok(list_op(op, a, b)),
            (Value::List(a), other) if other.is_numeric() => {
                list_numeric_op(op, a, other, definitions)
            }
            (other, Value::List(b)) if other.is_numeric() && op.is_comparison() => {
                let lhs = other.as_float().unwrap_or_default();
                Ok(compare(op, lhs.partial_cmp(&(b.value() as f64))))
            }
            (Value::String(a), Value::String(b)) => Ok(string_op(op, a, b)),
            (Value::String(s), other) if other.is_numeric() => {
                Ok(coerced_compare(op, s, other, false))
            }
            (other, Value::String(s)) if other.is_numeric() => {
                Ok(coerced_compare(op, s, other, true))
            }
            (a, b) if a.is_numeric() && b.is_numeric() => numeric_op(op, a, b),
            _ => Ok(None),
        }
    }

    /// Apply a unary operator. `Ok(None)` means no defined result.
    pub fn apply_unary(
        op: UnaryOp,
        value: &Value,
        definitions: &ListDefinitions,
    ) -> ValueResult<Option<Value>> {
        let result = match (op, value) {
            (UnaryOp::Not, v) => Some(Value::Bool(!v.is_truthy())),
            (UnaryOp::Negate, Value::Bool(b)) => Some(Value::Int(-i64::from(*b))),
            (UnaryOp::Negate, Value::Int(n)) => Some(Value::Int(n.wrapping_neg())),
            (UnaryOp::Negate, Value::Float(n)) => Some(Value::Float(-n)),
            (UnaryOp::Increment, Value::List(l)) => Some(Value::List(l.shift(1, definitions)?)),
            (UnaryOp::Decrement, Value::List(l)) => Some(Value::List(l.shift(-1, definitions)?)),
            (UnaryOp::Increment, Value::Float(n)) => Some(Value::Float(n + 1.0)),
            (UnaryOp::Decrement, Value::Float(n)) => Some(Value::Float(n - 1.0)),
            (UnaryOp::Increment, Value::Int(n)) => Some(Value::Int(n.wrapping_add(1))),
            (UnaryOp::Decrement, Value::Int(n)) => Some(Value::Int(n.wrapping_sub(1))),
            (UnaryOp::Increment, Value::Bool(b)) => Some(Value::Int(i64::from(*b) + 1)),
            (UnaryOp::Decrement, Value::Bool(b)) => Some(Value::Int(i64::from(*b) - 1)),
            _ => None,
        };
        Ok(result)
    }
}

fn compare(op: BinaryOp, ordering: Option<Ordering>) -> Option<Value> {
    let ordering = ordering?;
    let result = match op {
        BinaryOp::Equal => ordering == Ordering::Equal,
        BinaryOp::NotEqual => ordering != Ordering::Equal,
        BinaryOp::Less => ordering == Ordering::Less,
        BinaryOp::Greater => ordering == Ordering::Greater,
        BinaryOp::LessEq => ordering != Ordering::Greater,
        BinaryOp::GreaterEq => ordering != Ordering::Less,
        _ => return None,
    };
    Some(Value::Bool(result))
}

fn promote(lhs: &Value, rhs: &Value) -> Option<Numeric> {
    if lhs.kind().max(rhs.kind()) == ValueKind::Float {
        Some(Numeric::Float(lhs.as_float()?, rhs.as_float()?))
    } else {
        Some(Numeric::Int(lhs.as_int()?, rhs.as_int()?))
    }
}

fn numeric_op(op: BinaryOp, lhs: &Value, rhs: &Value) -> ValueResult<Option<Value>> {
    let Some(pair) = promote(lhs, rhs) else {
        return Ok(None);
    };
    if op.is_comparison() {
        return Ok(match pair {
            Numeric::Int(a, b) => compare(op, Some(a.cmp(&b))),
            Numeric::Float(a, b) => compare(op, a.partial_cmp(&b)),
        });
    }
    let result = match pair {
        Numeric::Int(a, b) => match op {
            BinaryOp::Add => Value::Int(a.wrapping_add(b)),
            BinaryOp::Subtract => Value::Int(a.wrapping_sub(b)),
            BinaryOp::Multiply => Value::Int(a.wrapping_mul(b)),
            BinaryOp::Divide | BinaryOp::Modulo if b == 0 => {
                return Err(ValueError::DivideByZero);
            }
            BinaryOp::Divide => Value::Int(a.wrapping_div(b)),
            BinaryOp::Modulo => Value::Int(a.wrapping_rem(b)),
            BinaryOp::BitAnd => Value::Int(a & b),
            BinaryOp::BitXor => Value::Int(a ^ b),
            BinaryOp::BitOr => Value::Int(a | b),
            BinaryOp::ShiftLeft => Value::Int(
                shift_amount(b)
                    .and_then(|s| a.checked_shl(s))
                    .unwrap_or(0),
            ),
            BinaryOp::ShiftRight => Value::Int(
                shift_amount(b)
                    .and_then(|s| a.checked_shr(s))
                    .unwrap_or(if a < 0 { -1 } else { 0 }),
            ),
            _ => return Ok(None),
        },
        Numeric::Float(a, b) => match op {
            BinaryOp::Add => Value::Float(a + b),
            BinaryOp::Subtract => Value::Float(a - b),
            BinaryOp::Multiply => Value::Float(a * b),
            BinaryOp::Divide => Value::Float(a / b),
            BinaryOp::Modulo => Value::Float(a % b),
            _ => return Ok(None),
        },
    };
    Ok(Some(result))
}

/// Shift amounts outside `0..64` shift every bit out.
fn shift_amount(b: i64) -> Option<u32> {
    u32::try_from(b).ok().filter(|s| *s < i64::BITS)
}

fn string_op(op: BinaryOp, a: &str, b: &str) -> Option<Value> {
    match op {
        BinaryOp::Add => Some(Value::String(format!("{a}{b}"))),
        BinaryOp::Contains => Some(Value::Bool(a.contains(b))),
        BinaryOp::NotContains => Some(Value::Bool(!a.contains(b))),
        _ if op.is_comparison() => compare(op, Some(a.cmp(b))),
        _ => None,
    }
}

/// Compare a string against a number by parsing the string. A string that
/// does not parse is simply unequal to every number.
fn coerced_compare(op: BinaryOp, s: &str, number: &Value, string_on_right: bool) -> Option<Value> {
    if !op.is_comparison() || matches!(op, BinaryOp::Contains | BinaryOp::NotContains) {
        return None;
    }
    let trimmed = s.trim();
    let parsed = trimmed
        .parse::<i64>()
        .map(Value::Int)
        .or_else(|_| trimmed.parse::<f64>().map(Value::Float));
    let Ok(parsed) = parsed else {
        return Some(Value::Bool(op == BinaryOp::NotEqual));
    };
    let (lhs, rhs) = if string_on_right {
        (number, &parsed)
    } else {
        (&parsed, number)
    };
    match promote(lhs, rhs)? {
        Numeric::Int(a, b) => compare(op, Some(a.cmp(&b))),
        Numeric::Float(a, b) => compare(op, a.partial_cmp(&b)),
    }
}

fn list_op(op: BinaryOp, a: &List, b: &List) -> Option<Value> {
    let value = match op {
        BinaryOp::Add => Value::List(a.union(b)),
        BinaryOp::Subtract => Value::List(a.difference(b)),
        BinaryOp::BitXor => Value::List(a.intersect(b)),
        BinaryOp::Equal => Value::Bool(a == b),
        BinaryOp::NotEqual => Value::Bool(a != b),
        BinaryOp::Less => Value::Bool(a.less_than(b)),
        BinaryOp::Greater => Value::Bool(a.greater_than(b)),
        BinaryOp::LessEq => Value::Bool(a.less_or_equal(b)),
        BinaryOp::GreaterEq => Value::Bool(a.greater_or_equal(b)),
        BinaryOp::Contains => Value::Bool(a.contains(b)),
        BinaryOp::NotContains => Value::Bool(!a.contains(b)),
        _ => return None,
    };
    Some(value)
}

fn list_numeric_op(
    op: BinaryOp,
    list: &List,
    number: &Value,
    definitions: &ListDefinitions,
) -> ValueResult<Option<Value>> {
    match op {
        BinaryOp::Add | BinaryOp::Subtract => {
            let Some(n) = number.as_int() else {
                return Ok(None);
            };
            let by = if op == BinaryOp::Add { n } else { n.wrapping_neg() };
            Ok(Some(Value::List(list.shift(by, definitions)?)))
        }
        _ if op.is_comparison() => {
            let rhs = number.as_float().unwrap_or_default();
            Ok(compare(op, (list.value() as f64).partial_cmp(&rhs)))
        }
        _ => Ok(None),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::List(l) => write!(f, "{l}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<List> for Value {
    fn from(l: List) -> Self {
        Self::List(l)
    }
}
