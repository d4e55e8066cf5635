//! Expression tokens.

use std::fmt;

use plume_core::{BinaryOp, List, UnaryOp};

use crate::builtins::Builtin;

/// A classified expression token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `temp` or `return`.
    Keyword(Keyword),
    /// `true` / `false`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal, escapes already processed.
    Str(String),
    /// List literal (currently only the empty list `()`).
    List(List),
    /// Section name following `->`.
    Path(String),
    /// An operator in a given position.
    Operator(Operator, Fixity),
    /// `(`, `)` or `,`.
    Punct(Punct),
    /// A function reference.
    Function(FunctionRef),
    /// A variable reference, resolved on read.
    Variable(String),
}

impl Token {
    /// Whether this token produces an operand when evaluated.
    pub fn is_operand(&self) -> bool {
        matches!(
            self,
            Token::Bool(_)
                | Token::Int(_)
                | Token::Float(_)
                | Token::Str(_)
                | Token::List(_)
                | Token::Path(_)
                | Token::Variable(_)
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Keyword(k) => write!(f, "{k}"),
            Token::Bool(b) => write!(f, "{b}"),
            Token::Int(n) => write!(f, "{n}"),
            Token::Float(n) => write!(f, "{n:?}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::List(l) => write!(f, "({l})"),
            Token::Path(p) => write!(f, "-> {p}"),
            Token::Operator(op, _) => write!(f, "{op}"),
            Token::Punct(p) => write!(f, "{p}"),
            Token::Function(func) => write!(f, "{}/{}", func.name, func.arity),
            Token::Variable(name) => write!(f, "{name}"),
        }
    }
}

/// Reserved words that act on the whole expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// Declare the assignment target as a temporary.
    Temp,
    /// Return from the enclosing story function.
    Return,
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Keyword::Temp => write!(f, "temp"),
            Keyword::Return => write!(f, "return"),
        }
    }
}

/// Grouping punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    /// `(`
    Open,
    /// `)`
    Close,
    /// `,`
    Comma,
}

impl fmt::Display for Punct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Punct::Open => write!(f, "("),
            Punct::Close => write!(f, ")"),
            Punct::Comma => write!(f, ","),
        }
    }
}

/// Position of an operator relative to its operand(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixity {
    /// Between two operands.
    Infix,
    /// Before its operand.
    Prefix,
    /// After its operand.
    Postfix,
}

/// Every operator the tokenizer recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Assign,
    /// `+=`
    AddAssign,
    /// `-=`
    SubAssign,
    /// `+`
    Add,
    /// Infix `-`.
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%` / `mod`
    Modulo,
    /// Prefix `-`.
    Negate,
    /// `!` / `not`
    Not,
    /// `++`
    Increment,
    /// `--`
    Decrement,
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
    /// `?` / `has`
    Contains,
    /// `!?` / `hasnt`
    NotContains,
    /// `&`
    BitAnd,
    /// `^`
    BitXor,
    /// `|`
    BitOr,
    /// `<<`
    ShiftLeft,
    /// `>>`
    ShiftRight,
}

impl Operator {
    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Negate | Operator::Not | Operator::Increment | Operator::Decrement => 13,
            Operator::Multiply | Operator::Divide | Operator::Modulo => 12,
            Operator::Add | Operator::Subtract => 11,
            Operator::ShiftLeft | Operator::ShiftRight => 10,
            Operator::Less
            | Operator::Greater
            | Operator::LessEq
            | Operator::GreaterEq
            | Operator::Contains
            | Operator::NotContains => 9,
            Operator::Equal | Operator::NotEqual => 8,
            Operator::BitAnd => 7,
            Operator::BitXor => 6,
            Operator::BitOr => 5,
            Operator::And => 4,
            Operator::Or => 3,
            Operator::Assign | Operator::AddAssign | Operator::SubAssign => 1,
        }
    }

    /// Whether a run of this operator groups right to left.
    pub fn is_right_associative(self) -> bool {
        self.is_assignment()
    }

    /// `=`, `+=` or `-=`.
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            Operator::Assign | Operator::AddAssign | Operator::SubAssign
        )
    }

    /// The value-level binary operator this maps to, if any.
    pub fn binary(self) -> Option<BinaryOp> {
        let op = match self {
            Operator::Add | Operator::AddAssign => BinaryOp::Add,
            Operator::Subtract | Operator::SubAssign => BinaryOp::Subtract,
            Operator::Multiply => BinaryOp::Multiply,
            Operator::Divide => BinaryOp::Divide,
            Operator::Modulo => BinaryOp::Modulo,
            Operator::Equal => BinaryOp::Equal,
            Operator::NotEqual => BinaryOp::NotEqual,
            Operator::Less => BinaryOp::Less,
            Operator::Greater => BinaryOp::Greater,
            Operator::LessEq => BinaryOp::LessEq,
            Operator::GreaterEq => BinaryOp::GreaterEq,
            Operator::And => BinaryOp::And,
            Operator::Or => BinaryOp::Or,
            Operator::Contains => BinaryOp::Contains,
            Operator::NotContains => BinaryOp::NotContains,
            Operator::BitAnd => BinaryOp::BitAnd,
            Operator::BitXor => BinaryOp::BitXor,
            Operator::BitOr => BinaryOp::BitOr,
            Operator::ShiftLeft => BinaryOp::ShiftLeft,
            Operator::ShiftRight => BinaryOp::ShiftRight,
            Operator::Assign
            | Operator::Negate
            | Operator::Not
            | Operator::Increment
            | Operator::Decrement => return None,
        };
        Some(op)
    }

    /// The value-level unary operator this maps to, if any.
    pub fn unary(self) -> Option<UnaryOp> {
        match self {
            Operator::Negate => Some(UnaryOp::Negate),
            Operator::Not => Some(UnaryOp::Not),
            Operator::Increment => Some(UnaryOp::Increment),
            Operator::Decrement => Some(UnaryOp::Decrement),
            _ => None,
        }
    }

    /// Source spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Assign => "=",
            Operator::AddAssign => "+=",
            Operator::SubAssign => "-=",
            Operator::Negate => "-",
            Operator::Not => "!",
            Operator::Increment => "++",
            Operator::Decrement => "--",
            other => other.binary().map(BinaryOp::symbol).unwrap_or("?"),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Where a function token's implementation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// A function built into the runtime.
    Builtin(Builtin),
    /// A host closure bound by name.
    External,
    /// A function knot in the story; evaluation suspends into the story.
    StorySection,
    /// `ListName(n)`: the item of a list definition with value `n`.
    ListSubscript,
    /// Not known at tokenize time; resolved when evaluated.
    Unresolved,
}

/// A function call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    /// Function name as written.
    pub name: String,
    /// How the call is dispatched.
    pub kind: FetchKind,
    /// Number of arguments at this call site.
    pub arity: usize,
}
