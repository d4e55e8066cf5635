use logos::Logos;

use plume_core::List;

use crate::builtins::Builtin;
use crate::error::{ExprError, ExprResult};
use crate::token::{FetchKind, Fixity, FunctionRef, Keyword, Operator, Punct, Token};

/// Names the tokenizer can classify ahead of evaluation.
///
/// Anything not known here is still callable: function-shaped identifiers
/// become [`FetchKind::Unresolved`] and are looked up when evaluated.
pub trait SymbolTable {
    /// Whether a host function with this name is bound.
    fn is_external_function(&self, _name: &str) -> bool {
        false
    }

    /// Whether a story function knot with this name exists.
    fn is_story_function(&self, _name: &str) -> bool {
        false
    }

    /// Whether a list definition with this name exists.
    fn is_list_definition(&self, _name: &str) -> bool {
        false
    }
}

/// A symbol table that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl SymbolTable for NoSymbols {}

/// Internal logos token, classified into [`Token`] afterwards.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum RawToken {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("->")]
    Arrow,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("!?")]
    NotHas,
    #[token("=")]
    Eq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token("&")]
    Amp,
    #[token("^")]
    Caret,
    #[token("|")]
    Pipe,
    #[regex(r#""([^"\\]|\\.)*""#)]
    Str,
    #[regex(r"[0-9]+\.[0-9]+")]
    Float,
    #[regex(r"[0-9]+")]
    Integer,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*")]
    Ident,
}

fn infix(op: Operator) -> Token {
    Token::Operator(op, Fixity::Infix)
}

/// Whether the previous token ends an operand, making a following `-` infix
/// and a following `++` postfix.
fn ends_operand(prev: Option<&Token>) -> bool {
    match prev {
        Some(Token::Operator(_, Fixity::Postfix)) => true,
        Some(Token::Punct(Punct::Close)) => true,
        Some(Token::Function(_)) => true,
        Some(token) => token.is_operand(),
        None => false,
    }
}

fn keyword_operator(word: &str) -> Option<Operator> {
    match word {
        "and" => Some(Operator::And),
        "or" => Some(Operator::Or),
        "not" => Some(Operator::Not),
        "mod" => Some(Operator::Modulo),
        "has" => Some(Operator::Contains),
        "hasnt" => Some(Operator::NotContains),
        _ => None,
    }
}

/// Tokenize an expression into a flat token sequence with function arities
/// filled in.
pub fn tokenize(source: &str, symbols: &dyn SymbolTable) -> ExprResult<Vec<Token>> {
    let mut raw = Vec::new();
    let mut lexer = RawToken::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => raw.push((token, lexer.slice(), span.start)),
            Err(()) => {
                return Err(ExprError::UnexpectedCharacter {
                    offset: span.start,
                    found: source[span].to_string(),
                });
            }
        }
    }

    let mut tokens: Vec<Token> = Vec::with_capacity(raw.len());
    let mut path_mode = false;
    let mut i = 0;
    while i < raw.len() {
        let (kind, slice, offset) = raw[i];
        let next = raw.get(i + 1).map(|(k, _, _)| *k);
        let prev = tokens.last();

        if path_mode && kind != RawToken::Ident {
            return Err(ExprError::ExpectedPath(offset));
        }

        let token = match kind {
            RawToken::Arrow => {
                path_mode = true;
                i += 1;
                continue;
            }
            RawToken::LParen => {
                let after_function = matches!(prev, Some(Token::Function(_)));
                if !after_function && next == Some(RawToken::RParen) {
                    i += 2;
                    tokens.push(Token::List(List::new()));
                    continue;
                }
                Token::Punct(Punct::Open)
            }
            RawToken::RParen => Token::Punct(Punct::Close),
            RawToken::Comma => Token::Punct(Punct::Comma),
            RawToken::EqEq => infix(Operator::Equal),
            RawToken::NotEq => infix(Operator::NotEqual),
            RawToken::LessEq => infix(Operator::LessEq),
            RawToken::GreaterEq => infix(Operator::GreaterEq),
            RawToken::AndAnd => infix(Operator::And),
            RawToken::OrOr => infix(Operator::Or),
            RawToken::Shl => infix(Operator::ShiftLeft),
            RawToken::Shr => infix(Operator::ShiftRight),
            RawToken::PlusPlus | RawToken::MinusMinus => {
                let op = if kind == RawToken::PlusPlus {
                    Operator::Increment
                } else {
                    Operator::Decrement
                };
                let fixity = if ends_operand(prev) {
                    Fixity::Postfix
                } else {
                    Fixity::Prefix
                };
                Token::Operator(op, fixity)
            }
            RawToken::PlusEq => infix(Operator::AddAssign),
            RawToken::MinusEq => infix(Operator::SubAssign),
            RawToken::NotHas => infix(Operator::NotContains),
            RawToken::Eq => infix(Operator::Assign),
            RawToken::Plus => infix(Operator::Add),
            RawToken::Minus => {
                if ends_operand(prev) {
                    infix(Operator::Subtract)
                } else {
                    Token::Operator(Operator::Negate, Fixity::Prefix)
                }
            }
            RawToken::Star => infix(Operator::Multiply),
            RawToken::Slash => infix(Operator::Divide),
            RawToken::Percent => infix(Operator::Modulo),
            RawToken::Less => infix(Operator::Less),
            RawToken::Greater => infix(Operator::Greater),
            RawToken::Bang => Token::Operator(Operator::Not, Fixity::Prefix),
            RawToken::Question => infix(Operator::Contains),
            RawToken::Amp => infix(Operator::BitAnd),
            RawToken::Caret => infix(Operator::BitXor),
            RawToken::Pipe => infix(Operator::BitOr),
            RawToken::Str => Token::Str(unescape(&slice[1..slice.len() - 1])),
            RawToken::Float => Token::Float(
                slice
                    .parse()
                    .map_err(|_| ExprError::InvalidNumber(slice.to_string()))?,
            ),
            RawToken::Integer => Token::Int(
                slice
                    .parse()
                    .map_err(|_| ExprError::InvalidNumber(slice.to_string()))?,
            ),
            RawToken::Ident => {
                let token = classify(slice, next == Some(RawToken::LParen), path_mode, symbols);
                path_mode = false;
                token
            }
        };
        tokens.push(token);
        i += 1;
    }

    if path_mode {
        return Err(ExprError::ExpectedPath(source.len()));
    }

    assign_arities(&mut tokens)?;
    Ok(tokens)
}

/// Classify a bare identifier.
fn classify(word: &str, called: bool, path_mode: bool, symbols: &dyn SymbolTable) -> Token {
    if path_mode {
        return Token::Path(word.to_string());
    }
    if let Some(op) = keyword_operator(word) {
        let fixity = if op == Operator::Not {
            Fixity::Prefix
        } else {
            Fixity::Infix
        };
        return Token::Operator(op, fixity);
    }
    match word {
        "true" => return Token::Bool(true),
        "false" => return Token::Bool(false),
        _ => {}
    }

    let function = |kind| {
        Token::Function(FunctionRef {
            name: word.to_string(),
            kind,
            arity: 0,
        })
    };
    if let Some(builtin) = Builtin::from_name(word) {
        return function(FetchKind::Builtin(builtin));
    }
    if symbols.is_external_function(word) {
        return function(FetchKind::External);
    }
    if symbols.is_story_function(word) {
        return function(FetchKind::StorySection);
    }
    match word {
        "temp" => return Token::Keyword(Keyword::Temp),
        "return" => return Token::Keyword(Keyword::Return),
        _ => {}
    }
    if called {
        let kind = if symbols.is_list_definition(word) {
            FetchKind::ListSubscript
        } else {
            FetchKind::Unresolved
        };
        return function(kind);
    }
    Token::Variable(word.to_string())
}

/// Fill in each function token's argument count from the paren/comma
/// structure that follows it.
fn assign_arities(tokens: &mut [Token]) -> ExprResult<()> {
    struct Frame {
        function: Option<usize>,
        commas: usize,
        has_content: bool,
    }

    let mut frames: Vec<Frame> = Vec::new();
    for i in 0..tokens.len() {
        match &tokens[i] {
            Token::Punct(Punct::Comma) => match frames.last_mut() {
                Some(frame) if frame.function.is_some() => frame.commas += 1,
                _ => return Err(ExprError::MisplacedComma(i)),
            },
            Token::Punct(Punct::Close) => {
                let frame = frames.pop().ok_or(ExprError::UnmatchedParen(i))?;
                if let Some(index) = frame.function {
                    let arity = if frame.has_content {
                        frame.commas + 1
                    } else {
                        0
                    };
                    if let Token::Function(func) = &mut tokens[index] {
                        func.arity = arity;
                    }
                }
            }
            token => {
                let opens = matches!(token, Token::Punct(Punct::Open));
                if let Some(frame) = frames.last_mut() {
                    frame.has_content = true;
                }
                if opens {
                    let function = match i.checked_sub(1).map(|p| &tokens[p]) {
                        Some(Token::Function(_)) => Some(i - 1),
                        _ => None,
                    };
                    frames.push(Frame {
                        function,
                        commas: 0,
                        has_content: false,
                    });
                }
            }
        }
    }
    if frames.is_empty() {
        Ok(())
    } else {
        Err(ExprError::UnclosedParen)
    }
}

/// Process escape sequences in a string literal.
///
/// Supports `\\`, `\n`, `\t`, `\"`. Unknown sequences are kept as-is.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Symbols;

    impl SymbolTable for Symbols {
        fn is_external_function(&self, name: &str) -> bool {
            name == "roll"
        }

        fn is_story_function(&self, name: &str) -> bool {
            name == "describe"
        }

        fn is_list_definition(&self, name: &str) -> bool {
            name == "Colors"
        }
    }

    fn lex(source: &str) -> Vec<Token> {
        tokenize(source, &Symbols).unwrap()
    }

    #[test]
    fn assignment_scenario() {
        assert_eq!(
            lex("x = 5 + 7"),
            vec![
                Token::Variable("x".to_string()),
                Token::Operator(Operator::Assign, Fixity::Infix),
                Token::Int(5),
                Token::Operator(Operator::Add, Fixity::Infix),
                Token::Int(7),
            ]
        );
    }

    #[test]
    fn numbers_split_on_dot() {
        assert_eq!(lex("3.25"), vec![Token::Float(3.25)]);
        assert_eq!(lex("42"), vec![Token::Int(42)]);
    }

    #[test]
    fn minus_position() {
        let tokens = lex("-a - -1");
        assert_eq!(tokens[0], Token::Operator(Operator::Negate, Fixity::Prefix));
        assert_eq!(tokens[2], Token::Operator(Operator::Subtract, Fixity::Infix));
        assert_eq!(tokens[3], Token::Operator(Operator::Negate, Fixity::Prefix));
    }

    #[test]
    fn increment_position() {
        assert_eq!(
            lex("x++")[1],
            Token::Operator(Operator::Increment, Fixity::Postfix)
        );
        assert_eq!(
            lex("++x")[0],
            Token::Operator(Operator::Increment, Fixity::Prefix)
        );
    }

    #[test]
    fn keyword_operators() {
        let tokens = lex("not a and b or c mod 2 has d");
        let ops: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Operator(op, _) => Some(*op),
                _ => None,
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                Operator::Not,
                Operator::And,
                Operator::Or,
                Operator::Modulo,
                Operator::Contains
            ]
        );
    }

    #[test]
    fn identifier_classification() {
        let tokens = lex("MIN(1, 2) + roll() + describe(x) + Colors(2) + mystery(1) + true + temp");
        let kinds: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Function(f) => Some(format!("{}:{:?}:{}", f.name, f.kind, f.arity)),
                Token::Bool(b) => Some(b.to_string()),
                Token::Keyword(k) => Some(k.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "MIN:Builtin(Min):2",
                "roll:External:0",
                "describe:StorySection:1",
                "Colors:ListSubscript:1",
                "mystery:Unresolved:1",
                "true",
                "temp",
            ]
        );
    }

    #[test]
    fn arrow_enters_path_mode() {
        assert_eq!(
            lex("READ_COUNT(-> forest.clearing)")[2],
            Token::Path("forest.clearing".to_string())
        );
        assert!(matches!(
            tokenize("-> 5", &NoSymbols),
            Err(ExprError::ExpectedPath(3))
        ));
    }

    #[test]
    fn nested_call_arity() {
        let tokens = lex("MAX(MIN(1, 2), (3 + 4))");
        let arities: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Function(f) => Some(f.arity),
                _ => None,
            })
            .collect();
        assert_eq!(arities, vec![2, 2]);
    }

    #[test]
    fn empty_parens_are_empty_list() {
        assert_eq!(lex("()"), vec![Token::List(List::new())]);
        assert_eq!(lex("TURNS()").len(), 3);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(lex(r#""say \"hi\"""#), vec![Token::Str("say \"hi\"".to_string())]);
    }

    #[test]
    fn paren_errors() {
        assert!(matches!(
            tokenize("(1 + 2", &NoSymbols),
            Err(ExprError::UnclosedParen)
        ));
        assert!(matches!(
            tokenize("1 + 2)", &NoSymbols),
            Err(ExprError::UnmatchedParen(3))
        ));
        assert!(matches!(
            tokenize("1, 2", &NoSymbols),
            Err(ExprError::MisplacedComma(1))
        ));
    }

    #[test]
    fn unexpected_character() {
        assert!(matches!(
            tokenize("a @ b", &NoSymbols),
            Err(ExprError::UnexpectedCharacter { offset: 2, .. })
        ));
    }
}
