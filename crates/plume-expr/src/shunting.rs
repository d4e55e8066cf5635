//! Infix to postfix reordering.
//!
//! The output is a list of indices into the token slice it was given; the
//! tokens themselves stay where they are. Parentheses and commas only shape
//! the order and never appear in the output. Every other token appears
//! exactly once.

use crate::error::{ExprError, ExprResult};
use crate::token::{Fixity, Punct, Token};

/// Binding strength of a held token, or `None` for grouping entries that
/// stop a flush.
fn held_precedence(token: &Token) -> Option<(u8, Fixity)> {
    match token {
        Token::Operator(op, fixity) => Some((op.precedence(), *fixity)),
        Token::Keyword(_) => Some((0, Fixity::Prefix)),
        _ => None,
    }
}

/// Whether the held operator `top` must be emitted before `incoming` is
/// pushed.
fn should_flush(top: &Token, incoming: &Token) -> bool {
    let (Some((top_prec, _)), Token::Operator(op, _)) = (held_precedence(top), incoming) else {
        return false;
    };
    if op.is_right_associative() {
        top_prec > op.precedence()
    } else {
        top_prec >= op.precedence()
    }
}

/// Reorder `tokens` into postfix order.
pub fn to_postfix(tokens: &[Token]) -> ExprResult<Vec<usize>> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut held: Vec<usize> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Function(_) => {
                if matches!(tokens.get(i + 1), Some(Token::Punct(Punct::Open))) {
                    held.push(i);
                } else {
                    output.push(i);
                }
            }
            Token::Keyword(_) => held.push(i),
            Token::Operator(_, Fixity::Postfix) => output.push(i),
            Token::Operator(_, Fixity::Prefix) => held.push(i),
            Token::Operator(_, Fixity::Infix) => {
                while let Some(&top) = held.last() {
                    if !should_flush(&tokens[top], token) {
                        break;
                    }
                    output.push(top);
                    held.pop();
                }
                held.push(i);
            }
            Token::Punct(Punct::Open) => held.push(i),
            Token::Punct(Punct::Comma) => {
                flush_to_open(tokens, &mut held, &mut output);
                if held.is_empty() {
                    return Err(ExprError::MisplacedComma(i));
                }
            }
            Token::Punct(Punct::Close) => {
                flush_to_open(tokens, &mut held, &mut output);
                if held.pop().is_none() {
                    return Err(ExprError::UnmatchedParen(i));
                }
                if let Some(&top) = held.last() {
                    if matches!(tokens[top], Token::Function(_)) {
                        output.push(top);
                        held.pop();
                    }
                }
            }
            _ => output.push(i),
        }
    }

    while let Some(top) = held.pop() {
        if matches!(tokens[top], Token::Punct(Punct::Open)) {
            return Err(ExprError::UnclosedParen);
        }
        output.push(top);
    }
    Ok(output)
}

/// Move held tokens to the output until an open paren is on top.
fn flush_to_open(tokens: &[Token], held: &mut Vec<usize>, output: &mut Vec<usize>) {
    while let Some(&top) = held.last() {
        if matches!(tokens[top], Token::Punct(Punct::Open)) {
            break;
        }
        output.push(top);
        held.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{NoSymbols, tokenize};

    fn postfix(source: &str) -> String {
        let tokens = tokenize(source, &NoSymbols).unwrap();
        to_postfix(&tokens)
            .unwrap()
            .into_iter()
            .map(|i| tokens[i].to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(postfix("5 + 7 * 52 - 8"), "5 7 52 * + 8 -");
        assert_eq!(postfix("a - b - c"), "a b - c -");
        assert_eq!(postfix("a = b = 1"), "a b 1 = =");
    }

    #[test]
    fn parentheses_group() {
        assert_eq!(postfix("(5*5)-(3*3)+3"), "5 5 * 3 3 * - 3 +");
    }

    #[test]
    fn unary_binds_tightest() {
        assert_eq!(postfix("-a * b"), "a - b *");
        assert_eq!(postfix("not a and b"), "a ! b &&");
        assert_eq!(postfix("x++ + 1"), "x ++ 1 +");
    }

    #[test]
    fn function_arguments_stay_in_order() {
        assert_eq!(postfix("MIN(a + 1, b)"), "a 1 + b MIN/2");
        assert_eq!(postfix("MAX(MIN(1, 2), 3) * 2"), "1 2 MIN/2 3 MAX/2 2 *");
    }

    #[test]
    fn keywords_apply_last() {
        assert_eq!(postfix("temp x = 1 + 2"), "x 1 2 + = temp");
        assert_eq!(postfix("return x"), "x return");
    }

    #[test]
    fn logic_below_comparison() {
        assert_eq!(postfix("a < 1 || b == 2"), "a 1 < b 2 == ||");
    }

    #[test]
    fn unmatched_close_is_error() {
        let tokens = vec![Token::Int(1), Token::Punct(Punct::Close)];
        assert!(matches!(
            to_postfix(&tokens),
            Err(ExprError::UnmatchedParen(1))
        ));
    }
}
