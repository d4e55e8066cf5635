//! Integration tests: reorder_props.

use std::collections::HashSet;

use plume_expr::shunting::to_postfix;
use plume_expr::{NoSymbols, Punct, Token, lexer};
use proptest::prelude::*;

/// Random syntactically balanced expressions over a small grammar.
fn expression() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0i64..1000).prop_map(|n| n.to_string()),
        "[a-z]{1,3}".prop_filter("not a keyword", |s| {
            !matches!(s.as_str(), "and" | "or" | "not" | "mod" | "has")
        }),
        Just("true".to_string()),
        Just("\"s\"".to_string()),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        let op = prop_oneof![
            Just("+"),
            Just("-"),
            Just("*"),
            Just("/"),
            Just("=="),
            Just("<"),
            Just("and"),
            Just("||"),
            Just("?"),
        ];
        prop_oneof![
            (inner.clone(), op, inner.clone()).prop_map(|(a, op, b)| format!("{a} {op} {b}")),
            inner.clone().prop_map(|a| format!("({a})")),
            inner.clone().prop_map(|a| format!("-{a}")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("MIN({a}, {b})")),
            (inner.clone(), inner).prop_map(|(a, b)| format!("MAX({a}, {b})")),
        ]
    })
}

proptest! {
    #[test]
    fn reorder_keeps_every_non_grouping_token_once(source in expression()) {
        let tokens = lexer::tokenize(&source, &NoSymbols).unwrap();
        let postfix = to_postfix(&tokens).unwrap();

        let expected = tokens
            .iter()
            .filter(|t| !matches!(t, Token::Punct(_)))
            .count();
        prop_assert_eq!(postfix.len(), expected);

        let unique: HashSet<_> = postfix.iter().collect();
        prop_assert_eq!(unique.len(), postfix.len());
        prop_assert!(postfix
            .iter()
            .all(|&i| !matches!(tokens[i], Token::Punct(Punct::Open | Punct::Close | Punct::Comma))));
    }
}
