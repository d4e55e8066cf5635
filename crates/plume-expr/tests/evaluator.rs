//! Integration tests: evaluator.

use plume_core::Value;
use plume_expr::{
    EvalHost, ExprError, Expression, Fixity, NoSymbols, Operator, Sandbox, Token, lexer,
};

fn eval(source: &str) -> Option<Value> {
    Sandbox::new(42).eval(source).unwrap()
}

#[test]
fn arithmetic_is_deterministic() {
    assert_eq!(eval("5 + 7"), Some(Value::Int(12)));
    assert_eq!(eval("5 + 7 * 52 - 8"), Some(Value::Int(361)));
    assert_eq!(eval("(5*5)-(3*3)+3"), Some(Value::Int(19)));

    let Some(Value::Float(f)) = eval("5.0 - 4.2 - 3.7 / 2.5") else {
        panic!("expected a float");
    };
    assert!((f - -0.68).abs() < 1e-4, "got {f}");
}

#[test]
fn strings_concatenate_and_contain() {
    assert_eq!(eval(r#""a" + "b""#), Some(Value::from("ab")));
    assert_eq!(eval(r#""hello" ? "llo""#), Some(Value::Bool(true)));
    assert_eq!(eval(r#""hello" hasnt "z""#), Some(Value::Bool(true)));
}

#[test]
fn assignment_scenario() {
    let tokens = lexer::tokenize("x = 5 + 7", &NoSymbols).unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::Variable("x".to_string()),
            Token::Operator(Operator::Assign, Fixity::Infix),
            Token::Int(5),
            Token::Operator(Operator::Add, Fixity::Infix),
            Token::Int(7),
        ]
    );

    let mut host = Sandbox::new(0);
    assert_eq!(host.eval("x = 5 + 7").unwrap(), None);
    assert_eq!(host.variables().get("x"), Some(&Value::Int(12)));
}

#[test]
fn compound_assignment_and_increment() {
    let mut host = Sandbox::new(0);
    host.eval("gold = 10").unwrap();
    host.eval("gold += 5").unwrap();
    host.eval("gold -= 2").unwrap();
    assert_eq!(host.eval("gold++").unwrap(), Some(Value::Int(14)));
    assert_eq!(host.variables().get("gold"), Some(&Value::Int(14)));
    assert_eq!(host.eval("-gold").unwrap(), Some(Value::Int(-14)));
}

#[test]
fn temp_declares_in_innermost_scope() {
    let mut host = Sandbox::new(0);
    host.variables_mut().push_scope();
    host.eval("temp t = 3").unwrap();
    assert_eq!(host.variables().get("t"), Some(&Value::Int(3)));
    assert!(!host.variables().has_global("t"));
    host.variables_mut().pop_scope();
    assert_eq!(host.variables().get("t"), None);
}

#[test]
fn return_keyword_flags_evaluation() {
    let mut host = Sandbox::new(0);
    let expr = Expression::parse("return 2 * 3", &NoSymbols).unwrap();
    let result = expr.evaluate(&mut host).unwrap();
    assert!(result.returned);
    assert_eq!(result.value, Some(Value::Int(6)));

    let bare = Expression::parse("return", &NoSymbols).unwrap();
    let result = bare.evaluate(&mut host).unwrap();
    assert!(result.returned);
    assert_eq!(result.value, None);
}

#[test]
fn assignment_to_non_variable_fails() {
    let result = Sandbox::new(0).eval("3 = 4");
    assert!(matches!(result, Err(ExprError::AssignToNonVariable)));
}

#[test]
fn assignment_to_constant_fails() {
    let mut host = Sandbox::new(0);
    host.variables_mut().define_constant("LIMIT", Value::Int(3));
    assert!(matches!(
        host.eval("LIMIT = 4"),
        Err(ExprError::AssignToConstant(_))
    ));
    assert_eq!(host.eval("LIMIT * 2").unwrap(), Some(Value::Int(6)));
}

#[test]
fn cross_kind_arithmetic_fails_but_comparison_degrades() {
    assert!(matches!(
        Sandbox::new(0).eval(r#""a" * 2"#),
        Err(ExprError::TypeMismatch { .. })
    ));
    assert_eq!(eval(r#""abc" == 3"#), Some(Value::Bool(false)));
    assert_eq!(eval("undefined_thing == 3"), None);
    assert_eq!(eval("not undefined_thing"), Some(Value::Bool(true)));
}

#[test]
fn undefined_variable_in_arithmetic_fails() {
    assert!(matches!(
        Sandbox::new(0).eval("ghost + 1"),
        Err(ExprError::UndefinedVariable(name)) if name == "ghost"
    ));
}

#[test]
fn unknown_function_fails() {
    assert!(matches!(
        Sandbox::new(0).eval("mystery(1)"),
        Err(ExprError::UnknownFunction(name)) if name == "mystery"
    ));
}

#[test]
fn external_functions_receive_arguments_in_order() {
    let mut host = Sandbox::new(0);
    host.bind_external("concat", |args: &[Value]| {
        Some(Value::String(
            args.iter().map(ToString::to_string).collect::<Vec<_>>().join("-"),
        ))
    });
    assert_eq!(
        host.eval(r#"concat(1, "two", 3.5)"#).unwrap(),
        Some(Value::from("1-two-3.5"))
    );
}

#[test]
fn lists_through_expressions() {
    let mut host = Sandbox::new(0);
    host.variables_mut()
        .lists_mut()
        .define("Door", [("closed", 1), ("ajar", 2), ("open", 3)])
        .unwrap();
    host.eval("door = Door.closed").unwrap();
    host.eval("door = door + 1").unwrap();
    assert_eq!(host.eval("door").unwrap().map(|v| v.to_string()), Some("ajar".to_string()));
    assert_eq!(host.eval("door has ajar").unwrap(), Some(Value::Bool(true)));
    assert_eq!(host.eval("LIST_VALUE(door)").unwrap(), Some(Value::Int(2)));
    assert_eq!(
        host.eval("LIST_INVERT(door)").unwrap().map(|v| v.to_string()),
        Some("closed, open".to_string())
    );
    assert_eq!(
        host.eval("Door(3)").unwrap().map(|v| v.to_string()),
        Some("open".to_string())
    );
    assert_eq!(host.eval("LIST_COUNT(())").unwrap(), Some(Value::Int(0)));
}

#[test]
fn logic_operators_short_forms() {
    assert_eq!(eval("1 < 2 and 3 > 4"), Some(Value::Bool(false)));
    assert_eq!(eval("1 < 2 || 3 > 4"), Some(Value::Bool(true)));
    assert_eq!(eval("7 mod 3"), Some(Value::Int(1)));
    assert_eq!(eval("1 << 4 | 1"), Some(Value::Int(17)));
}

#[test]
fn seeded_random_is_reproducible() {
    let roll = |seed: u64| {
        let mut host = Sandbox::new(0);
        host.eval(&format!("SEED_RANDOM({seed})")).unwrap();
        (0..5)
            .map(|_| host.eval("RANDOM(1, 100)").unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(roll(9), roll(9));
}
