//! Functions built into the runtime.

use plume_core::{BinaryOp, List, Value};

use crate::error::{ExprError, ExprResult};
use crate::host::EvalHost;

/// A builtin function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `RANDOM(min, max)`: uniform integer in `min..=max`.
    Random,
    /// `SEED_RANDOM(seed)`: reseed the story RNG.
    SeedRandom,
    /// `INT(x)`
    Int,
    /// `FLOAT(x)`
    Float,
    /// `FLOOR(x)`
    Floor,
    /// `CEILING(x)`
    Ceiling,
    /// `POW(a, b)`
    Pow,
    /// `MIN(a, b)`
    Min,
    /// `MAX(a, b)`
    Max,
    /// `TURNS()`: number of choices taken so far.
    Turns,
    /// `TURNS_SINCE(-> path)`: turns since the section was last visited, or -1.
    TurnsSince,
    /// `READ_COUNT(-> path)`
    ReadCount,
    /// `CHOICE_COUNT()`: choices gathered so far this turn.
    ChoiceCount,
    /// `LIST_COUNT(list)`
    ListCount,
    /// `LIST_MIN(list)`
    ListMin,
    /// `LIST_MAX(list)`
    ListMax,
    /// `LIST_ALL(list)`
    ListAll,
    /// `LIST_INVERT(list)`
    ListInvert,
    /// `LIST_RANGE(list, min, max)`
    ListRange,
    /// `LIST_VALUE(list)`
    ListValue,
    /// `LIST_RANDOM(list)`
    ListRandom,
}

const BUILTINS: &[(&str, Builtin)] = &[
    ("RANDOM", Builtin::Random),
    ("SEED_RANDOM", Builtin::SeedRandom),
    ("INT", Builtin::Int),
    ("FLOAT", Builtin::Float),
    ("FLOOR", Builtin::Floor),
    ("CEILING", Builtin::Ceiling),
    ("POW", Builtin::Pow),
    ("MIN", Builtin::Min),
    ("MAX", Builtin::Max),
    ("TURNS", Builtin::Turns),
    ("TURNS_SINCE", Builtin::TurnsSince),
    ("READ_COUNT", Builtin::ReadCount),
    ("CHOICE_COUNT", Builtin::ChoiceCount),
    ("LIST_COUNT", Builtin::ListCount),
    ("LIST_MIN", Builtin::ListMin),
    ("LIST_MAX", Builtin::ListMax),
    ("LIST_ALL", Builtin::ListAll),
    ("LIST_INVERT", Builtin::ListInvert),
    ("LIST_RANGE", Builtin::ListRange),
    ("LIST_VALUE", Builtin::ListValue),
    ("LIST_RANDOM", Builtin::ListRandom),
];

impl Builtin {
    /// Look up a builtin by its source name.
    pub fn from_name(name: &str) -> Option<Self> {
        BUILTINS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, builtin)| *builtin)
    }

    /// The source name.
    pub fn name(self) -> &'static str {
        BUILTINS
            .iter()
            .find(|(_, b)| *b == self)
            .map(|(n, _)| *n)
            .unwrap_or("?")
    }

    /// Number of arguments the builtin takes.
    pub fn arity(self) -> usize {
        match self {
            Builtin::Turns | Builtin::ChoiceCount => 0,
            Builtin::Random | Builtin::Pow | Builtin::Min | Builtin::Max => 2,
            Builtin::ListRange => 3,
            _ => 1,
        }
    }

    /// Call the builtin with already-resolved arguments.
    pub fn call(self, args: &[Value], host: &mut dyn EvalHost) -> ExprResult<Option<Value>> {
        if args.len() != self.arity() {
            return Err(ExprError::WrongArity {
                function: self.name().to_string(),
                expected: self.arity(),
                found: args.len(),
            });
        }

        let value = match self {
            Builtin::Random => {
                let min = self.int_arg(&args[0])?;
                let max = self.int_arg(&args[1])?;
                if min > max {
                    return Err(self.invalid(format!("empty range {min}..={max}")));
                }
                Value::Int(host.random(min, max))
            }
            Builtin::SeedRandom => {
                let seed = self.int_arg(&args[0])?;
                host.seed_random(seed as u64);
                return Ok(None);
            }
            Builtin::Int => match &args[0] {
                Value::String(s) => Value::Int(
                    s.trim()
                        .parse::<f64>()
                        .map_err(|_| self.invalid(format!("not a number: {s:?}")))?
                        as i64,
                ),
                other => Value::Int(self.int_arg(other)?),
            },
            Builtin::Float => match &args[0] {
                Value::String(s) => Value::Float(
                    s.trim()
                        .parse::<f64>()
                        .map_err(|_| self.invalid(format!("not a number: {s:?}")))?,
                ),
                other => Value::Float(self.float_arg(other)?),
            },
            Builtin::Floor | Builtin::Ceiling => match &args[0] {
                Value::Float(n) if self == Builtin::Floor => Value::Float(n.floor()),
                Value::Float(n) => Value::Float(n.ceil()),
                other => Value::Int(self.int_arg(other)?),
            },
            Builtin::Pow => {
                let base = self.float_arg(&args[0])?;
                let exponent = self.float_arg(&args[1])?;
                Value::Float(base.powf(exponent))
            }
            Builtin::Min | Builtin::Max => {
                let (a, b) = (&args[0], &args[1]);
                let a_less = Value::apply(BinaryOp::Less, a, b, host.variables().lists())?
                    .is_some_and(|v| v.is_truthy());
                let pick_a = if self == Builtin::Min { a_less } else { !a_less };
                if pick_a { a.clone() } else { b.clone() }
            }
            Builtin::Turns => Value::Int(host.turn_index()),
            Builtin::TurnsSince => {
                let path = self.path_arg(&args[0])?;
                let turns = host
                    .turns_since(&path)
                    .ok_or_else(|| self.invalid(format!("unknown section: {path}")))?;
                Value::Int(turns)
            }
            Builtin::ReadCount => match &args[0] {
                Value::Int(n) => Value::Int(*n),
                other => {
                    let path = self.path_arg(other)?;
                    let count = host
                        .read_count(&path)
                        .ok_or_else(|| self.invalid(format!("unknown section: {path}")))?;
                    Value::Int(count)
                }
            },
            Builtin::ChoiceCount => Value::Int(host.choice_count()),
            Builtin::ListCount => Value::Int(self.list_arg(&args[0])?.len() as i64),
            Builtin::ListMin => Value::List(self.list_arg(&args[0])?.min_list()),
            Builtin::ListMax => Value::List(self.list_arg(&args[0])?.max_list()),
            Builtin::ListAll => {
                let list = self.list_arg(&args[0])?;
                Value::List(list.all_possible_items(host.variables().lists())?)
            }
            Builtin::ListInvert => {
                let list = self.list_arg(&args[0])?;
                Value::List(list.inverse(host.variables().lists())?)
            }
            Builtin::ListRange => {
                let list = self.list_arg(&args[0])?;
                let min = self.int_arg(&args[1])?;
                let max = self.int_arg(&args[2])?;
                Value::List(list.range(min, max))
            }
            Builtin::ListValue => Value::Int(self.list_arg(&args[0])?.value()),
            Builtin::ListRandom => {
                let list = self.list_arg(&args[0])?;
                if list.is_empty() {
                    Value::List(list.clone())
                } else {
                    let index = host.random(0, list.len() as i64 - 1) as usize;
                    let item = list.items().nth(index).cloned();
                    Value::List(item.map(List::from_item).unwrap_or_default())
                }
            }
        };
        Ok(Some(value))
    }

    fn invalid(self, message: String) -> ExprError {
        ExprError::InvalidArgument {
            function: self.name().to_string(),
            message,
        }
    }

    fn int_arg(self, value: &Value) -> ExprResult<i64> {
        value
            .as_int()
            .ok_or_else(|| self.invalid(format!("expected a number, got {}", value.kind())))
    }

    fn float_arg(self, value: &Value) -> ExprResult<f64> {
        value
            .as_float()
            .ok_or_else(|| self.invalid(format!("expected a number, got {}", value.kind())))
    }

    fn list_arg(self, value: &Value) -> ExprResult<&List> {
        value
            .as_list()
            .ok_or_else(|| self.invalid(format!("expected a list, got {}", value.kind())))
    }

    fn path_arg(self, value: &Value) -> ExprResult<String> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.invalid(format!("expected a section path, got {}", value.kind())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Sandbox;

    fn call(builtin: Builtin, args: &[Value]) -> Option<Value> {
        builtin.call(args, &mut Sandbox::new(7)).unwrap()
    }

    #[test]
    fn names_round_trip() {
        for (name, builtin) in BUILTINS {
            assert_eq!(Builtin::from_name(name), Some(*builtin));
            assert_eq!(builtin.name(), *name);
        }
        assert_eq!(Builtin::from_name("random"), None);
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(call(Builtin::Int, &[Value::Float(3.9)]), Some(Value::Int(3)));
        assert_eq!(call(Builtin::Float, &[Value::Int(2)]), Some(Value::Float(2.0)));
        assert_eq!(call(Builtin::Floor, &[Value::Float(1.5)]), Some(Value::Float(1.0)));
        assert_eq!(call(Builtin::Ceiling, &[Value::Float(1.5)]), Some(Value::Float(2.0)));
        assert_eq!(call(Builtin::Pow, &[Value::Int(2), Value::Int(10)]), Some(Value::Float(1024.0)));
    }

    #[test]
    fn min_and_max() {
        let args = [Value::Int(3), Value::Float(2.5)];
        assert_eq!(call(Builtin::Min, &args), Some(Value::Float(2.5)));
        assert_eq!(call(Builtin::Max, &args), Some(Value::Int(3)));
    }

    #[test]
    fn random_stays_in_range() {
        let mut host = Sandbox::new(1);
        for _ in 0..50 {
            let value = Builtin::Random
                .call(&[Value::Int(1), Value::Int(6)], &mut host)
                .unwrap()
                .and_then(|v| v.as_int())
                .unwrap();
            assert!((1..=6).contains(&value));
        }
    }

    #[test]
    fn random_rejects_empty_range() {
        let result = Builtin::Random.call(&[Value::Int(6), Value::Int(1)], &mut Sandbox::new(1));
        assert!(matches!(result, Err(ExprError::InvalidArgument { .. })));
    }

    #[test]
    fn wrong_arity() {
        let result = Builtin::Min.call(&[Value::Int(1)], &mut Sandbox::new(1));
        assert!(matches!(
            result,
            Err(ExprError::WrongArity {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }
}
