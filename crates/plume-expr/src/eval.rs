//! The postfix stack machine.

use plume_core::{BinaryOp, List, UnaryOp, Value};
use tracing::trace;

use crate::error::{ExprError, ExprResult};
use crate::host::{Argument, EvalHost};
use crate::token::{FetchKind, Fixity, FunctionRef, Keyword, Operator, Token};

/// Outcome of evaluating an expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// The expression's value. Assignments and calls that return nothing
    /// produce `None`.
    pub value: Option<Value>,
    /// Whether a `return` keyword was executed.
    pub returned: bool,
}

/// An entry on the operand stack.
#[derive(Debug, Clone)]
enum Operand {
    Value(Value),
    /// A variable reference, fetched when an operator reads it.
    Variable(String),
    /// A section path written after `->`.
    Path(String),
    /// The "no value" result of a tolerant comparison or a void call.
    Absent,
}

struct Machine<'h> {
    host: &'h mut dyn EvalHost,
    stack: Vec<Operand>,
    temp_mode: bool,
    returned: Option<Option<Value>>,
}

/// Execute `postfix` (indices into `tokens`) against `host`.
pub fn evaluate(
    tokens: &[Token],
    postfix: &[usize],
    host: &mut dyn EvalHost,
) -> ExprResult<Evaluation> {
    let temp_mode = tokens
        .iter()
        .any(|t| matches!(t, Token::Keyword(Keyword::Temp)));
    let mut machine = Machine {
        host,
        stack: Vec::new(),
        temp_mode,
        returned: None,
    };

    for &index in postfix {
        let token = tokens.get(index).ok_or(ExprError::StackUnderflow)?;
        machine.step(token)?;
    }

    if let Some(value) = machine.returned.take() {
        return Ok(Evaluation {
            value,
            returned: true,
        });
    }
    let value = match machine.stack.pop() {
        Some(operand) => machine.resolve(&operand),
        None => None,
    };
    Ok(Evaluation {
        value,
        returned: false,
    })
}

impl Machine<'_> {
    fn step(&mut self, token: &Token) -> ExprResult<()> {
        trace!(token = %token, depth = self.stack.len(), "eval step");
        match token {
            Token::Bool(b) => self.push(Value::Bool(*b)),
            Token::Int(n) => self.push(Value::Int(*n)),
            Token::Float(n) => self.push(Value::Float(*n)),
            Token::Str(s) => self.push(Value::String(s.clone())),
            Token::List(l) => self.push(Value::List(l.clone())),
            Token::Path(p) => self.stack.push(Operand::Path(p.clone())),
            Token::Variable(name) => self.stack.push(Operand::Variable(name.clone())),
            Token::Keyword(Keyword::Temp) => {}
            Token::Keyword(Keyword::Return) => {
                let value = match self.stack.pop() {
                    Some(operand) => self.resolve(&operand),
                    None => None,
                };
                self.returned = Some(value);
            }
            Token::Operator(op, fixity) => self.operator(*op, *fixity)?,
            Token::Function(func) => self.call(func)?,
            Token::Punct(_) => {}
        }
        Ok(())
    }

    fn push(&mut self, value: Value) {
        self.stack.push(Operand::Value(value));
    }

    fn pop(&mut self) -> ExprResult<Operand> {
        self.stack.pop().ok_or(ExprError::StackUnderflow)
    }

    /// Fetch an operand's value: store first, then list items, then
    /// section read counts.
    fn resolve(&self, operand: &Operand) -> Option<Value> {
        match operand {
            Operand::Value(v) => Some(v.clone()),
            Operand::Variable(name) => self.fetch(name),
            Operand::Path(path) => Some(Value::String(path.clone())),
            Operand::Absent => None,
        }
    }

    fn fetch(&self, name: &str) -> Option<Value> {
        let store = self.host.variables();
        if let Some(value) = store.get(name) {
            return Some(value.clone());
        }
        if let Some(item) = store.lists().find_item(name) {
            return Some(Value::List(List::from_item(item)));
        }
        self.host.read_count(name).map(Value::Int)
    }

    /// Like [`Self::resolve`], but a missing value is an error.
    fn require(&self, operand: &Operand, op: &'static str) -> ExprResult<Value> {
        self.resolve(operand)
            .ok_or_else(|| self.missing(operand, op))
    }

    fn operator(&mut self, op: Operator, fixity: Fixity) -> ExprResult<()> {
        if op.is_assignment() {
            return self.assign(op);
        }
        match fixity {
            Fixity::Infix => self.binary(op),
            Fixity::Prefix | Fixity::Postfix => self.unary(op),
        }
    }

    fn missing(&self, operand: &Operand, op: &'static str) -> ExprError {
        match operand {
            Operand::Variable(name) => ExprError::UndefinedVariable(name.clone()),
            _ => ExprError::MissingValue(op),
        }
    }

    fn binary(&mut self, op: Operator) -> ExprResult<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let binary = op.binary().ok_or(ExprError::MissingValue(op.symbol()))?;
        let logical = matches!(binary, BinaryOp::And | BinaryOp::Or);

        let (l, r) = match (self.resolve(&lhs), self.resolve(&rhs)) {
            (Some(l), Some(r)) => (l, r),
            (l, r) if logical => {
                let l = l.is_some_and(|v| v.is_truthy());
                let r = r.is_some_and(|v| v.is_truthy());
                let result = if binary == BinaryOp::And { l && r } else { l || r };
                self.push(Value::Bool(result));
                return Ok(());
            }
            _ if binary.is_comparison() => {
                self.stack.push(Operand::Absent);
                return Ok(());
            }
            (None, _) => return Err(self.missing(&lhs, op.symbol())),
            (_, None) => return Err(self.missing(&rhs, op.symbol())),
        };

        match Value::apply(binary, &l, &r, self.host.variables().lists())? {
            Some(value) => self.push(value),
            None if binary.is_comparison() => self.stack.push(Operand::Absent),
            None => {
                return Err(ExprError::TypeMismatch {
                    op: binary.symbol(),
                    lhs: l.kind(),
                    rhs: r.kind(),
                });
            }
        }
        Ok(())
    }

    fn unary(&mut self, op: Operator) -> ExprResult<()> {
        let operand = self.pop()?;
        let unary = op.unary().ok_or(ExprError::MissingValue(op.symbol()))?;
        let value = match self.resolve(&operand) {
            Some(value) => value,
            None if unary == UnaryOp::Not => {
                self.push(Value::Bool(true));
                return Ok(());
            }
            None => return Err(self.missing(&operand, op.symbol())),
        };

        let result = Value::apply_unary(unary, &value, self.host.variables().lists())?.ok_or(
            ExprError::UnaryTypeMismatch {
                op: unary.symbol(),
                operand: value.kind(),
            },
        )?;
        if matches!(unary, UnaryOp::Increment | UnaryOp::Decrement) {
            if let Operand::Variable(name) = &operand {
                self.host.variables_mut().set(name, result.clone())?;
            }
        }
        self.push(result);
        Ok(())
    }

    fn assign(&mut self, op: Operator) -> ExprResult<()> {
        let rhs = self.pop()?;
        let Operand::Variable(name) = self.pop()? else {
            return Err(ExprError::AssignToNonVariable);
        };
        let mut value = self.require(&rhs, op.symbol())?;

        if let Some(binary) = op.binary() {
            let current = self.require(&Operand::Variable(name.clone()), op.symbol())?;
            value = Value::apply(binary, &current, &value, self.host.variables().lists())?
                .ok_or(ExprError::TypeMismatch {
                    op: op.symbol(),
                    lhs: current.kind(),
                    rhs: value.kind(),
                })?;
        }

        trace!(variable = %name, value = %value, temp = self.temp_mode, "assign");
        if self.temp_mode && op == Operator::Assign {
            self.host.variables_mut().declare_temporary(&name, value);
            Ok(())
        } else {
            self.host.variables_mut().set(&name, value)
        }
    }

    /// Resolve an argument operand for `function`.
    fn argument(&self, operand: &Operand, function: &str) -> ExprResult<Value> {
        self.resolve(operand).ok_or_else(|| match operand {
            Operand::Variable(name) => ExprError::UndefinedVariable(name.clone()),
            _ => ExprError::InvalidArgument {
                function: function.to_string(),
                message: "argument has no value".to_string(),
            },
        })
    }

    fn arguments(&self, operands: &[Operand], function: &str) -> ExprResult<Vec<Value>> {
        operands
            .iter()
            .map(|operand| self.argument(operand, function))
            .collect()
    }

    /// Decide at evaluation time how to dispatch a function the tokenizer
    /// could not classify.
    fn resolve_kind(&self, name: &str) -> ExprResult<FetchKind> {
        if self.host.is_story_function(name) {
            Ok(FetchKind::StorySection)
        } else if self.host.variables().lists().contains_name(name) {
            Ok(FetchKind::ListSubscript)
        } else if self.host.is_external_function(name) {
            Ok(FetchKind::External)
        } else {
            Err(ExprError::UnknownFunction(name.to_string()))
        }
    }

    fn call(&mut self, func: &FunctionRef) -> ExprResult<()> {
        let mut operands = Vec::with_capacity(func.arity);
        for _ in 0..func.arity {
            operands.push(self.pop()?);
        }
        operands.reverse();

        let kind = match func.kind {
            FetchKind::Unresolved => self.resolve_kind(&func.name)?,
            kind => kind,
        };
        let result = match kind {
            FetchKind::Builtin(builtin) => {
                let args = self.arguments(&operands, &func.name)?;
                builtin.call(&args, &mut *self.host)?
            }
            FetchKind::External => {
                let args = self.arguments(&operands, &func.name)?;
                self.host.call_external(&func.name, &args)?
            }
            FetchKind::StorySection => {
                let args = operands
                    .iter()
                    .map(|operand| {
                        Ok(Argument {
                            value: self.argument(operand, &func.name)?,
                            variable: match operand {
                                Operand::Variable(name) => Some(name.clone()),
                                _ => None,
                            },
                        })
                    })
                    .collect::<ExprResult<Vec<_>>>()?;
                trace!(function = %func.name, args = args.len(), "calling story function");
                self.host.call_story_function(&func.name, args)?
            }
            FetchKind::ListSubscript => {
                let args = self.arguments(&operands, &func.name)?;
                let [index] = args.as_slice() else {
                    return Err(ExprError::WrongArity {
                        function: func.name.clone(),
                        expected: 1,
                        found: args.len(),
                    });
                };
                let value = index.as_int().ok_or_else(|| ExprError::InvalidArgument {
                    function: func.name.clone(),
                    message: format!("expected a number, got {}", index.kind()),
                })?;
                let list = self.host.variables().lists().item_by_value(&func.name, value)?;
                Some(Value::List(list))
            }
            FetchKind::Unresolved => return Err(ExprError::UnknownFunction(func.name.clone())),
        };

        match result {
            Some(value) => self.push(value),
            None => self.stack.push(Operand::Absent),
        }
        Ok(())
    }
}
