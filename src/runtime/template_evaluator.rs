use crate::error::{Error, Result};
use crate::parser::{BinaryOp, Expression, Program, Statement, UnaryOp};
use crate::runtime::{Environment, Value};

/// Builtin that appends literal text run `n` to the output
pub const EMIT_TEXT: &str = "__emit_text";

/// Builtin that appends the value of its argument to the output
pub const EMIT_VALUE: &str = "__emit_value";

/// Default loop iteration budget for one evaluation
pub const DEFAULT_ITERATION_LIMIT: usize = 1_000_000;

/// How a statement finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Tree-walking evaluator for synthesized template programs
///
/// Literal text runs live in a side table and are appended by
/// `__emit_text(n)`, so the program itself never has to quote source text.
/// The only side effect available to template code is appending to the
/// output buffer.
pub struct TemplateEvaluator {
    /// Variable environment
    env: Environment,
    /// Literal text runs referenced by `__emit_text`
    literals: Vec<String>,
    /// Output buffer
    output: String,
    /// Total loop iterations allowed across the whole evaluation
    iteration_limit: usize,
    /// Loop iterations used so far
    iterations: usize,
}

impl TemplateEvaluator {
    /// Creates an evaluator over the given literal table
    pub fn new(literals: Vec<String>) -> Self {
        TemplateEvaluator {
            env: Environment::new(),
            literals,
            output: String::new(),
            iteration_limit: DEFAULT_ITERATION_LIMIT,
            iterations: 0,
        }
    }

    /// Sets the loop iteration budget
    pub fn with_iteration_limit(mut self, limit: usize) -> Self {
        self.iteration_limit = limit;
        self
    }

    /// Runs the program once, top to bottom, and returns the output buffer
    pub fn execute(mut self, program: &Program) -> Result<String> {
        for statement in &program.statements {
            match self.execute_statement(statement)? {
                Flow::Normal => {}
                Flow::Break => return Err(Error::InvalidBreak),
                Flow::Continue => return Err(Error::InvalidContinue),
            }
        }
        Ok(self.output)
    }

    fn execute_statement(&mut self, stmt: &Statement) -> Result<Flow> {
        match stmt {
            Statement::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Flow::Normal)
            }

            Statement::Declaration { name, value } => {
                let val = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Unset,
                };
                self.env.define(name.clone(), val);
                Ok(Flow::Normal)
            }

            Statement::Block(statements) => {
                self.env.enter_scope();
                let mut flow = Flow::Normal;
                for statement in statements {
                    flow = self.execute_statement(statement)?;
                    if flow != Flow::Normal {
                        break;
                    }
                }
                self.env.exit_scope();
                Ok(flow)
            }

            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute_statement(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute_statement(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }

            Statement::While { condition, body } => {
                loop {
                    self.tick()?;
                    if !self.evaluate(condition)?.is_truthy() {
                        break;
                    }
                    if self.execute_statement(body)? == Flow::Break {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }

            Statement::For {
                init,
                condition,
                step,
                body,
            } => {
                self.env.enter_scope();
                if let Some(init) = init {
                    self.execute_statement(init)?;
                }
                loop {
                    self.tick()?;
                    if let Some(condition) = condition {
                        if !self.evaluate(condition)?.is_truthy() {
                            break;
                        }
                    }
                    if self.execute_statement(body)? == Flow::Break {
                        break;
                    }
                    if let Some(step) = step {
                        self.evaluate(step)?;
                    }
                }
                self.env.exit_scope();
                Ok(Flow::Normal)
            }

            Statement::Break => Ok(Flow::Break),
            Statement::Continue => Ok(Flow::Continue),
            Statement::Empty => Ok(Flow::Normal),
        }
    }

    fn tick(&mut self) -> Result<()> {
        self.iterations += 1;
        if self.iterations > self.iteration_limit {
            return Err(Error::TooManyIterations {
                limit: self.iteration_limit,
            });
        }
        Ok(())
    }

    fn evaluate(&mut self, expr: &Expression) -> Result<Value> {
        match expr {
            Expression::IntLiteral(n) => Ok(Value::Int(*n)),
            Expression::FloatLiteral(f) => Ok(Value::Float(*f)),
            Expression::StringLiteral(s) => Ok(Value::String(s.clone())),
            Expression::BoolLiteral(b) => Ok(Value::Bool(*b)),
            Expression::Variable(name) => self.env.get(name),

            Expression::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    if !self.evaluate(left)?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(self.evaluate(right)?.is_truthy()))
                }
                BinaryOp::Or => {
                    if self.evaluate(left)?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(self.evaluate(right)?.is_truthy()))
                }
                _ => {
                    let l = self.evaluate(left)?;
                    let r = self.evaluate(right)?;
                    apply_binary(*op, &l, &r)
                }
            },

            Expression::Unary { op, operand } => {
                let val = self.evaluate(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!val.is_truthy())),
                    UnaryOp::Neg => match val {
                        Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(Error::TypeError {
                            expected: "number".to_string(),
                            got: other.type_name(),
                        }),
                    },
                    UnaryOp::BitNot => Ok(Value::Int(!integer_operand(&val)?)),
                }
            }

            Expression::Assign { name, op, value } => {
                let rhs = self.evaluate(value)?;
                let new_value = match op {
                    None => rhs,
                    Some(op) => {
                        let current = self.env.get(name)?;
                        apply_binary(*op, &current, &rhs)?
                    }
                };
                self.env.set(name, new_value.clone());
                Ok(new_value)
            }

            Expression::Increment {
                name,
                delta,
                prefix,
            } => {
                let current = self.env.get(name)?;
                let updated = match current {
                    Value::Int(n) => Value::Int(n.wrapping_add(*delta)),
                    Value::Float(f) => Value::Float(f + *delta as f64),
                    ref other => {
                        return Err(Error::TypeError {
                            expected: "number".to_string(),
                            got: other.type_name(),
                        })
                    }
                };
                self.env.set(name, updated.clone());
                Ok(if *prefix { updated } else { current })
            }

            Expression::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then_expr)
                } else {
                    self.evaluate(else_expr)
                }
            }

            Expression::Call { name, args } => self.call(name, args),
        }
    }

    fn call(&mut self, name: &str, args: &[Expression]) -> Result<Value> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.evaluate(arg)?);
        }

        match name {
            EMIT_TEXT => {
                let index = single_arg(name, &values)?.as_int()?;
                let text = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.literals.get(i))
                    .ok_or_else(|| Error::InvalidArguments {
                        function: name.to_string(),
                        reason: format!("no literal text run {}", index),
                    })?;
                self.output.push_str(text);
                Ok(Value::Unset)
            }
            EMIT_VALUE => {
                let value = single_arg(name, &values)?;
                self.output.push_str(&value.to_string());
                Ok(Value::Unset)
            }
            "min" | "max" => {
                if values.len() != 2 {
                    return Err(Error::InvalidArguments {
                        function: name.to_string(),
                        reason: format!("expected 2 arguments, got {}", values.len()),
                    });
                }
                let less = apply_binary(BinaryOp::Lt, &values[0], &values[1])?.is_truthy();
                let pick_first = if name == "min" { less } else { !less };
                Ok(if pick_first {
                    values[0].clone()
                } else {
                    values[1].clone()
                })
            }
            "abs" => match single_arg(name, &values)? {
                Value::Int(n) => Ok(Value::Int(n.wrapping_abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(Error::TypeError {
                    expected: "number".to_string(),
                    got: other.type_name(),
                }),
            },
            "hex" => {
                let n = integer_operand(single_arg(name, &values)?)?;
                Ok(Value::String(format!("{:x}", n)))
            }
            "str" => Ok(Value::String(single_arg(name, &values)?.to_string())),
            _ => Err(Error::UnknownFunction {
                name: name.to_string(),
            }),
        }
    }
}

fn single_arg<'a>(function: &str, values: &'a [Value]) -> Result<&'a Value> {
    match values {
        [value] => Ok(value),
        _ => Err(Error::InvalidArguments {
            function: function.to_string(),
            reason: format!("expected 1 argument, got {}", values.len()),
        }),
    }
}

fn integer_operand(value: &Value) -> Result<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(Error::TypeError {
            expected: "int".to_string(),
            got: other.type_name(),
        }),
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    if op == BinaryOp::Add
        && (matches!(left, Value::String(_)) || matches!(right, Value::String(_)))
    {
        return Ok(Value::String(format!("{}{}", left, right)));
    }

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, left, right)
        }
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            let l = integer_operand(left)?;
            let r = integer_operand(right)?;
            Ok(Value::Int(match op {
                BinaryOp::Shl => l.wrapping_shl(r as u32),
                BinaryOp::Shr => l.wrapping_shr(r as u32),
                BinaryOp::BitAnd => l & r,
                BinaryOp::BitOr => l | r,
                _ => l ^ r,
            }))
        }
        BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::NotEq => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = compare(left, right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => {
            let (l, r) = (*l, *r);
            Ok(Value::Int(match op {
                BinaryOp::Add => l.wrapping_add(r),
                BinaryOp::Sub => l.wrapping_sub(r),
                BinaryOp::Mul => l.wrapping_mul(r),
                BinaryOp::Div => {
                    if r == 0 {
                        return Err(Error::DivisionByZero);
                    }
                    l.wrapping_div(r)
                }
                _ => {
                    if r == 0 {
                        return Err(Error::DivisionByZero);
                    }
                    l.wrapping_rem(r)
                }
            }))
        }
        (l, r) if l.is_numeric() && r.is_numeric() => {
            let (l, r) = (l.as_float()?, r.as_float()?);
            Ok(Value::Float(match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                _ => l % r,
            }))
        }
        (l, r) => Err(Error::TypeError {
            expected: "number".to_string(),
            got: if l.is_numeric() {
                r.type_name()
            } else {
                l.type_name()
            },
        }),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => l == r,
        (l, r) if l.is_numeric() && r.is_numeric() => {
            l.as_float().ok() == r.as_float().ok()
        }
        (l, r) => l == r,
    }
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => Ok(l.cmp(r)),
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        (l, r) if l.is_numeric() && r.is_numeric() => {
            let (l, r) = (l.as_float()?, r.as_float()?);
            l.partial_cmp(&r).ok_or_else(|| Error::TypeError {
                expected: "comparable number".to_string(),
                got: "NaN".to_string(),
            })
        }
        (l, r) => Err(Error::TypeError {
            expected: l.type_name(),
            got: r.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TemplateScanner;
    use crate::parser::TemplateParser;

    fn run(source: &str, literals: &[&str]) -> Result<String> {
        let tokens = TemplateScanner::new(source).scan_tokens()?;
        let program = TemplateParser::new(tokens).parse()?;
        TemplateEvaluator::new(literals.iter().map(|s| s.to_string()).collect())
            .with_iteration_limit(1_000)
            .execute(&program)
    }

    #[test]
    fn test_loop_emits_literals() {
        let out = run(
            "__emit_text(0); for(i=0;i<3;i++) { __emit_text(1); } __emit_text(2);",
            &["A", "B", "C"],
        )
        .unwrap();
        assert_eq!(out, "ABBBC");
    }

    #[test]
    fn test_emit_value_arithmetic() {
        let out = run("int w = 4; __emit_value(w * 2 + 1); __emit_value(\"v\" + w);", &[]).unwrap();
        assert_eq!(out, "9v4");
    }

    #[test]
    fn test_break_and_continue() {
        let out = run(
            "for (i = 0; i < 10; i++) { if (i == 1) continue; if (i == 4) break; __emit_value(i); }",
            &[],
        )
        .unwrap();
        assert_eq!(out, "023");
    }

    #[test]
    fn test_while_and_compound_assignment() {
        let out = run("n = 1; while (n < 100) n *= 3; __emit_value(n);", &[]).unwrap();
        assert_eq!(out, "243");
    }

    #[test]
    fn test_builtins() {
        let out = run(
            "__emit_value(min(3, 7)); __emit_value(max(3, 7)); __emit_value(hex(255)); __emit_value(abs(-2));",
            &[],
        )
        .unwrap();
        assert_eq!(out, "37ff2");
    }

    #[test]
    fn test_ternary_and_bits() {
        let out = run("x = 6; __emit_value(x & 1 ? \"odd\" : \"even\"); __emit_value(1 << 4);", &[]).unwrap();
        assert_eq!(out, "even16");
    }

    #[test]
    fn test_iteration_limit() {
        assert!(matches!(
            run("while (true) { }", &[]),
            Err(Error::TooManyIterations { limit: 1_000 })
        ));
    }

    #[test]
    fn test_runtime_errors() {
        assert!(matches!(run("__emit_value(1 / 0);", &[]), Err(Error::DivisionByZero)));
        assert!(matches!(
            run("__emit_value(nope);", &[]),
            Err(Error::UndefinedVariable { .. })
        ));
        assert!(matches!(run("break;", &[]), Err(Error::InvalidBreak)));
        assert!(matches!(
            run("frobnicate(1);", &[]),
            Err(Error::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_block_scope() {
        let out = run("x = 1; { int x = 2; __emit_value(x); } __emit_value(x);", &[]).unwrap();
        assert_eq!(out, "21");
    }
}
