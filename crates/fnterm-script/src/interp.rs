//! Tree-walking evaluator for function bodies.
//!
//! Integer arithmetic is checked and traps on overflow. Division of two
//! integers stays integral only when exact, otherwise it yields a float.
//! Calls between registered functions go through [`FunctionScope`] and are
//! bounded by [`MAX_CALL_DEPTH`]. Expression nesting, summed across nested
//! calls, is bounded by [`MAX_EVAL_NESTING`].

use std::cell::Cell;

use indexmap::IndexMap;

use crate::ast::{BinaryOp, Block, Expr, FunctionDef, UnaryOp};
use crate::builtins;
use crate::error::{InvokeError, RuntimeError};
use crate::registry::Callable;
use crate::value::Value;

/// Maximum nesting of function-to-function calls.
pub const MAX_CALL_DEPTH: usize = 64;

/// Maximum number of expressions under evaluation at once, across all calls.
pub const MAX_EVAL_NESTING: usize = 512;

/// Resolves a callee name to a registered function.
pub trait FunctionScope {
    fn resolve(&self, name: &str) -> Option<&dyn Callable>;
}

/// Scope and depth of one invocation.
#[derive(Clone, Copy)]
pub struct CallContext<'a> {
    pub scope: &'a dyn FunctionScope,
    pub depth: usize,
    /// Expressions already under evaluation in the callers.
    pub nesting: usize,
}

impl<'a> CallContext<'a> {
    pub fn root(scope: &'a dyn FunctionScope) -> Self {
        CallContext {
            scope,
            depth: 0,
            nesting: 0,
        }
    }

    fn nested(&self, nesting: usize) -> Result<CallContext<'a>, RuntimeError> {
        if self.depth + 1 >= MAX_CALL_DEPTH {
            return Err(RuntimeError::RecursionLimitExceeded {
                limit: MAX_CALL_DEPTH,
            });
        }
        Ok(CallContext {
            scope: self.scope,
            depth: self.depth + 1,
            nesting,
        })
    }
}

/// Binds `args` to the parameters of `def`, evaluates its body, and coerces
/// the result to the declared return type.
pub fn call_function(
    def: &FunctionDef,
    ctx: &CallContext<'_>,
    args: Vec<Value>,
) -> Result<Value, InvokeError> {
    if args.len() != def.params.len() {
        return Err(InvokeError::ArgumentMismatch {
            name: def.name.clone(),
            expected: def.params.len(),
            got: args.len(),
        });
    }

    let mut env = Vec::with_capacity(def.params.len());
    for (param, arg) in def.params.iter().zip(args) {
        env.push((param.name.clone(), param.ty.coerce(&param.name, arg)?));
    }

    let evaluator = Evaluator {
        ctx: *ctx,
        nesting: Cell::new(ctx.nesting),
    };
    let result = evaluator.block(&def.body, &mut env)?;
    Ok(def.return_type.coerce("return value", result)?)
}

type Env = Vec<(String, Value)>;

struct Evaluator<'a> {
    ctx: CallContext<'a>,
    nesting: Cell<usize>,
}

impl Evaluator<'_> {
    fn block(&self, block: &Block, env: &mut Env) -> Result<Value, RuntimeError> {
        let mark = env.len();
        for (name, expr) in &block.bindings {
            let value = self.eval(expr, env)?;
            env.push((name.clone(), value));
        }
        let result = self.eval(&block.result, env);
        env.truncate(mark);
        result
    }

    fn eval(&self, expr: &Expr, env: &mut Env) -> Result<Value, RuntimeError> {
        let nesting = self.nesting.get();
        if nesting >= MAX_EVAL_NESTING {
            return Err(RuntimeError::NestingLimitExceeded {
                limit: MAX_EVAL_NESTING,
            });
        }
        self.nesting.set(nesting + 1);
        let result = self.eval_expr(expr, env);
        self.nesting.set(nesting);
        result
    }

    fn eval_expr(&self, expr: &Expr, env: &mut Env) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),

            Expr::Var(name) => env
                .iter()
                .rev()
                .find(|(bound, _)| bound == name)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() }),

            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item, env))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),

            Expr::Object(fields) => {
                let mut out = IndexMap::with_capacity(fields.len());
                for (key, value) in fields {
                    out.insert(key.clone(), self.eval(value, env)?);
                }
                Ok(Value::Object(out))
            }

            Expr::Unary { op, expr } => {
                let value = self.eval(expr, env)?;
                match (op, value) {
                    (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
                    (UnaryOp::Neg, Value::Int(i)) => {
                        i.checked_neg().map(Value::Int).ok_or(RuntimeError::IntegerOverflow)
                    }
                    (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Neg, other) => Err(type_mismatch("number", &other)),
                }
            }

            Expr::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                if !self.eval(lhs, env)?.truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(rhs, env)?.truthy()))
            }

            Expr::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => {
                if self.eval(lhs, env)?.truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(rhs, env)?.truthy()))
            }

            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, env)?;
                let rhs = self.eval(rhs, env)?;
                binary(*op, lhs, rhs)
            }

            Expr::If {
                cond,
                then_block,
                else_block,
            } => {
                if self.eval(cond, env)?.truthy() {
                    self.block(then_block, env)
                } else {
                    self.block(else_block, env)
                }
            }

            Expr::Index { target, index } => {
                let target = self.eval(target, env)?;
                let index = self.eval(index, env)?;
                index_value(target, index)
            }

            Expr::Field { target, name } => match self.eval(target, env)? {
                Value::Object(mut fields) => fields
                    .swap_remove(name)
                    .ok_or_else(|| RuntimeError::MissingKey { key: name.clone() }),
                other => Err(type_mismatch("object", &other)),
            },

            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, env))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(name, args)
            }
        }
    }

    fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if builtins::is_builtin(name) {
            return builtins::call(name, args).unwrap_or_else(|| {
                Err(RuntimeError::UnknownFunction {
                    name: name.to_string(),
                })
            });
        }
        let callee = self
            .ctx
            .scope
            .resolve(name)
            .ok_or_else(|| RuntimeError::UnknownFunction {
                name: name.to_string(),
            })?;
        let nested = self.ctx.nested(self.nesting.get())?;
        callee.invoke(&nested, args).map_err(|err| match err {
            InvokeError::NotFound(name) => RuntimeError::UnknownFunction { name },
            InvokeError::ArgumentMismatch {
                name,
                expected,
                got,
            } => RuntimeError::ArityMismatch {
                name,
                expected,
                got,
            },
            InvokeError::Runtime(err) => err,
        })
    }
}

fn type_mismatch(expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: expected.to_string(),
        got: got.type_name().to_string(),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Add => add(lhs, rhs),
        BinaryOp::Sub => arith(lhs, rhs, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arith(lhs, rhs, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => divide(lhs, rhs),
        BinaryOp::Rem => match (&lhs, &rhs) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivideByZero),
            (Value::Int(a), Value::Int(b)) => {
                a.checked_rem(*b).map(Value::Int).ok_or(RuntimeError::IntegerOverflow)
            }
            (Value::Int(_), other) | (other, _) => Err(type_mismatch("int", other)),
        },
        BinaryOp::Pow => builtins::power(lhs, rhs),
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(&lhs, &rhs))),
        BinaryOp::Lt => compare(&lhs, &rhs).map(|o| Value::Bool(o.is_lt())),
        BinaryOp::Le => compare(&lhs, &rhs).map(|o| Value::Bool(o.is_le())),
        BinaryOp::Gt => compare(&lhs, &rhs).map(|o| Value::Bool(o.is_gt())),
        BinaryOp::Ge => compare(&lhs, &rhs).map(|o| Value::Bool(o.is_ge())),
        // eval short-circuits these; here both sides are already evaluated
        BinaryOp::And => Ok(Value::Bool(lhs.truthy() && rhs.truthy())),
        BinaryOp::Or => Ok(Value::Bool(lhs.truthy() || rhs.truthy())),
    }
}

/// `+` adds numbers, concatenates when either side is a string, and joins arrays.
fn add(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Str(a), b) => Ok(Value::Str(format!("{a}{b}"))),
        (a, Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (a, b) => arith(a, b, i64::checked_add, |x, y| x + y),
    }
}

fn arith(
    lhs: Value,
    rhs: Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => int_op(*a, *b)
            .map(Value::Int)
            .ok_or(RuntimeError::IntegerOverflow),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(float_op(a, b))),
            (None, _) => Err(type_mismatch("number", &lhs)),
            (_, None) => Err(type_mismatch("number", &rhs)),
        },
    }
}

fn divide(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    if rhs.as_f64() == Some(0.0) {
        return Err(RuntimeError::DivideByZero);
    }
    if let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) {
        if a.checked_rem(*b) == Some(0) {
            return a.checked_div(*b).map(Value::Int).ok_or(RuntimeError::IntegerOverflow);
        }
    }
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Float(a / b)),
        (None, _) => Err(type_mismatch("number", &lhs)),
        (_, None) => Err(type_mismatch("number", &rhs)),
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering, RuntimeError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| type_mismatch("number", lhs)),
            (None, _) => Err(type_mismatch("number or string", lhs)),
            (_, None) => Err(type_mismatch("number or string", rhs)),
        },
    }
}

fn index_value(target: Value, index: Value) -> Result<Value, RuntimeError> {
    match (target, index) {
        (Value::Array(mut items), Value::Int(i)) => {
            let len = items.len();
            usize::try_from(i)
                .ok()
                .filter(|idx| *idx < len)
                .map(|idx| items.swap_remove(idx))
                .ok_or(RuntimeError::IndexOutOfBounds { index: i, len })
        }
        (Value::Str(s), Value::Int(i)) => {
            let len = s.chars().count();
            usize::try_from(i)
                .ok()
                .and_then(|idx| s.chars().nth(idx))
                .map(|c| Value::Str(c.to_string()))
                .ok_or(RuntimeError::IndexOutOfBounds { index: i, len })
        }
        (Value::Object(mut fields), Value::Str(key)) => fields
            .swap_remove(&key)
            .ok_or(RuntimeError::MissingKey { key }),
        (Value::Array(_) | Value::Str(_), other) => Err(type_mismatch("int", &other)),
        (Value::Object(_), other) => Err(type_mismatch("string", &other)),
        (other, _) => Err(type_mismatch("array, string or object", &other)),
    }
}
