//! Tree-walking evaluation of typed expressions.
//!
//! Null propagates through arithmetic, negation and string methods.
//! Relational comparisons involving null are false, while `null == null`
//! holds. Integer overflow and division by zero are execution errors.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::record::Entity;
use crate::value::Value;

use super::types::{BinaryOp, ExprKind, Method, TypedExpr, UnaryOp};

impl TypedExpr {
    /// Evaluate against one entity per lambda parameter.
    pub fn evaluate(&self, args: &[&dyn Entity]) -> Result<Value> {
        match &self.kind {
            ExprKind::Constant(v) => Ok(v.clone()),
            ExprKind::Member { parameter, name } => {
                let entity = args.get(*parameter).ok_or_else(|| {
                    Error::Execution(format!("no argument bound to parameter {}", parameter))
                })?;
                Ok(entity.member(name).unwrap_or(Value::Null))
            }
            ExprKind::Unary { op, operand } => unary(*op, operand.evaluate(args)?),
            ExprKind::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    let l = left.evaluate(args)?.as_bool();
                    if l == Some(false) {
                        return Ok(Value::Boolean(false));
                    }
                    let r = right.evaluate(args)?.as_bool();
                    Ok(match (l, r) {
                        (_, Some(false)) => Value::Boolean(false),
                        (Some(true), Some(true)) => Value::Boolean(true),
                        _ => Value::Null,
                    })
                }
                BinaryOp::Or => {
                    let l = left.evaluate(args)?.as_bool();
                    if l == Some(true) {
                        return Ok(Value::Boolean(true));
                    }
                    let r = right.evaluate(args)?.as_bool();
                    Ok(match (l, r) {
                        (_, Some(true)) => Value::Boolean(true),
                        (Some(false), Some(false)) => Value::Boolean(false),
                        _ => Value::Null,
                    })
                }
                op => binary(*op, left.evaluate(args)?, right.evaluate(args)?),
            },
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => {
                if test.evaluate(args)?.as_bool() == Some(true) {
                    if_true.evaluate(args)
                } else {
                    if_false.evaluate(args)
                }
            }
            ExprKind::Call {
                method,
                target,
                args: call_args,
            } => {
                let target = target.evaluate(args)?;
                let values = call_args
                    .iter()
                    .map(|a| a.evaluate(args))
                    .collect::<Result<Vec<_>>>()?;
                call(*method, target, &values)
            }
        }
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    match (op, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Negate, Value::Integer(i)) => i
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| Error::Execution("integer overflow in negation".into())),
        (UnaryOp::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (op, v) => Err(Error::Execution(format!(
            "operator {:?} cannot be applied to {}",
            op,
            v.value_type()
        ))),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Boolean(equals(&left, &right))),
        BinaryOp::NotEq => Ok(Value::Boolean(!equals(&left, &right))),
        BinaryOp::Lt => Ok(relational(&left, &right, |o| o == Ordering::Less)),
        BinaryOp::LtEq => Ok(relational(&left, &right, |o| o != Ordering::Greater)),
        BinaryOp::Gt => Ok(relational(&left, &right, |o| o == Ordering::Greater)),
        BinaryOp::GtEq => Ok(relational(&left, &right, |o| o != Ordering::Less)),
        BinaryOp::Concat => Ok(Value::String(format!(
            "{}{}",
            concat_text(&left),
            concat_text(&right)
        ))),
        _ => arithmetic(op, left, right),
    }
}

fn equals(left: &Value, right: &Value) -> bool {
    left.compare(right) == Some(Ordering::Equal)
}

fn relational(left: &Value, right: &Value, test: impl Fn(Ordering) -> bool) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Boolean(false);
    }
    Value::Boolean(left.compare(right).is_some_and(test))
}

fn concat_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    match (&left, &right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(a), Value::Integer(b)) => integer_arithmetic(op, *a, *b),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => a / b,
                _ => a % b,
            })),
            _ => Err(Error::Execution(format!(
                "operator {:?} cannot be applied to {} and {}",
                op,
                left.value_type(),
                right.value_type()
            ))),
        },
    }
}

fn integer_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value> {
    if b == 0 && matches!(op, BinaryOp::Divide | BinaryOp::Modulo) {
        return Err(Error::Execution("division by zero".into()));
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide => a.checked_div(b),
        _ => a.checked_rem(b),
    };
    result
        .map(Value::Integer)
        .ok_or_else(|| Error::Execution(format!("integer overflow in {} {:?} {}", a, op, b)))
}

fn call(method: Method, target: Value, args: &[Value]) -> Result<Value> {
    let s = match &target {
        Value::Null => return Ok(Value::Null),
        Value::String(s) => s.as_str(),
        other => {
            return Err(Error::Execution(format!(
                "method {:?} cannot be applied to {}",
                method,
                other.value_type()
            )))
        }
    };

    let arg = match args.first() {
        Some(Value::Null) => return Ok(Value::Null),
        Some(v) => v.as_str(),
        None => None,
    };

    let value = match method {
        Method::Length => Value::Integer(s.chars().count() as i64),
        Method::ToUpper => Value::String(s.to_uppercase()),
        Method::ToLower => Value::String(s.to_lowercase()),
        Method::Trim => Value::String(s.trim().to_string()),
        Method::StartsWith => Value::Boolean(arg.is_some_and(|a| s.starts_with(a))),
        Method::EndsWith => Value::Boolean(arg.is_some_and(|a| s.ends_with(a))),
        Method::Contains => Value::Boolean(arg.is_some_and(|a| s.contains(a))),
    };
    Ok(value)
}
