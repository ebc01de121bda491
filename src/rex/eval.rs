use std::cmp::Ordering;

use anyhow::bail;

use crate::error::{OptError, OptResult};
use crate::rex::{Op, RexCall, RexNode};
use crate::types::DataType;
use crate::value::{Row, Value};

impl RexNode {
    /// Evaluates this expression against one input row using SQL three-valued logic.
    pub fn eval(&self, row: &Row) -> OptResult<Value> {
        match self {
            RexNode::InputRef(r) => match row.values().get(r.index) {
                Some(v) => Ok(v.clone()),
                None => bail!(OptError::Eval(format!(
                    "input ref ${} out of range for row of arity {}",
                    r.index,
                    row.len()
                ))),
            },
            RexNode::Literal(v) => Ok(v.clone()),
            RexNode::Call(call) => eval_call(call, row),
            RexNode::TableInputRef(r) => bail!(OptError::Eval(format!(
                "table input ref {} cannot be evaluated",
                r.table_ref
            ))),
        }
    }

    /// Evaluates a predicate; unknown counts as false.
    pub fn eval_predicate(&self, row: &Row) -> OptResult<bool> {
        Ok(matches!(self.eval(row)?, Value::Boolean(true)))
    }
}

fn eval_call(call: &RexCall, row: &Row) -> OptResult<Value> {
    match call.op {
        Op::And => {
            let mut unknown = false;
            for operand in &call.operands {
                match operand.eval(row)? {
                    Value::Boolean(false) => return Ok(Value::Boolean(false)),
                    Value::Null => unknown = true,
                    _ => {}
                }
            }
            Ok(if unknown {
                Value::Null
            } else {
                Value::Boolean(true)
            })
        }
        Op::Or => {
            let mut unknown = false;
            for operand in &call.operands {
                match operand.eval(row)? {
                    Value::Boolean(true) => return Ok(Value::Boolean(true)),
                    Value::Null => unknown = true,
                    _ => {}
                }
            }
            Ok(if unknown {
                Value::Null
            } else {
                Value::Boolean(false)
            })
        }
        Op::Not => Ok(match call.operands[0].eval(row)? {
            Value::Boolean(b) => Value::Boolean(!b),
            _ => Value::Null,
        }),
        Op::IsNull => Ok(Value::Boolean(call.operands[0].eval(row)?.is_null())),
        Op::IsNotNull => Ok(Value::Boolean(!call.operands[0].eval(row)?.is_null())),
        op if op.is_comparison() => {
            let left = call.operands[0].eval(row)?;
            let right = call.operands[1].eval(row)?;
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            let ord = left.cmp(&right);
            Ok(Value::Boolean(match op {
                Op::Equals => ord == Ordering::Equal,
                Op::NotEquals => ord != Ordering::Equal,
                Op::LessThan => ord == Ordering::Less,
                Op::LessThanOrEqual => ord != Ordering::Greater,
                Op::GreaterThan => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        Op::Plus | Op::Minus | Op::Times | Op::Divide => {
            let left = call.operands[0].eval(row)?;
            let right = call.operands[1].eval(row)?;
            arithmetic(call.op, &left, &right)
        }
        Op::UnaryMinus => Ok(match call.operands[0].eval(row)? {
            Value::Integer(i) => Value::Integer(-i),
            Value::Double(d) => Value::Double(-d),
            _ => Value::Null,
        }),
        Op::Floor | Op::Ceil => Ok(match call.operands[0].eval(row)? {
            Value::Double(d) if call.op == Op::Floor => Value::Double(d.floor()),
            Value::Double(d) => Value::Double(d.ceil()),
            other => other,
        }),
        Op::Cast => cast(call.operands[0].eval(row)?, call.data_type),
        op => bail!(OptError::Eval(format!("unsupported operator {}", op))),
    }
}

fn arithmetic(op: Op, left: &Value, right: &Value) -> OptResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        return Ok(match op {
            Op::Plus => Value::Integer(a.wrapping_add(*b)),
            Op::Minus => Value::Integer(a.wrapping_sub(*b)),
            Op::Times => Value::Integer(a.wrapping_mul(*b)),
            _ if *b == 0 => bail!(OptError::Eval("division by zero".to_string())),
            _ => Value::Integer(a / b),
        });
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Double(match op {
            Op::Plus => a + b,
            Op::Minus => a - b,
            Op::Times => a * b,
            _ => a / b,
        })),
        _ => bail!(OptError::Eval(format!(
            "cannot apply {} to {} and {}",
            op, left, right
        ))),
    }
}

fn cast(value: Value, data_type: DataType) -> OptResult<Value> {
    Ok(match (value, data_type) {
        (Value::Null, _) => Value::Null,
        (Value::Integer(i), DataType::Double) => Value::Double(i as f64),
        (Value::Double(d), DataType::Integer | DataType::BigInt) => Value::Integer(d as i64),
        (Value::Varchar(s), DataType::Integer | DataType::BigInt) => match s.trim().parse() {
            Ok(i) => Value::Integer(i),
            Err(_) => bail!(OptError::Eval(format!("cannot cast '{}' to {}", s, data_type))),
        },
        (v, DataType::Varchar) => match v {
            Value::Varchar(s) => Value::Varchar(s),
            other => Value::Varchar(other.to_string()),
        },
        (v, _) => v,
    })
}
