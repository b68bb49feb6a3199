//! Operator semantics over values.
//!
//! Every function here is total and deterministic: integer arithmetic traps
//! recoverably on overflow, division and remainder trap on zero and on
//! `INT64_MIN` edge cases, and kind mismatches report which operator was
//! applied to what. Short-circuit operators (`&&`, `||`, `??`) are not value
//! operators; they are lowered as branches.

use std::rc::Rc;

use crate::error::RuntimeError;
use crate::value::{Compare, Value};

fn undefined_unary(op: &'static str, v: &Value) -> RuntimeError {
    RuntimeError::UndefinedUnary {
        op,
        vtype: v.type_name(),
    }
}

fn undefined_binary(op: &'static str, lhs: &Value, rhs: &Value) -> RuntimeError {
    RuntimeError::UndefinedBinary {
        op,
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    }
}

/// Unary `+`: the identity on every type.
pub fn prefix_pos(value: Value) -> Result<Value, RuntimeError> {
    Ok(value)
}

/// Unary `-` on integers (checked) and reals.
pub fn prefix_neg(value: Value) -> Result<Value, RuntimeError> {
    match value {
        Value::Integer(i) => i
            .checked_neg()
            .map(Value::Integer)
            .ok_or(RuntimeError::IntegerOverflow { op: "-" }),
        Value::Real(r) => Ok(Value::Real(-r)),
        other => Err(undefined_unary("-", &other)),
    }
}

/// Unary `~`: logical NOT on booleans, bitwise NOT on integers.
pub fn prefix_notb(value: Value) -> Result<Value, RuntimeError> {
    match value {
        Value::Boolean(b) => Ok(Value::Boolean(!b)),
        Value::Integer(i) => Ok(Value::Integer(!i)),
        other => Err(undefined_unary("~", &other)),
    }
}

/// Unary `!`: negated truthiness, defined on every type.
pub fn prefix_notl(value: Value) -> Result<Value, RuntimeError> {
    Ok(Value::Boolean(!value.test()))
}

/// Step a value by ±1, shared by the four increment/decrement forms.
pub fn step(value: &Value, delta: i64, op: &'static str) -> Result<Value, RuntimeError> {
    match value {
        Value::Integer(i) => i
            .checked_add(delta)
            .map(Value::Integer)
            .ok_or(RuntimeError::IntegerOverflow { op }),
        Value::Real(r) => Ok(Value::Real(r + delta as f64)),
        other => Err(undefined_unary(op, other)),
    }
}

/// `+`: boolean OR, checked integer addition, real addition with integer
/// promotion, string concatenation.
pub fn infix_add(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(l | r)),
        (Value::Integer(l), Value::Integer(r)) => l
            .checked_add(r)
            .map(Value::Integer)
            .ok_or(RuntimeError::IntegerOverflow { op: "+" }),
        (Value::Integer(l), Value::Real(r)) => Ok(Value::Real(l as f64 + r)),
        (Value::Real(l), Value::Integer(r)) => Ok(Value::Real(l + r as f64)),
        (Value::Real(l), Value::Real(r)) => Ok(Value::Real(l + r)),
        (Value::Str(l), Value::Str(r)) => {
            let mut s = String::with_capacity(l.len() + r.len());
            s.push_str(&l);
            s.push_str(&r);
            Ok(Value::from(s))
        }
        (l, r) => Err(undefined_binary("+", &l, &r)),
    }
}

/// `-`: checked integer subtraction, real subtraction with promotion.
pub fn infix_sub(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Integer(l), Value::Integer(r)) => l
            .checked_sub(r)
            .map(Value::Integer)
            .ok_or(RuntimeError::IntegerOverflow { op: "-" }),
        (Value::Integer(l), Value::Real(r)) => Ok(Value::Real(l as f64 - r)),
        (Value::Real(l), Value::Integer(r)) => Ok(Value::Real(l - r as f64)),
        (Value::Real(l), Value::Real(r)) => Ok(Value::Real(l - r)),
        (l, r) => Err(undefined_binary("-", &l, &r)),
    }
}

fn repeat_string(s: &str, count: i64) -> Result<Value, RuntimeError> {
    if count < 0 {
        return Err(RuntimeError::NegativeRepetition { count });
    }
    let total = s
        .len()
        .checked_mul(count as usize)
        .ok_or(RuntimeError::IntegerOverflow { op: "*" })?;
    let mut out = String::with_capacity(total);
    for _ in 0..count {
        out.push_str(s);
    }
    Ok(Value::from(out))
}

/// `*`: checked integer multiplication, real multiplication with promotion,
/// string repetition in either operand order.
pub fn infix_mul(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Integer(l), Value::Integer(r)) => l
            .checked_mul(r)
            .map(Value::Integer)
            .ok_or(RuntimeError::IntegerOverflow { op: "*" }),
        (Value::Integer(l), Value::Real(r)) => Ok(Value::Real(l as f64 * r)),
        (Value::Real(l), Value::Integer(r)) => Ok(Value::Real(l * r as f64)),
        (Value::Real(l), Value::Real(r)) => Ok(Value::Real(l * r)),
        (Value::Str(s), Value::Integer(n)) => repeat_string(&s, n),
        (Value::Integer(n), Value::Str(s)) => repeat_string(&s, n),
        (l, r) => Err(undefined_binary("*", &l, &r)),
    }
}

/// `/`: truncated integer division (zero and `INT64_MIN / -1` trap), real
/// division with promotion (IEEE semantics, so real `x / 0.0` is infinite).
pub fn infix_div(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Integer(l), Value::Integer(r)) => {
            if r == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            l.checked_div(r)
                .map(Value::Integer)
                .ok_or(RuntimeError::IntegerOverflow { op: "/" })
        }
        (Value::Integer(l), Value::Real(r)) => Ok(Value::Real(l as f64 / r)),
        (Value::Real(l), Value::Integer(r)) => Ok(Value::Real(l / r as f64)),
        (Value::Real(l), Value::Real(r)) => Ok(Value::Real(l / r)),
        (l, r) => Err(undefined_binary("/", &l, &r)),
    }
}

/// `%`: truncated integer remainder (zero and `INT64_MIN % -1` trap), real
/// fmod with promotion.
pub fn infix_mod(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Integer(l), Value::Integer(r)) => {
            if r == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            l.checked_rem(r)
                .map(Value::Integer)
                .ok_or(RuntimeError::IntegerOverflow { op: "%" })
        }
        (Value::Integer(l), Value::Real(r)) => Ok(Value::Real(l as f64 % r)),
        (Value::Real(l), Value::Integer(r)) => Ok(Value::Real(l % r as f64)),
        (Value::Real(l), Value::Real(r)) => Ok(Value::Real(l % r)),
        (l, r) => Err(undefined_binary("%", &l, &r)),
    }
}

fn shift_count(op: &'static str, rhs: &Value) -> Result<i64, RuntimeError> {
    match rhs {
        Value::Integer(n) if *n >= 0 => Ok(*n),
        Value::Integer(n) => Err(RuntimeError::InvalidShiftCount { count: *n }),
        other => Err(RuntimeError::UndefinedBinary {
            op,
            lhs: "string or integer",
            rhs: other.type_name(),
        }),
    }
}

/// `<<`: arithmetic shift left. Integers trap when significant bits would
/// be lost; strings gain `n` trailing spaces.
pub fn infix_sla(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let n = shift_count("<<", &rhs)?;
    match lhs {
        Value::Integer(x) => {
            if n >= 64 {
                if x == 0 {
                    Ok(Value::Integer(0))
                } else {
                    Err(RuntimeError::IntegerOverflow { op: "<<" })
                }
            } else {
                let shifted = x.wrapping_shl(n as u32);
                if shifted >> n != x {
                    Err(RuntimeError::IntegerOverflow { op: "<<" })
                } else {
                    Ok(Value::Integer(shifted))
                }
            }
        }
        Value::Str(s) => {
            let mut out = String::with_capacity(s.len() + n as usize);
            out.push_str(&s);
            for _ in 0..n {
                out.push(' ');
            }
            Ok(Value::from(out))
        }
        other => Err(undefined_binary("<<", &other, &rhs)),
    }
}

/// `>>`: arithmetic shift right. Integers replicate the sign bit; strings
/// lose `n` bytes from the end.
pub fn infix_sra(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let n = shift_count(">>", &rhs)?;
    match lhs {
        Value::Integer(x) => {
            if n >= 64 {
                Ok(Value::Integer(if x < 0 { -1 } else { 0 }))
            } else {
                Ok(Value::Integer(x >> n))
            }
        }
        Value::Str(s) => {
            let keep = s.len().saturating_sub(n as usize);
            Ok(Value::from(bytes_to_string(&s.as_bytes()[..keep])))
        }
        other => Err(undefined_binary(">>", &other, &rhs)),
    }
}

/// `<<<`: logical shift left. Integer bits drop off the top; string bytes
/// move toward the head inside the same length, space-filling the tail.
pub fn infix_sll(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let n = shift_count("<<<", &rhs)?;
    match lhs {
        Value::Integer(x) => {
            if n >= 64 {
                Ok(Value::Integer(0))
            } else {
                Ok(Value::Integer(((x as u64) << n) as i64))
            }
        }
        Value::Str(s) => {
            let len = s.len();
            let drop = (n as usize).min(len);
            let mut bytes = Vec::with_capacity(len);
            bytes.extend_from_slice(&s.as_bytes()[drop..]);
            bytes.resize(len, b' ');
            Ok(Value::from(bytes_to_string(&bytes)))
        }
        other => Err(undefined_binary("<<<", &other, &rhs)),
    }
}

/// `>>>`: logical shift right. Integers zero-fill; string bytes move toward
/// the tail inside the same length, space-filling the head.
pub fn infix_srl(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let n = shift_count(">>>", &rhs)?;
    match lhs {
        Value::Integer(x) => {
            if n >= 64 {
                Ok(Value::Integer(0))
            } else {
                Ok(Value::Integer(((x as u64) >> n) as i64))
            }
        }
        Value::Str(s) => {
            let len = s.len();
            let fill = (n as usize).min(len);
            let mut bytes = vec![b' '; fill];
            bytes.extend_from_slice(&s.as_bytes()[..len - fill]);
            Ok(Value::from(bytes_to_string(&bytes)))
        }
        other => Err(undefined_binary(">>>", &other, &rhs)),
    }
}

// String shifts operate on bytes; re-validate so a shift through a
// multi-byte sequence cannot produce an invalid string.
fn bytes_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// `&`: logical AND on booleans, bitwise AND on integers.
pub fn infix_andb(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(l & r)),
        (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l & r)),
        (l, r) => Err(undefined_binary("&", &l, &r)),
    }
}

/// `|`: logical OR on booleans, bitwise OR on integers.
pub fn infix_orb(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(l | r)),
        (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l | r)),
        (l, r) => Err(undefined_binary("|", &l, &r)),
    }
}

/// `^`: logical XOR on booleans, bitwise XOR on integers.
pub fn infix_xorb(lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(l ^ r)),
        (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(l ^ r)),
        (l, r) => Err(undefined_binary("^", &l, &r)),
    }
}

/// `==`: equal under three-way comparison; unordered operands are unequal.
pub fn infix_cmp_eq(lhs: &Value, rhs: &Value) -> Value {
    Value::Boolean(lhs.compare(rhs) == Compare::Equal)
}

/// `!=`: the negation of `==`, so unordered operands are unequal.
pub fn infix_cmp_ne(lhs: &Value, rhs: &Value) -> Value {
    Value::Boolean(lhs.compare(rhs) != Compare::Equal)
}

/// Relational operators trap on unordered operands.
pub fn infix_cmp_rel(
    op: &'static str,
    lhs: &Value,
    rhs: &Value,
) -> Result<Value, RuntimeError> {
    let cmp = lhs.compare(rhs);
    if cmp == Compare::Unordered {
        return Err(RuntimeError::UnorderedComparison {
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        });
    }
    let result = match op {
        "<" => cmp == Compare::Less,
        ">" => cmp == Compare::Greater,
        "<=" => cmp != Compare::Greater,
        ">=" => cmp != Compare::Less,
        _ => unreachable!("not a relational operator: {op}"),
    };
    Ok(Value::Boolean(result))
}

/// `<=>`: −1, 0, 1 or the literal `"<unordered>"` string.
pub fn infix_cmp_3way(lhs: &Value, rhs: &Value) -> Value {
    match lhs.compare(rhs) {
        Compare::Less => Value::Integer(-1),
        Compare::Equal => Value::Integer(0),
        Compare::Greater => Value::Integer(1),
        Compare::Unordered => Value::Str(Rc::from("<unordered>")),
    }
}
