//! Runtime values seen by rule conditions and actions.
//!
//! Values are plain `serde_json::Value`s. Integers and floats stay
//! distinct: integer-only arithmetic stays integral, and any float operand
//! promotes the operation to `f64`.

use std::cmp::Ordering;

use serde_json::{Number, Value};

/// Short type label used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build a JSON number from an `f64`, rejecting NaN and infinities.
pub fn float(f: f64) -> Result<Value, String> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| format!("arithmetic produced non-finite value {}", f))
}

/// Render a value for string concatenation: strings unquoted, everything
/// else in its JSON form.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "nil".to_string(),
        other => other.to_string(),
    }
}


// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(n: &Number) -> Option<Num> {
    if let Some(i) = n.as_i64() {
        Some(Num::Int(i))
    } else {
        n.as_f64().map(Num::Float)
    }
}

fn num_to_f64(n: &Num) -> f64 {
    match n {
        Num::Int(i) => *i as f64,
        Num::Float(f) => *f,
    }
}

/// Order two values. Returns `None` when they are not comparable.
///
/// Numbers compare numerically across int/float, strings lexically,
/// booleans and nil only for equality.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (as_num(x)?, as_num(y)?) {
            (Num::Int(i), Num::Int(j)) => Some(i.cmp(&j)),
            (l, r) => num_to_f64(&l).partial_cmp(&num_to_f64(&r)),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) if x == y => Some(Ordering::Equal),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Equality with numeric promotion. Mismatched types are simply unequal.
pub fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}


// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

/// `a + b`: numeric addition, or concatenation when either side is a string.
pub fn add(a: &Value, b: &Value) -> Result<Value, String> {
    if a.is_string() || b.is_string() {
        return Ok(Value::String(format!("{}{}", display(a), display(b))));
    }
    numeric(a, b, "+", i64::checked_add, |x, y| x + y)
}

pub fn sub(a: &Value, b: &Value) -> Result<Value, String> {
    numeric(a, b, "-", i64::checked_sub, |x, y| x - y)
}

pub fn mul(a: &Value, b: &Value) -> Result<Value, String> {
    numeric(a, b, "*", i64::checked_mul, |x, y| x * y)
}

/// Division truncates when both operands are integers.
pub fn div(a: &Value, b: &Value) -> Result<Value, String> {
    if is_zero_number(b) {
        return Err("division by zero".into());
    }
    numeric(a, b, "/", i64::checked_div, |x, y| x / y)
}

pub fn rem(a: &Value, b: &Value) -> Result<Value, String> {
    match (a.as_i64(), b.as_i64()) {
        (Some(_), Some(0)) => Err("division by zero".into()),
        (Some(x), Some(y)) => Ok(Value::from(x.wrapping_rem(y))),
        _ => Err(format!(
            "operator '%' needs int operands, got {} and {}",
            type_name(a),
            type_name(b)
        )),
    }
}

pub fn negate(a: &Value) -> Result<Value, String> {
    match a {
        Value::Number(n) => match as_num(n) {
            Some(Num::Int(i)) => i
                .checked_neg()
                .map(Value::from)
                .ok_or_else(|| "integer overflow".to_string()),
            Some(Num::Float(f)) => float(-f),
            None => Err("unsupported number".into()),
        },
        other => Err(format!("cannot negate {}", type_name(other))),
    }
}

/// Length of a string (in chars) or array.
pub fn len(a: &Value) -> Result<Value, String> {
    match a {
        Value::String(s) => Ok(Value::from(s.chars().count() as i64)),
        Value::Array(items) => Ok(Value::from(items.len() as i64)),
        other => Err(format!("Len is not defined for {}", type_name(other))),
    }
}

/// Whether a value is its type's zero value.
pub fn is_zero(a: &Value) -> bool {
    match a {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(_) => is_zero_number(a),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn is_zero_number(v: &Value) -> bool {
    match v {
        Value::Number(n) => match as_num(n) {
            Some(Num::Int(i)) => i == 0,
            Some(Num::Float(f)) => f == 0.0,
            None => false,
        },
        _ => false,
    }
}

fn numeric(
    a: &Value,
    b: &Value,
    op: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, String> {
    let (x, y) = match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (as_num(x), as_num(y)) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err("unsupported number".into()),
        },
        _ => {
            return Err(format!(
                "operator '{}' not defined for {} and {}",
                op,
                type_name(a),
                type_name(b)
            ))
        }
    };
    match (x, y) {
        (Num::Int(i), Num::Int(j)) => int_op(i, j)
            .map(Value::from)
            .ok_or_else(|| format!("integer overflow in '{}'", op)),
        (l, r) => float(float_op(num_to_f64(&l), num_to_f64(&r))),
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
