//! The capability interface a fact exposes to rule evaluation.
//!
//! Facts are resolved by name at evaluation time. Concrete fact types
//! implement `Fact` explicitly, mapping field and method names onto their
//! own state.

use serde_json::{Map, Value};

use crate::error::FactError;
use crate::value::type_name;

/// A mutable domain object visible to rules under a symbolic name.
pub trait Fact {
    /// Read a field. `None` means the fact has no such field.
    fn get_field(&self, name: &str) -> Option<Value>;

    /// Write a field.
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), FactError>;

    /// Invoke a method with positional arguments. Methods with no result
    /// return `Value::Null`.
    fn invoke(&mut self, name: &str, args: &[Value]) -> Result<Value, FactError> {
        let _ = args;
        Err(FactError::UnknownMethod(name.to_string()))
    }
}

/// JSON objects are facts: every key is a field, assignments may create
/// new keys, and there are no methods.
impl Fact for Map<String, Value> {
    fn get_field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), FactError> {
        self.insert(name.to_string(), value);
        Ok(())
    }
}


// ---------------------------------------------------------------------------
// Helpers for hand-written Fact impls
// ---------------------------------------------------------------------------

/// Check a method's argument count.
pub fn expect_args(method: &str, args: &[Value], expected: usize) -> Result<(), FactError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(FactError::Arity {
            method: method.to_string(),
            expected,
            got: args.len(),
        })
    }
}

/// Extract a string for assignment into a `String` field.
pub fn string_field(field: &str, value: Value) -> Result<String, FactError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(mismatch(field, &other)),
    }
}

/// Extract an integer for assignment into an `i64` field.
pub fn int_field(field: &str, value: Value) -> Result<i64, FactError> {
    value.as_i64().ok_or_else(|| mismatch(field, &value))
}

/// Extract a float for assignment into an `f64` field. Integers widen.
pub fn float_field(field: &str, value: Value) -> Result<f64, FactError> {
    value.as_f64().ok_or_else(|| mismatch(field, &value))
}

/// Extract a boolean for assignment into a `bool` field.
pub fn bool_field(field: &str, value: Value) -> Result<bool, FactError> {
    value.as_bool().ok_or_else(|| mismatch(field, &value))
}

fn mismatch(field: &str, value: &Value) -> FactError {
    FactError::TypeMismatch {
        field: field.to_string(),
        found: type_name(value).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_object_fields() {
        let mut obj = json!({"Name": "Alice", "Age": 30})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(obj.get_field("Name"), Some(json!("Alice")));
        assert_eq!(obj.get_field("Missing"), None);
        obj.set_field("Discount", json!("10%")).unwrap();
        assert_eq!(obj.get_field("Discount"), Some(json!("10%")));
    }

    #[test]
    fn json_object_has_no_methods() {
        let mut obj = Map::new();
        let err = obj.invoke("Anything", &[]).unwrap_err();
        assert_eq!(err, FactError::UnknownMethod("Anything".into()));
    }

    #[test]
    fn field_extractors_check_types() {
        assert_eq!(int_field("N", json!(4)).unwrap(), 4);
        assert_eq!(float_field("F", json!(4)).unwrap(), 4.0);
        assert!(string_field("S", json!(4)).is_err());
        assert!(bool_field("B", json!("yes")).is_err());
        assert!(expect_args("M", &[json!(1)], 0).is_err());
    }
}
