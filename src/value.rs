//! Scalar values and their static types.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Static type of a member or expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Type of the `null` literal; compatible with every other type.
    Null,
    Boolean,
    Integer,
    Float,
    String,
}

impl ValueType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Float)
    }

    /// Common type two operands can be compared or combined as, if any.
    pub fn unify(self, other: ValueType) -> Option<ValueType> {
        match (self, other) {
            (a, b) if a == b => Some(a),
            (ValueType::Null, b) => Some(b),
            (a, ValueType::Null) => Some(a),
            (a, b) if a.is_numeric() && b.is_numeric() => Some(ValueType::Float),
            _ => None,
        }
    }

    /// Whether a value of `self` may be used where `target` is expected.
    pub fn is_assignable_to(self, target: ValueType) -> bool {
        self == target
            || self == ValueType::Null
            || (self == ValueType::Integer && target == ValueType::Float)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Null => write!(f, "null"),
            ValueType::Boolean => write!(f, "bool"),
            ValueType::Integer => write!(f, "int"),
            ValueType::Float => write!(f, "float"),
            ValueType::String => write!(f, "string"),
        }
    }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(ValueType::Boolean),
            "int" | "integer" | "long" => Ok(ValueType::Integer),
            "float" | "double" | "number" | "decimal" => Ok(ValueType::Float),
            "string" | "text" => Ok(ValueType::String),
            other => Err(Error::Config(format!("unknown member type '{}'", other))),
        }
    }
}

/// A scalar value flowing through expressions and records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON scalar. Arrays and objects are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Integer(i)),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| Error::Execution(format!("unsupported number {}", n))),
            },
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(Error::Execution(format!(
                "nested JSON values are not supported: {}",
                other
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Compare two values of compatible types. Returns `None` when either
    /// side is null (other than null against null) or the types differ.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => compare_int_float(*a, *b),
            (Value::Float(a), Value::Integer(b)) => {
                compare_int_float(*b, *a).map(Ordering::reverse)
            }
            _ => None,
        }
    }

    /// Total order used for sorting: null, booleans, numbers, strings.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Boolean(_) => 1,
                Value::Integer(_) | Value::Float(_) => 2,
                Value::String(_) => 3,
            }
        }
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => {
                a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b))
            }
            (Value::Integer(a), Value::Float(b)) => sort_int_float(*a, *b),
            (Value::Float(a), Value::Integer(b)) => sort_int_float(*b, *a).reverse(),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

/// Exact comparison of an integer with a float; `None` for NaN.
fn compare_int_float(i: i64, f: f64) -> Option<Ordering> {
    // 2^63, exactly representable and above every i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return None;
    }
    if f >= LIMIT {
        return Some(Ordering::Less);
    }
    if f < -LIMIT {
        return Some(Ordering::Greater);
    }
    let whole = f.trunc();
    Some(i.cmp(&(whole as i64)).then(if f > whole {
        Ordering::Less
    } else if f < whole {
        Ordering::Greater
    } else {
        Ordering::Equal
    }))
}

/// NaN sorts like `f64::total_cmp`: positive NaN last, negative NaN first.
fn sort_int_float(i: i64, f: f64) -> Ordering {
    compare_int_float(i, f).unwrap_or(if f.is_sign_negative() {
        Ordering::Greater
    } else {
        Ordering::Less
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unify_numeric_widens_to_float() {
        assert_eq!(
            ValueType::Integer.unify(ValueType::Float),
            Some(ValueType::Float)
        );
        assert_eq!(
            ValueType::Integer.unify(ValueType::Integer),
            Some(ValueType::Integer)
        );
        assert_eq!(
            ValueType::Null.unify(ValueType::String),
            Some(ValueType::String)
        );
        assert_eq!(ValueType::String.unify(ValueType::Integer), None);
    }

    #[test]
    fn test_value_type_from_str() {
        assert_eq!("Integer".parse::<ValueType>().unwrap(), ValueType::Integer);
        assert_eq!("bool".parse::<ValueType>().unwrap(), ValueType::Boolean);
        assert_eq!("double".parse::<ValueType>().unwrap(), ValueType::Float);
        assert!("date".parse::<ValueType>().is_err());
    }

    #[test]
    fn test_compare_mixed_numbers() {
        let a = Value::Integer(2);
        let b = Value::Float(2.5);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(b.compare(&a), Some(Ordering::Greater));
        assert_eq!(Value::Integer(3).compare(&Value::Float(3.0)), Some(Ordering::Equal));
    }

    #[test]
    fn test_mixed_numbers_compare_exactly_beyond_f64_precision() {
        let big = 1_i64 << 53;
        let above = Value::Integer(big + 1);
        let float = Value::Float(big as f64);
        assert_eq!(above.compare(&float), Some(Ordering::Greater));
        assert_eq!(float.compare(&above), Some(Ordering::Less));
        assert_eq!(Value::Integer(big).compare(&float), Some(Ordering::Equal));
        assert_eq!(above.sort_cmp(&float), Ordering::Greater);
        assert_eq!(Value::Integer(i64::MAX).compare(&Value::Float(9.3e18)), Some(Ordering::Less));
        assert_eq!(Value::Integer(i64::MIN).compare(&Value::Float(-1e300)), Some(Ordering::Greater));
        assert_eq!(Value::Integer(-3).compare(&Value::Float(-2.5)), Some(Ordering::Less));
        assert_eq!(Value::Integer(1).compare(&Value::Float(f64::NAN)), None);

        let mut values = vec![
            Value::Float(f64::NAN),
            Value::Integer(big + 1),
            Value::Float(big as f64),
            Value::Integer(big),
            Value::Float(-0.0),
            Value::Integer(0),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(values[..2], [Value::Float(-0.0), Value::Integer(0)]);
        assert_eq!(values[2..4], [Value::Float(big as f64), Value::Integer(big)]);
        assert_eq!(values[4], Value::Integer(big + 1));
        assert!(matches!(values[5], Value::Float(f) if f.is_nan()));
    }

    #[test]
    fn test_compare_null_and_mismatched() {
        assert_eq!(Value::Null.compare(&Value::Null), Some(Ordering::Equal));
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert_eq!(Value::from("a").compare(&Value::Integer(1)), None);
    }

    #[test]
    fn test_sort_cmp_puts_null_first() {
        let mut values = vec![
            Value::from("b"),
            Value::Integer(3),
            Value::Null,
            Value::Float(1.5),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Float(1.5),
                Value::Integer(3),
                Value::from("b")
            ]
        );
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!(42);
        assert_eq!(Value::from_json(&json).unwrap(), Value::Integer(42));
        let json = serde_json::json!(1.25);
        assert_eq!(Value::from_json(&json).unwrap(), Value::Float(1.25));
        assert!(Value::from_json(&serde_json::json!([1, 2])).is_err());
        assert_eq!(Value::from("x").to_json(), serde_json::json!("x"));
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_untagged_deserialize() {
        let v: Value = serde_json::from_str("18").unwrap();
        assert_eq!(v, Value::Integer(18));
        let v: Value = serde_json::from_str("\"Ann\"").unwrap();
        assert_eq!(v, Value::from("Ann"));
        let v: Value = serde_json::from_str("null").unwrap();
        assert_eq!(v, Value::Null);
        let v: Value = serde_json::from_str("2.5").unwrap();
        assert_eq!(v, Value::Float(2.5));
    }
}
