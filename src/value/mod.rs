//! Tagged scalar values and typed rows.
//!
//! `Value` is the runtime representation of anything the engine stores,
//! indexes or compares: the scalar types declared in a namespace schema plus
//! `Tuple`, which backs composite index keys and multi-value operands.
//!
//! Comparison rules:
//! - numeric types promote int ↔ int64 ↔ double with IEEE semantics, NaN
//!   sorting last;
//! - strings compare byte-wise;
//! - tuples compare lexicographically element by element, shorter first on a
//!   tie;
//! - float equality is exact (zero tolerance).

mod payload;

pub use payload::{Payload, RowId};

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};
use crate::schema::FieldType;

/// A value stored in a row or used as a predicate operand.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent / null.
    Null,
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered sequence, used for composite keys and composite operands.
    Tuple(Vec<Value>),
}

impl Value {
    /// Returns true for `Null`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for any numeric variant.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Int64(_) | Value::Double(_))
    }

    /// Returns the type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Int64(_) => "int64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Tuple(_) => "tuple",
        }
    }

    /// Returns the boolean if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value widened to i64 if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value widened to f64 if this is numeric.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string slice if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the elements if this is a `Tuple`.
    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Converts a JSON value into an engine value.
    ///
    /// Integers land in the narrowest integer variant that holds them; JSON
    /// arrays become tuples. Objects are rejected — nested access goes through
    /// dotted field names declared in the schema.
    pub fn from_json(json: &serde_json::Value) -> Result<Value> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i64::from(i32::MIN) && i <= i64::from(i32::MAX) {
                        Ok(Value::Int(i as i32))
                    } else {
                        Ok(Value::Int64(i))
                    }
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Double(f))
                } else {
                    Err(Error::params(format!("unrepresentable number {n}")))
                }
            }
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            serde_json::Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Value::from_json(item)?);
                }
                Ok(Value::Tuple(out))
            }
            serde_json::Value::Object(_) => {
                Err(Error::params("objects are not scalar values"))
            }
        }
    }

    /// Renders the value back into JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Int64(i) => serde_json::Value::from(*i),
            Value::Double(d) => {
                serde_json::Number::from_f64(*d).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Tuple(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }

    /// Coerces the value into an operand of the given field type.
    ///
    /// Numeric fields accept integer/double literals and stringified numerics;
    /// string fields never coerce from numerics. Null passes through for every
    /// type.
    pub fn coerce_to(&self, target: FieldType) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        match target {
            FieldType::Int => match self {
                Value::Int(_) => Ok(self.clone()),
                Value::Int64(i) => i32::try_from(*i)
                    .map(Value::Int)
                    .map_err(|_| Error::params(format!("{i} does not fit an int field"))),
                Value::Double(d) if d.fract() == 0.0 => Ok(Value::Int(*d as i32)),
                Value::String(s) => s
                    .trim()
                    .parse::<i32>()
                    .map(Value::Int)
                    .map_err(|_| Error::params(format!("'{s}' is not an int literal"))),
                other => Err(Error::params(format!(
                    "cannot use {} operand on an int field",
                    other.type_name()
                ))),
            },
            FieldType::Int64 => match self {
                Value::Int(i) => Ok(Value::Int64(i64::from(*i))),
                Value::Int64(_) => Ok(self.clone()),
                Value::Double(d) if d.fract() == 0.0 => Ok(Value::Int64(*d as i64)),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int64)
                    .map_err(|_| Error::params(format!("'{s}' is not an int64 literal"))),
                other => Err(Error::params(format!(
                    "cannot use {} operand on an int64 field",
                    other.type_name()
                ))),
            },
            FieldType::Double => match self {
                Value::Int(i) => Ok(Value::Double(f64::from(*i))),
                Value::Int64(i) => Ok(Value::Double(*i as f64)),
                Value::Double(_) => Ok(self.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Double)
                    .map_err(|_| Error::params(format!("'{s}' is not a double literal"))),
                other => Err(Error::params(format!(
                    "cannot use {} operand on a double field",
                    other.type_name()
                ))),
            },
            FieldType::Bool => match self {
                Value::Bool(_) => Ok(self.clone()),
                other => Err(Error::params(format!(
                    "cannot use {} operand on a bool field",
                    other.type_name()
                ))),
            },
            FieldType::String => match self {
                Value::String(_) => Ok(self.clone()),
                other => Err(Error::params(format!(
                    "cannot use {} operand on a string field",
                    other.type_name()
                ))),
            },
        }
    }

    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Int64(_) | Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::Tuple(_) => 4,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Int64(a), Int64(b)) => a.cmp(b),
            (Int(a), Int64(b)) => i64::from(*a).cmp(b),
            (Int64(a), Int(b)) => a.cmp(&i64::from(*b)),
            (Int(_) | Int64(_), Double(b)) => {
                // NaN sorts last
                if b.is_nan() {
                    Ordering::Less
                } else {
                    let a = self.as_double().unwrap_or(0.0);
                    a.partial_cmp(b).unwrap_or(Ordering::Equal)
                }
            }
            (Double(a), Int(_) | Int64(_)) => {
                if a.is_nan() {
                    Ordering::Greater
                } else {
                    let b = other.as_double().unwrap_or(0.0);
                    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
                }
            }
            (Double(a), Double(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            },
            (String(a), String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Tuple(a), Tuple(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cmp(y) {
                        Ordering::Equal => continue,
                        non_eq => return non_eq,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            // Numerics hash through their widened form so that equal values
            // of different widths collide.
            Value::Int(_) | Value::Int64(_) | Value::Double(_) => {
                2u8.hash(state);
                if let Some(i) = self.as_int() {
                    (i as f64).to_bits().hash(state);
                } else if let Some(d) = self.as_double() {
                    d.to_bits().hash(state);
                }
            }
            Value::String(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Value::Tuple(items) => {
                4u8.hash(state);
                for item in items {
                    item.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_promotion_equality() {
        assert_eq!(Value::Int(42), Value::Int64(42));
        assert_eq!(Value::Int64(42), Value::Double(42.0));
        assert_ne!(Value::Int(42), Value::Double(42.5));
    }

    #[test]
    fn test_nan_sorts_last() {
        let mut values = vec![
            Value::Double(f64::NAN),
            Value::Double(1.0),
            Value::Int(7),
            Value::Double(-3.5),
        ];
        values.sort();
        assert_eq!(values[0], Value::Double(-3.5));
        assert_eq!(values[1], Value::Double(1.0));
        assert_eq!(values[2], Value::Int(7));
        assert!(matches!(values[3], Value::Double(d) if d.is_nan()));
    }

    #[test]
    fn test_tuple_shorter_first_on_tie() {
        let short = Value::Tuple(vec![Value::Int(1)]);
        let long = Value::Tuple(vec![Value::Int(1), Value::Int(2)]);
        assert!(short < long);

        let a = Value::Tuple(vec![Value::Int(1), Value::Int(9)]);
        let b = Value::Tuple(vec![Value::Int(2)]);
        assert!(a < b);
    }

    #[test]
    fn test_strings_compare_bytewise() {
        assert!(Value::from("abc") < Value::from("abd"));
        assert!(Value::from("Z") < Value::from("a"));
    }

    #[test]
    fn test_coerce_stringified_numeric() {
        let v = Value::from("2016").coerce_to(FieldType::Int).unwrap();
        assert_eq!(v, Value::Int(2016));

        let v = Value::from("1.5").coerce_to(FieldType::Double).unwrap();
        assert_eq!(v, Value::Double(1.5));
    }

    #[test]
    fn test_string_field_rejects_numeric_operand() {
        let err = Value::Int(7).coerce_to(FieldType::String).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Params);
    }

    #[test]
    fn test_from_json_narrow_integers() {
        let v = Value::from_json(&serde_json::json!(12)).unwrap();
        assert!(matches!(v, Value::Int(12)));

        let v = Value::from_json(&serde_json::json!(5_000_000_000i64)).unwrap();
        assert!(matches!(v, Value::Int64(5_000_000_000)));
    }

    #[test]
    fn test_json_round_trip() {
        let v = Value::Tuple(vec![Value::Int(3), Value::from("x")]);
        let back = Value::from_json(&v.to_json()).unwrap();
        assert_eq!(v, back);
    }
}
