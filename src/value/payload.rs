//! Typed rows.

use super::Value;

/// Engine-assigned monotonic identifier of a live row within a namespace.
pub type RowId = u64;

/// A single row: values in schema-declared field order.
///
/// Payloads are the sole source of truth; every index maps back into the row
/// store by row-id. Array fields hold a `Value::Tuple`.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    values: Vec<Value>,
}

impl Payload {
    /// Creates a payload from schema-ordered values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the value at a schema field position.
    pub fn get(&self, pos: usize) -> &Value {
        self.values.get(pos).unwrap_or(&Value::Null)
    }

    /// Replaces the value at a schema field position.
    pub fn set(&mut self, pos: usize, value: Value) {
        if pos < self.values.len() {
            self.values[pos] = value;
        }
    }

    /// Returns all values in schema order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the payload has no fields.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the scalar values of a field, expanding arrays.
    ///
    /// A scalar field yields one element; an array field yields one element
    /// per entry; `Null` yields none.
    pub fn field_values(&self, pos: usize) -> Vec<&Value> {
        match self.get(pos) {
            Value::Null => Vec::new(),
            Value::Tuple(items) => items.iter().filter(|v| !v.is_null()).collect(),
            other => vec![other],
        }
    }
}
