//! Runtime values and rows.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use itertools::Itertools;

use crate::types::DataType;

/// A dynamically typed scalar value.
///
/// Numeric values compare across `Integer` and `Double`; every other pair of
/// distinct variants is ordered by variant so that values have a total order.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Varchar(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::BigInt,
            Value::Double(_) => DataType::Double,
            Value::Varchar(_) => DataType::Varchar,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Double(d) if d.fract() == 0.0 => Some(*d as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Double(_) => 2,
            Value::Varchar(_) => 3,
        }
    }

    /// Compares two values where a null on either side is resolved by `null_comparison`.
    ///
    /// Returns `null_comparison` when only `self` is null and its negation when only `other` is
    /// null, so a positive `null_comparison` puts nulls last.
    pub fn compare_nulls(&self, other: &Value, null_comparison: i32) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => null_comparison.cmp(&0),
            (false, true) => 0.cmp(&null_comparison),
            (false, false) => self.cmp(other),
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
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Integer(a), Value::Double(b)) => (*a as f64).total_cmp(b),
            (Value::Double(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Varchar(a), Value::Varchar(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            // Integral doubles must hash like the equal integer.
            Value::Integer(i) => (*i as f64).to_bits().hash(state),
            Value::Double(d) => d.to_bits().hash(state),
            Value::Varchar(s) => s.hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{:?}", d),
            Value::Varchar(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A fixed arity tuple flowing between interpreter nodes.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> &Value {
        &self.values[idx]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn concat(&self, other: &Row) -> Row {
        Row::new(self.values.iter().chain(other.values.iter()).cloned().collect())
    }

    pub fn nulls(arity: usize) -> Row {
        Row::new(vec![Value::Null; arity])
    }
}

impl Display for Row {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.values.iter().join(", "))
    }
}

/// Builds a [`Row`] from a list of values convertible into [`Value`].
#[macro_export]
macro_rules! row {
    ($($v:expr),* $(,)?) => {
        $crate::value::Row::new(vec![$($crate::value::Value::from($v)),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_numeric_compare() {
        assert_eq!(Ordering::Less, Value::Integer(1).cmp(&Value::Double(1.5)));
        assert_eq!(Value::Integer(2), Value::Double(2.0));
    }

    #[test]
    fn test_null_comparison() {
        let null = Value::Null;
        let one = Value::Integer(1);
        // nulls last
        assert_eq!(Ordering::Greater, null.compare_nulls(&one, 1));
        assert_eq!(Ordering::Less, one.compare_nulls(&null, 1));
        // nulls first
        assert_eq!(Ordering::Less, null.compare_nulls(&one, -1));
    }

    #[test]
    fn test_row_macro() {
        let r = row![1, "a", 2.5];
        assert_eq!(3, r.len());
        assert_eq!(&Value::Varchar("a".to_string()), r.get(1));
        assert_eq!("[1, 'a', 2.5]", r.to_string());
    }
}
