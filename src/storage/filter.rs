use crate::core::{Result, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Single-column predicate. A query takes a slice of filters combined as a
/// conjunction; there is no disjunction at this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Ne, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Lt, value)
    }

    pub fn le(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Le, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Gt, value)
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Ge, value)
    }

    /// Evaluate the predicate against a stored cell. NULL only ever matches
    /// an explicit `Eq NULL` / fails `Ne NULL`; ordered comparisons against
    /// NULL are false.
    pub fn matches(&self, cell: &Value) -> Result<bool> {
        if cell.is_null() || self.value.is_null() {
            return Ok(match self.op {
                FilterOp::Eq => cell.is_null() && self.value.is_null(),
                FilterOp::Ne => cell.is_null() != self.value.is_null(),
                _ => false,
            });
        }

        let ordering = cell.compare(&self.value)?;
        Ok(match self.op {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Ne => ordering != Ordering::Equal,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Le => ordering != Ordering::Greater,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Ge => ordering != Ordering::Less,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparisons() {
        let f = Filter::le("valid_from", 100i64);
        assert!(f.matches(&Value::Integer(100)).unwrap());
        assert!(f.matches(&Value::Integer(99)).unwrap());
        assert!(!f.matches(&Value::Integer(101)).unwrap());
    }

    #[test]
    fn test_null_semantics() {
        let eq_null = Filter::new("destination_id", FilterOp::Eq, Value::Null);
        assert!(eq_null.matches(&Value::Null).unwrap());
        assert!(!eq_null.matches(&Value::Integer(1)).unwrap());

        let lt = Filter::lt("valid_to", 5i64);
        assert!(!lt.matches(&Value::Null).unwrap());
    }

    #[test]
    fn test_incompatible_types_error() {
        let f = Filter::eq("id", 1i64);
        assert!(f.matches(&Value::Text("one".into())).is_err());
    }
}
