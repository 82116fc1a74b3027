//! Values flowing through bound expressions.
//!
//! Every evaluated value carries a timestamp; rows are ordered lists of
//! (column path, value) cells, each cell timestamped independently.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::{Result, SqlError};

pub type Timestamp = DateTime<Utc>;

/// The timestamp attached to pure constants.
pub fn negative_infinity() -> Timestamp {
    DateTime::<Utc>::MIN_UTC
}

/// Which cell to retain when a column path appears more than once in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueFilter {
    #[default]
    Latest,
    Earliest,
}

/// A dot-separated column path; segments may need quoting when printed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnPath(Vec<String>);

impl ColumnPath {
    pub fn new(elements: Vec<String>) -> Self {
        ColumnPath(elements)
    }

    pub fn single(element: impl Into<String>) -> Self {
        ColumnPath(vec![element.into()])
    }

    pub fn empty() -> Self {
        ColumnPath(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn elements(&self) -> &[String] {
        &self.0
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(|s| s.as_str())
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(|s| s.as_str())
    }

    pub fn push(&mut self, element: impl Into<String>) {
        self.0.push(element.into());
    }

    pub fn starts_with(&self, prefix: &ColumnPath) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Replace `prefix` with `replacement`; `None` if the prefix does not match.
    pub fn replace_prefix(&self, prefix: &ColumnPath, replacement: &ColumnPath) -> Option<ColumnPath> {
        if !self.starts_with(prefix) {
            return None;
        }
        let mut elements = replacement.0.clone();
        elements.extend_from_slice(&self.0[prefix.0.len()..]);
        Some(ColumnPath(elements))
    }

    fn needs_quoting(element: &str) -> bool {
        element.is_empty()
            || element.chars().next().map_or(false, |c| c.is_ascii_digit())
            || !element.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

impl fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            if Self::needs_quoting(element) {
                write!(f, "\"{}\"", element.replace('"', "\"\""))?;
            } else {
                write!(f, "{}", element)?;
            }
        }
        Ok(())
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(Timestamp),
    Interval { months: u32, days: u32, seconds: f64 },
    Embedding(Vec<f64>),
    Row(Vec<(ColumnPath, ExpressionValue)>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Interval { .. } => "interval",
            Value::Embedding(_) => "embedding",
            Value::Row(_) => "row",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(self, Value::Timestamp(_))
    }

    pub fn is_interval(&self) -> bool {
        matches!(self, Value::Interval { .. })
    }

    /// SQL truthiness: null is neither true nor false.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Timestamp(_) | Value::Interval { .. } => true,
            Value::Embedding(e) => !e.is_empty(),
            Value::Row(r) => !r.is_empty(),
        }
    }

    pub fn is_false(&self) -> bool {
        !self.is_null() && !self.is_true()
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(*b as i64 as f64),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => 1,
            Value::String(_) => 2,
            Value::Timestamp(_) => 3,
            Value::Interval { .. } => 4,
            Value::Embedding(_) => 5,
            Value::Row(_) => 6,
        }
    }

    /// Total ordering across the value lattice, used by ORDER BY.
    /// Nulls sort first, then numbers (NaN last among them), strings,
    /// timestamps, intervals, embeddings, rows.
    pub fn compare(&self, other: &Value) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (a, b) if a.is_number() || matches!(a, Value::Bool(_)) => {
                let x = a.as_f64().unwrap_or(f64::NAN);
                let y = b.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or_else(|| match (x.is_nan(), y.is_nan()) {
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    _ => Ordering::Equal,
                })
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (
                Value::Interval { months, days, seconds },
                Value::Interval { months: m2, days: d2, seconds: s2 },
            ) => {
                let a = (*months as f64) * 30.0 * 86400.0 + (*days as f64) * 86400.0 + seconds;
                let b = (*m2 as f64) * 30.0 * 86400.0 + (*d2 as f64) * 86400.0 + s2;
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            (Value::Embedding(a), Value::Embedding(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Value::Row(a), Value::Row(b)) => a.len().cmp(&b.len()),
            _ => Ordering::Equal,
        }
    }

    /// Equality with numeric cross-type coercion, used by IN and simple CASE.
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self.is_number() && other.is_number() {
            return self.as_f64() == other.as_f64();
        }
        self == other
    }

    /// CAST support; target names are lowercase.
    pub fn cast_to(&self, target: &str) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        match target {
            "string" => Ok(Value::String(self.to_display_string())),
            "integer" => match self {
                Value::Bool(b) => Ok(Value::Int(*b as i64)),
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(f) => Ok(Value::Int(*f as i64)),
                Value::String(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                    SqlError::evaluation(format!("cannot cast '{}' to integer", s))
                }),
                other => Err(SqlError::evaluation(format!(
                    "cannot cast {} to integer",
                    other.type_name()
                ))),
            },
            "number" => match self {
                Value::String(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                    SqlError::evaluation(format!("cannot cast '{}' to number", s))
                }),
                other => other.as_f64().map(Value::Float).ok_or_else(|| {
                    SqlError::evaluation(format!("cannot cast {} to number", other.type_name()))
                }),
            },
            "boolean" => Ok(Value::Bool(self.is_true())),
            "timestamp" => match self {
                Value::Timestamp(ts) => Ok(Value::Timestamp(*ts)),
                Value::Int(i) => Ok(Value::Timestamp(
                    Utc.timestamp_opt(*i, 0).single().ok_or_else(|| {
                        SqlError::evaluation(format!("timestamp out of range: {}", i))
                    })?,
                )),
                Value::Float(f) => {
                    let secs = f.trunc() as i64;
                    let nanos = ((f.fract()) * 1e9) as u32;
                    Utc.timestamp_opt(secs, nanos)
                        .single()
                        .map(Value::Timestamp)
                        .ok_or_else(|| {
                            SqlError::evaluation(format!("timestamp out of range: {}", f))
                        })
                }
                Value::String(s) => s
                    .parse::<DateTime<Utc>>()
                    .map(Value::Timestamp)
                    .map_err(|_| {
                        SqlError::evaluation(format!("cannot cast '{}' to timestamp", s))
                    }),
                other => Err(SqlError::evaluation(format!(
                    "cannot cast {} to timestamp",
                    other.type_name()
                ))),
            },
            other => Err(SqlError::evaluation(format!(
                "unknown type name '{}' for CAST",
                other
            ))),
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Timestamp(ts) => ts.to_rfc3339(),
            Value::Interval { months, days, seconds } => {
                format!("{}mo {}d {}s", months, days, seconds)
            }
            Value::Embedding(e) => format!("{:?}", e),
            Value::Row(_) => "<row>".to_string(),
        }
    }
}

/// A value paired with its timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionValue {
    pub value: Value,
    pub timestamp: Timestamp,
}

impl ExpressionValue {
    pub fn new(value: Value, timestamp: Timestamp) -> Self {
        ExpressionValue { value, timestamp }
    }

    /// A constant, timestamped at negative infinity.
    pub fn constant(value: Value) -> Self {
        ExpressionValue {
            value,
            timestamp: negative_infinity(),
        }
    }

    pub fn null() -> Self {
        Self::constant(Value::Null)
    }

    pub fn is_true(&self) -> bool {
        self.value.is_true()
    }

    pub fn is_false(&self) -> bool {
        self.value.is_false()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Row cells for a row-valued expression, after applying the filter
    /// policy to duplicate column paths.
    pub fn row_cells(&self, filter: ValueFilter) -> Vec<(ColumnPath, ExpressionValue)> {
        match &self.value {
            Value::Row(cells) => filter_cells(cells.clone(), filter),
            _ => Vec::new(),
        }
    }
}

/// Apply a value-selection policy to duplicate column paths within a row.
pub fn filter_cells(
    cells: Vec<(ColumnPath, ExpressionValue)>,
    filter: ValueFilter,
) -> Vec<(ColumnPath, ExpressionValue)> {
    let mut result: Vec<(ColumnPath, ExpressionValue)> = Vec::with_capacity(cells.len());
    for (path, value) in cells {
        if let Some(existing) = result.iter_mut().find(|(p, _)| *p == path) {
            let replace = match filter {
                ValueFilter::Latest => value.timestamp >= existing.1.timestamp,
                ValueFilter::Earliest => value.timestamp < existing.1.timestamp,
            };
            if replace {
                existing.1 = value;
            }
        } else {
            result.push((path, value));
        }
    }
    result
}

/// A named row as handed to the WHEN filter: the row's name plus its
/// column cells, each with its own timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRow {
    pub name: ColumnPath,
    pub columns: Vec<(ColumnPath, Value, Timestamp)>,
}

impl NamedRow {
    pub fn new(name: ColumnPath, columns: Vec<(ColumnPath, Value, Timestamp)>) -> Self {
        NamedRow { name, columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::Bool(true).is_true());
        assert!(Value::Int(1).is_true());
        assert!(!Value::Int(0).is_true());
        assert!(Value::Int(0).is_false());
        assert!(!Value::Null.is_true());
        assert!(!Value::Null.is_false());
        assert!(Value::String("x".to_string()).is_true());
        assert!(Value::String(String::new()).is_false());
    }

    #[test]
    fn test_compare_across_types() {
        assert_eq!(Value::Null.compare(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Int(3).compare(&Value::Float(3.0)), Ordering::Equal);
        assert_eq!(
            Value::Float(1e9).compare(&Value::String("a".to_string())),
            Ordering::Less
        );
        assert_eq!(
            Value::String("b".to_string()).compare(&Value::String("a".to_string())),
            Ordering::Greater
        );
    }

    #[test]
    fn test_loose_eq() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).loose_eq(&Value::String("1".to_string())));
    }

    #[test]
    fn test_casts() {
        assert_eq!(
            Value::String("42".to_string()).cast_to("integer").unwrap(),
            Value::Int(42)
        );
        assert_eq!(Value::Float(3.7).cast_to("integer").unwrap(), Value::Int(3));
        assert_eq!(Value::Int(0).cast_to("boolean").unwrap(), Value::Bool(false));
        assert_eq!(
            Value::Int(7).cast_to("string").unwrap(),
            Value::String("7".to_string())
        );
        assert!(Value::String("x".to_string()).cast_to("integer").is_err());
        assert!(Value::Int(1).cast_to("rowset").is_err());
    }

    #[test]
    fn test_column_path_display() {
        let plain = ColumnPath::new(vec!["a".to_string(), "b_2".to_string()]);
        assert_eq!(plain.to_string(), "a.b_2");

        let quoted = ColumnPath::new(vec!["a b".to_string(), "c\"d".to_string()]);
        assert_eq!(quoted.to_string(), "\"a b\".\"c\"\"d\"");
    }

    #[test]
    fn test_replace_prefix() {
        let path = ColumnPath::new(vec!["svd".to_string(), "x".to_string()]);
        let renamed = path
            .replace_prefix(&ColumnPath::single("svd"), &ColumnPath::single("mysvd"))
            .unwrap();
        assert_eq!(renamed.to_string(), "mysvd.x");
        assert!(path
            .replace_prefix(&ColumnPath::single("other"), &ColumnPath::single("x"))
            .is_none());
    }

    #[test]
    fn test_filter_cells_latest() {
        let t1 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let cells = vec![
            (ColumnPath::single("x"), ExpressionValue::new(Value::Int(1), t1)),
            (ColumnPath::single("x"), ExpressionValue::new(Value::Int(2), t2)),
        ];
        let latest = filter_cells(cells.clone(), ValueFilter::Latest);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].1.value, Value::Int(2));

        let earliest = filter_cells(cells, ValueFilter::Earliest);
        assert_eq!(earliest[0].1.value, Value::Int(1));
    }
}
