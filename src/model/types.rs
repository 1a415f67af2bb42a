//! Column data types and cell values.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Data type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Decimal,
    Date,
    Time,
    Timestamp,
    /// Type not yet known (e.g. column of an unbound source).
    Unknown,
}

impl DataType {
    /// Parse a data type from its lowercase name.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "string" | "char" => Some(DataType::String),
            "boolean" | "bool" => Some(DataType::Boolean),
            "byte" => Some(DataType::Byte),
            "short" => Some(DataType::Short),
            "integer" | "int" => Some(DataType::Integer),
            "long" => Some(DataType::Long),
            "float" => Some(DataType::Float),
            "double" => Some(DataType::Double),
            "decimal" => Some(DataType::Decimal),
            "date" => Some(DataType::Date),
            "time" => Some(DataType::Time),
            "timestamp" | "datetime" => Some(DataType::Timestamp),
            "unknown" => Some(DataType::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Byte => "byte",
            DataType::Short => "short",
            DataType::Integer => "integer",
            DataType::Long => "long",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Decimal => "decimal",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::Timestamp => "timestamp",
            DataType::Unknown => "unknown",
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Date | DataType::Time | DataType::Timestamp)
    }

    /// Position on the numeric widening ladder.
    fn numeric_rank(&self) -> Option<u8> {
        match self {
            DataType::Byte => Some(0),
            DataType::Short => Some(1),
            DataType::Integer => Some(2),
            DataType::Long => Some(3),
            DataType::Float => Some(4),
            DataType::Double => Some(5),
            DataType::Decimal => Some(6),
            _ => None,
        }
    }

    /// Merge two column types into the narrowest type holding both.
    ///
    /// Returns `None` when the types cannot share a column (e.g. string and
    /// integer). `Unknown` merges with anything.
    pub fn merge(self, other: DataType) -> Option<DataType> {
        if self == other {
            return Some(self);
        }

        match (self, other) {
            (DataType::Unknown, t) | (t, DataType::Unknown) => Some(t),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                // Decimal against a binary float loses exactness either way.
                if matches!((a, b), (DataType::Decimal, DataType::Float | DataType::Double))
                    || matches!((a, b), (DataType::Float | DataType::Double, DataType::Decimal))
                {
                    return Some(DataType::Double);
                }
                let (ra, rb) = (a.numeric_rank()?, b.numeric_rank()?);
                Some(if ra >= rb { a } else { b })
            }
            (DataType::Date, DataType::Timestamp) | (DataType::Timestamp, DataType::Date) => {
                Some(DataType::Timestamp)
            }
            _ => None,
        }
    }

    /// Whether two types can share a concatenated column.
    pub fn is_mergeable(self, other: DataType) -> bool {
        self.merge(other).is_some()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The natural data type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Unknown,
            Value::Bool(_) => DataType::Boolean,
            Value::Int(_) => DataType::Long,
            Value::Float(_) => DataType::Double,
            Value::String(_) => DataType::String,
            Value::Date(_) => DataType::Date,
            Value::Timestamp(_) => DataType::Timestamp,
        }
    }

    /// Convert the value to the given column type.
    ///
    /// Conversion failures yield `Null`, which conditions treat as "no match".
    pub fn coerce(&self, to: DataType) -> Value {
        match (self, to) {
            (Value::Null, _) | (_, DataType::Unknown) => self.clone(),
            (Value::String(s), DataType::String) => Value::String(s.clone()),
            (v, DataType::String) => Value::String(v.to_string()),
            (Value::String(s), t) if t.is_numeric() => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Value::Int(i).coerce(t)
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    Value::Float(f).coerce(t)
                } else {
                    Value::Null
                }
            }
            (Value::Float(f), DataType::Byte | DataType::Short | DataType::Integer | DataType::Long) => {
                Value::Int(f.trunc() as i64)
            }
            (v, DataType::Float | DataType::Double | DataType::Decimal) => {
                v.as_f64().map(Value::Float).unwrap_or(Value::Null)
            }
            (Value::Int(_), t) if t.is_numeric() => self.clone(),
            (Value::Bool(b), t) if t.is_numeric() => Value::Int(i64::from(*b)),
            (Value::String(s), DataType::Boolean) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => Value::Null,
            },
            (Value::Int(i), DataType::Boolean) => Value::Bool(*i != 0),
            (Value::String(s), DataType::Date) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .unwrap_or(Value::Null),
            (Value::String(s), DataType::Timestamp) => {
                NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
                    .or_else(|_| NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S"))
                    .map(Value::Timestamp)
                    .or_else(|_| {
                        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                            .map(|d| Value::Timestamp(d.and_time(chrono::NaiveTime::MIN)))
                    })
                    .unwrap_or(Value::Null)
            }
            (Value::Timestamp(ts), DataType::Date) => Value::Date(ts.date()),
            (Value::Date(d), DataType::Timestamp) => {
                Value::Timestamp(d.and_time(chrono::NaiveTime::MIN))
            }
            _ => self.clone(),
        }
    }

    /// Compare two values for condition evaluation.
    ///
    /// Numbers compare numerically across int/float, dates against
    /// timestamps at midnight. Mismatched kinds and nulls are unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Timestamp(b)) => {
                Some(a.and_time(chrono::NaiveTime::MIN).cmp(b))
            }
            (Value::Timestamp(a), Value::Date(b)) => {
                Some(a.cmp(&b.and_time(chrono::NaiveTime::MIN)))
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => f.write_str(ryu::Buffer::new().format(*v)),
            Value::String(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
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

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}
