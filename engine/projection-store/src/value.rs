//! Dynamically typed cells for scraped datasets and metadata maps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One record keyed by column name. Missing keys and [`Value::Null`] are equivalent.
pub type Row = BTreeMap<String, Value>;

/// A single cell of a scraped dataset or a metadata entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Value {
    /// Parse a raw text cell (CSV, command line) into the narrowest matching value.
    ///
    /// Empty cells become `Null`; numbers become `Int` or `Float`; `true`/`false`
    /// become `Bool`; anything else is kept as text.
    pub fn parse_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Text(trimmed.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Integer view; integral floats and numeric text are accepted
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean view; accepts the spellings scrapers use for home/away flags
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" | "home" | "h" => Some(true),
                "false" | "f" | "no" | "n" | "0" | "away" | "a" | "@" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Build a [`Row`] from `(column, value)` pairs
pub fn row<K, V, I>(pairs: I) -> Row
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell() {
        assert_eq!(Value::parse_cell(""), Value::Null);
        assert_eq!(Value::parse_cell("  "), Value::Null);
        assert_eq!(Value::parse_cell("12"), Value::Int(12));
        assert_eq!(Value::parse_cell("12.5"), Value::Float(12.5));
        assert_eq!(Value::parse_cell("TRUE"), Value::Bool(true));
        assert_eq!(Value::parse_cell("-"), Value::Text("-".to_string()));
        assert_eq!(Value::parse_cell("00-0023459"), Value::Text("00-0023459".to_string()));
        assert_eq!(Value::parse_cell("NaN"), Value::Text("NaN".to_string()));
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::Float(3.5).as_i64(), None);
        assert_eq!(Value::Text(" 7 ".to_string()).as_i64(), Some(7));
        assert_eq!(Value::Int(4).as_f64(), Some(4.0));
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn test_bool_spellings() {
        assert_eq!(Value::from("H").as_bool(), Some(true));
        assert_eq!(Value::from("@").as_bool(), Some(false));
        assert_eq!(Value::Int(1).as_bool(), Some(true));
        assert_eq!(Value::from("maybe").as_bool(), None);
    }

    #[test]
    fn test_json_round_trip_of_untagged_values() {
        let parsed: Row =
            serde_json::from_str(r#"{"name": "Tom Brady", "week": 3, "fp": 21.5, "opp": null}"#)
                .unwrap();
        assert_eq!(parsed["name"], Value::from("Tom Brady"));
        assert_eq!(parsed["week"], Value::Int(3));
        assert_eq!(parsed["fp"], Value::Float(21.5));
        assert!(parsed["opp"].is_null());
    }
}
