use crate::error::{NestDbError, Result};
use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;

/// Field name -> value mapping held by a document.
pub type Data = IndexMap<String, Value>;

/// Every value a document field can hold. Nothing outside this set can be
/// stored; in particular there is no null.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(Data),
    DateTime(DateTime<FixedOffset>),
}

/// Type tag of a [`Value`], used to key the lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    String,
    List,
    Map,
    DateTime,
}

impl ValueKind {
    pub const ALL: [ValueKind; 7] = [
        ValueKind::Bool,
        ValueKind::Int,
        ValueKind::Float,
        ValueKind::String,
        ValueKind::List,
        ValueKind::Map,
        ValueKind::DateTime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::DateTime => "datetime",
        }
    }

    // Cross-kind sort rank. Int and Float share a rank and compare numerically.
    fn rank(self) -> u8 {
        match self {
            ValueKind::Bool => 0,
            ValueKind::Int | ValueKind::Float => 1,
            ValueKind::DateTime => 2,
            ValueKind::String => 3,
            ValueKind::List => 4,
            ValueKind::Map => 5,
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
            Value::DateTime(_) => ValueKind::DateTime,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Data> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Build a value from plain JSON. `null` is rejected since it is not
    /// a storable type; strings are never sniffed for dates.
    pub fn from_json(json: serde_json::Value) -> Result<Value> {
        Ok(match json {
            serde_json::Value::Null => {
                return Err(NestDbError::UnsupportedType(
                    "null is not a supported value".into(),
                ))
            }
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().ok_or_else(|| {
                    NestDbError::UnsupportedType(format!("number {n} is out of range"))
                })?),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(
                items
                    .into_iter()
                    .map(Value::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            serde_json::Value::Object(fields) => Value::Map(data_from_map(fields)?),
        })
    }

    /// Plain JSON rendering for display and export. Date-times become
    /// RFC 3339 strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(data_to_json(map)),
            Value::DateTime(dt) => {
                serde_json::Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }

    /// Ordering between comparable values: same kind, or Int against Float.
    /// `None` means the pair cannot be ordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Total order used for sorting and cursors: kinds are ranked, values
    /// of the same rank compare naturally.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        let (lk, rk) = (self.kind().rank(), other.kind().rank());
        if lk != rk {
            return lk.cmp(&rk);
        }
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.total_cmp(y) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Map(a), Value::Map(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    match ka.cmp(kb).then_with(|| va.total_cmp(vb)) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }

    /// Equality that treats `1` and `1.0` as the same number.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
                self.compare(other) == Some(Ordering::Equal)
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loosely_equals(y))
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
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

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Data> for Value {
    fn from(map: Data) -> Self {
        Value::Map(map)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(dt: DateTime<Tz>) -> Self {
        Value::DateTime(dt.fixed_offset())
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = NestDbError;

    fn try_from(json: serde_json::Value) -> Result<Self> {
        Value::from_json(json)
    }
}

fn data_from_map(fields: serde_json::Map<String, serde_json::Value>) -> Result<Data> {
    fields
        .into_iter()
        .map(|(k, v)| Ok((k, Value::from_json(v)?)))
        .collect()
}

/// Build document data from a JSON object.
pub fn data_from_json(json: serde_json::Value) -> Result<Data> {
    match json {
        serde_json::Value::Object(fields) => data_from_map(fields),
        other => Err(NestDbError::UnsupportedType(format!(
            "document data must be an object, got {other}"
        ))),
    }
}

pub fn data_to_json(data: &Data) -> serde_json::Map<String, serde_json::Value> {
    data.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_maps_every_kind() {
        let value = Value::from_json(json!({
            "flag": true,
            "count": 3,
            "ratio": 0.5,
            "name": "Alice",
            "tags": ["a", "b"],
            "address": { "city": "Paris" }
        }))
        .unwrap();

        let map = value.as_map().unwrap();
        assert_eq!(map["flag"], Value::Bool(true));
        assert_eq!(map["count"], Value::Int(3));
        assert_eq!(map["ratio"], Value::Float(0.5));
        assert_eq!(map["name"].as_str(), Some("Alice"));
        assert_eq!(map["tags"].as_list().unwrap().len(), 2);
        assert_eq!(map["address"].kind(), ValueKind::Map);
    }

    #[test]
    fn test_null_is_unsupported() {
        let result = Value::from_json(json!({ "a": [1, null] }));
        assert!(matches!(result, Err(NestDbError::UnsupportedType(_))));
    }

    #[test]
    fn test_compare_numbers_across_int_and_float() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert!(Value::Int(1).loosely_equals(&Value::Float(1.0)));
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_incomparable_kinds() {
        assert_eq!(Value::Int(1).compare(&Value::from("1")), None);
    }

    #[test]
    fn test_total_order_ranks_kinds() {
        let mut values = vec![
            Value::from("b"),
            Value::Int(10),
            Value::Bool(false),
            Value::Float(2.5),
            Value::from("a"),
        ];
        values.sort_by(Value::total_cmp);
        assert_eq!(
            values,
            vec![
                Value::Bool(false),
                Value::Float(2.5),
                Value::Int(10),
                Value::from("a"),
                Value::from("b"),
            ]
        );
    }

    #[test]
    fn test_display_strings_are_raw() {
        assert_eq!(Value::from("abc").to_string(), "abc");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
    }
}
