// Value codec - maps `Value` to and from the persisted JSON representation.
//
// Maps and date-times are wrapped in a `__meta__` envelope so that a stored
// map can't be mistaken for a node's child entries on the way back in:
//
//   { "__meta__": { "type": "dict",     "value": { ... } } }
//   { "__meta__": { "type": "datetime", "value": "2024-01-01T00:00:00Z" } }

use crate::error::{NestDbError, Result};
use crate::value::{Data, Value};
use chrono::{DateTime, SecondsFormat};
use serde_json::{json, Map};

/// Encoded form of a single field, as it appears in the store file.
pub type StoredValue = serde_json::Value;

/// Encoded fields of one document.
pub type StoredData = Map<String, StoredValue>;

pub const DATA_KEY: &str = "__data__";
pub const META_KEY: &str = "__meta__";
pub const META_TYPE_KEY: &str = "type";
pub const META_VALUE_KEY: &str = "value";
pub const DICT_TAG: &str = "dict";
pub const DATETIME_TAG: &str = "datetime";

/// Reject values that cannot be represented in the store, recursing into
/// lists and maps.
pub fn validate_value(value: &Value) -> Result<()> {
    match value {
        Value::Float(f) if !f.is_finite() => Err(NestDbError::UnsupportedType(format!(
            "non-finite float {f} cannot be stored"
        ))),
        Value::List(items) => items.iter().try_for_each(validate_value),
        Value::Map(map) => validate_data(map),
        _ => Ok(()),
    }
}

pub fn validate_data(data: &Data) -> Result<()> {
    data.values().try_for_each(validate_value)
}

pub fn encode_field(value: &Value) -> StoredValue {
    match value {
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::String(s) => json!(s),
        Value::List(items) => StoredValue::Array(items.iter().map(encode_field).collect()),
        Value::Map(map) => envelope(DICT_TAG, StoredValue::Object(encode_data(map))),
        Value::DateTime(dt) => envelope(
            DATETIME_TAG,
            json!(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
        ),
    }
}

fn envelope(tag: &str, value: StoredValue) -> StoredValue {
    json!({ META_KEY: { META_TYPE_KEY: tag, META_VALUE_KEY: value } })
}

pub fn decode_field(stored: &StoredValue) -> Result<Value> {
    match stored {
        StoredValue::Object(obj) => {
            let meta = obj
                .get(META_KEY)
                .and_then(StoredValue::as_object)
                .ok_or_else(|| NestDbError::Corrupt(format!("object without envelope: {stored}")))?;
            let inner = meta
                .get(META_VALUE_KEY)
                .ok_or_else(|| NestDbError::Corrupt(format!("envelope without value: {stored}")))?;
            match meta.get(META_TYPE_KEY).and_then(StoredValue::as_str) {
                Some(DICT_TAG) => match inner {
                    StoredValue::Object(fields) => Ok(Value::Map(decode_data(fields)?)),
                    other => Err(NestDbError::Corrupt(format!("dict envelope holds {other}"))),
                },
                Some(DATETIME_TAG) => {
                    let text = inner.as_str().ok_or_else(|| {
                        NestDbError::Corrupt(format!("datetime envelope holds {inner}"))
                    })?;
                    DateTime::parse_from_rfc3339(text)
                        .map(Value::DateTime)
                        .map_err(|e| NestDbError::Corrupt(format!("bad datetime '{text}': {e}")))
                }
                other => Err(NestDbError::Corrupt(format!(
                    "unknown envelope type {other:?}"
                ))),
            }
        }
        raw => Value::from_json(raw.clone())
            .map_err(|e| NestDbError::Corrupt(format!("undecodable value {raw}: {e}"))),
    }
}

pub fn encode_data(data: &Data) -> StoredData {
    data.iter()
        .map(|(k, v)| (k.clone(), encode_field(v)))
        .collect()
}

pub fn decode_data(stored: &StoredData) -> Result<Data> {
    stored
        .iter()
        .map(|(k, v)| Ok((k.clone(), decode_field(v)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn sample() -> Data {
        let when = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 0)
            .unwrap();
        let mut inner = Data::new();
        inner.insert("city".into(), Value::from("Paris"));
        inner.insert("since".into(), Value::from(when));

        let mut data = Data::new();
        data.insert("name".into(), Value::from("Alice"));
        data.insert("age".into(), Value::Int(31));
        data.insert("score".into(), Value::Float(9.5));
        data.insert("active".into(), Value::Bool(true));
        data.insert("address".into(), Value::Map(inner.clone()));
        data.insert(
            "history".into(),
            Value::List(vec![Value::Map(inner), Value::List(vec![Value::Int(1)])]),
        );
        data.insert("created".into(), Value::from(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()));
        data
    }

    #[test]
    fn test_round_trip_nested_values() {
        let data = sample();
        let decoded = decode_data(&encode_data(&data)).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_map_is_wrapped_in_dict_envelope() {
        let mut map = Data::new();
        map.insert("x".into(), Value::Int(1));
        let stored = encode_field(&Value::Map(map));
        assert_eq!(stored[META_KEY][META_TYPE_KEY], DICT_TAG);
        assert_eq!(stored[META_KEY][META_VALUE_KEY]["x"], 1);
    }

    #[test]
    fn test_datetime_is_wrapped_in_datetime_envelope() {
        let dt = Utc.with_ymd_and_hms(2021, 6, 5, 4, 3, 2).unwrap();
        let stored = encode_field(&Value::from(dt));
        assert_eq!(stored[META_KEY][META_TYPE_KEY], DATETIME_TAG);
        assert_eq!(stored[META_KEY][META_VALUE_KEY], "2021-06-05T04:03:02+00:00");
    }

    #[test]
    fn test_primitives_pass_through() {
        assert_eq!(encode_field(&Value::Int(7)), json!(7));
        assert_eq!(encode_field(&Value::from("s")), json!("s"));
        assert_eq!(decode_field(&json!([1, "a"])).unwrap(), Value::from(vec![Value::Int(1), Value::from("a")]));
    }

    #[test]
    fn test_bare_object_is_corrupt() {
        let result = decode_field(&json!({ "x": 1 }));
        assert!(matches!(result, Err(NestDbError::Corrupt(_))));
    }

    #[test]
    fn test_validate_rejects_non_finite_float_in_list() {
        let value = Value::List(vec![Value::Float(1.0), Value::Float(f64::NAN)]);
        assert!(matches!(validate_value(&value), Err(NestDbError::UnsupportedType(_))));
    }
}
