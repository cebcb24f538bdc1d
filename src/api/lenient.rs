//! Forgiving field decoders for browser payloads: wrong types degrade to "absent".

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::db::TagBuckets;

/// Strings and numbers become a trimmed string; anything else is `None`.
pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Integers, integral floats and numeric strings; anything else is `None`.
pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

/// Arrays of strings (blank entries dropped); a non-array is an empty list.
pub fn tags<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    })
}

/// Like [`tags`] but keeps the difference between "absent/null" and "empty list".
pub fn opt_tags<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    let v = Value::deserialize(d)?;
    if !v.is_array() {
        return Ok(None);
    }
    tags(v).map(Some).map_err(serde::de::Error::custom)
}

/// Tag buckets object; a non-object (or `null`) counts as "not sent".
pub fn buckets<'de, D: Deserializer<'de>>(d: D) -> Result<Option<TagBuckets>, D::Error> {
    Ok(match Value::deserialize(d)? {
        v @ Value::Object(_) => serde_json::from_value(v).ok(),
        _ => None,
    })
}
