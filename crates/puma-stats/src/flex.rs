//! Lenient serde helpers for numbers that arrive as integers, floats or
//! numeric strings depending on the server version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Numeric reading of a JSON value, `None` when it carries no number
pub(crate) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

pub(crate) fn opt_float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number(&value))
}

pub(crate) fn int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number(&value).map(|v| v as i64).unwrap_or(0))
}

pub(crate) fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(matches!(value, Value::Bool(true)))
}

pub(crate) fn opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_variants() {
        assert_eq!(number(&json!(42)), Some(42.0));
        assert_eq!(number(&json!(1.5)), Some(1.5));
        assert_eq!(number(&json!("17")), Some(17.0));
        assert_eq!(number(&json!(" 2.25 ")), Some(2.25));
        assert_eq!(number(&json!(0)), Some(0.0));
    }

    #[test]
    fn test_number_unset() {
        assert_eq!(number(&json!(null)), None);
        assert_eq!(number(&json!("")), None);
        assert_eq!(number(&json!("fast")), None);
        assert_eq!(number(&json!("NaN")), None);
        assert_eq!(number(&json!(true)), None);
        assert_eq!(number(&json!([1])), None);
        assert_eq!(number(&json!({"a": 1})), None);
    }
}
