//! JSON encoding of row values shared by the drivers.
//!
//! Rows go out as JSON arrays in column order. Dates and timestamps become
//! epoch milliseconds, times `HH:MM:SS`, binary base64 and non-finite floats
//! the strings `NaN`, `Infinity` and `-Infinity`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::ConnectorError;

pub fn float_value(v: f64) -> Value {
    if v.is_nan() {
        Value::String("NaN".into())
    } else if v.is_infinite() {
        Value::String(if v > 0.0 { "Infinity" } else { "-Infinity" }.into())
    } else {
        serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Integral decimals stay exact; others go through `f64`.
pub fn decimal_value(v: Decimal) -> Value {
    if v.fract().is_zero() {
        if let Some(i) = v.to_i64() {
            return Value::from(i);
        }
    }
    match v.to_f64() {
        Some(f) => float_value(f),
        None => Value::String(v.to_string()),
    }
}

pub fn date_value(v: NaiveDate) -> Value {
    v.and_hms_opt(0, 0, 0)
        .map(|dt| Value::from(dt.and_utc().timestamp_millis()))
        .unwrap_or(Value::Null)
}

pub fn datetime_value(v: NaiveDateTime) -> Value {
    Value::from(v.and_utc().timestamp_millis())
}

pub fn timestamptz_value(v: DateTime<Utc>) -> Value {
    Value::from(v.timestamp_millis())
}

pub fn time_value(v: NaiveTime) -> Value {
    Value::String(v.format("%H:%M:%S").to_string())
}

pub fn binary_value(v: &[u8]) -> Value {
    Value::String(STANDARD.encode(v))
}

pub fn row_bytes(values: Vec<Value>) -> Result<Bytes, ConnectorError> {
    serde_json::to_vec(&Value::Array(values))
        .map(Bytes::from)
        .map_err(|e| ConnectorError::QueryFailed(format!("cannot encode row: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn non_finite_floats_are_strings() {
        assert_eq!(float_value(f64::NAN), Value::String("NaN".into()));
        assert_eq!(float_value(f64::INFINITY), Value::String("Infinity".into()));
        assert_eq!(float_value(f64::NEG_INFINITY), Value::String("-Infinity".into()));
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
    }

    #[test]
    fn decimals() {
        assert_eq!(decimal_value(Decimal::from_str("42").unwrap()), serde_json::json!(42));
        assert_eq!(decimal_value(Decimal::from_str("4.25").unwrap()), serde_json::json!(4.25));
    }

    #[test]
    fn temporal_values() {
        let d = NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        assert_eq!(date_value(d), serde_json::json!(86_400_000));
        let dt = d.and_hms_opt(0, 0, 1).unwrap();
        assert_eq!(datetime_value(dt), serde_json::json!(86_401_000));
        let t = NaiveTime::from_hms_opt(13, 5, 9).unwrap();
        assert_eq!(time_value(t), serde_json::json!("13:05:09"));
    }

    #[test]
    fn binary_is_base64() {
        assert_eq!(binary_value(b"hi"), serde_json::json!("aGk="));
    }

    #[test]
    fn row_is_a_json_array() {
        let bytes = row_bytes(vec![Value::from(1), Value::Null, Value::from("x")]).unwrap();
        assert_eq!(&bytes[..], br#"[1,null,"x"]"#);
    }
}
