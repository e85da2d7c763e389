use serde_json::Value;
use std::time::SystemTime;
use time::format_description::well_known::Rfc3339;

pub fn rfc3339(t: SystemTime) -> String {
    time::OffsetDateTime::from(t)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn try_parse_i64(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok()
}

pub fn try_parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer coercion for JSON scalars. Floats truncate toward zero,
/// strings must hold an integer.
pub fn try_json_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => try_parse_i64(s),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

pub fn try_json_u64(v: &Value) -> Option<u64> {
    try_json_i64(v).and_then(|n| u64::try_from(n).ok())
}

pub fn float_to_rounded_string(v: f64, precision: usize) -> String {
    format!("{v:.precision$}")
}
