//! Bounds and coercions applied to every client-supplied value before it is
//! written to the analytics store.

pub const STRING_MAX_LENGTH: usize = 2048;
pub const SHORT_STRING_MAX_LENGTH: usize = 255;
pub const SESSION_ID_MAX_LENGTH: usize = 128;

pub const METRIC_MIN: f64 = 0.0;
pub const METRIC_MAX: f64 = 300_000.0;

/// Trims, strips control characters and angle brackets, and truncates to
/// `max_length` characters. Returns `None` when nothing is left.
pub fn sanitize_string(value: Option<&str>, max_length: usize) -> Option<String> {
    let cleaned: String = value?
        .trim()
        .chars()
        .filter(|c| !c.is_control() && *c != '<' && *c != '>')
        .take(max_length)
        .collect();

    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_owned())
    }
}

pub fn validate_session_id(value: Option<&str>) -> Option<String> {
    let session_id = sanitize_string(value, SESSION_ID_MAX_LENGTH)?;
    session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        .then_some(session_id)
}

/// Timing metrics are rounded to whole milliseconds, then dropped when
/// outside of `[0, 300000]`.
pub fn clamp_timing_metric(value: Option<f64>) -> Option<f64> {
    clamp_metric(value.map(f64::round))
}

/// Same bounds as timing metrics, without rounding. Used for layout shift
/// scores, which are fractional.
pub fn clamp_metric(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && (METRIC_MIN..=METRIC_MAX).contains(v))
}

/// Finite numbers only, rounded to an integer.
pub fn whole_number(value: Option<f64>) -> Option<i64> {
    value.filter(|v| v.is_finite()).map(|v| v.round() as i64)
}

/// Serde helpers that never fail: a value of the wrong JSON type is treated
/// as absent, so one bad field cannot reject a whole beacon.
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64(),
            _ => None,
        })
    }

    pub fn boolean<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Bool(b) => Some(b),
            _ => None,
        })
    }

    /// Strings, numbers and booleans, rendered as a string.
    pub fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }
}
