use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Bytes in one gibibyte
pub const GIB: i64 = 1024 * 1024 * 1024;

/// Parse an optional integer from a string
pub fn parse_optional_int(value: Option<&String>) -> Option<i64> {
    value.and_then(|v| {
        let t = v.trim();
        if t.is_empty() {
            None
        } else {
            t.parse::<i64>().ok()
        }
    })
}

/// Parse a size given in GiB into bytes. Absent, unparseable or negative sizes are zero.
pub fn parse_gib(value: Option<&String>) -> i64 {
    parse_optional_int(value)
        .filter(|v| *v > 0)
        .map(|v| v.saturating_mul(GIB))
        .unwrap_or(0)
}

/// Deserialize an int64 the provider may encode either as a number or a string
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    })
}
