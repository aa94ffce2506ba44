/// Parse an image flag. Blank or absent values fall back to `default`;
/// anything other than `1`, `true`, `yes` or `on` is false.
pub fn parse_flag(value: Option<&String>, default: bool) -> bool {
    value
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
