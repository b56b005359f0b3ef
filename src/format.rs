use serde_json::Value;

/// "No data" marker used by the census layer for numeric fields.
pub const SENTINEL: f64 = -999.0;

/// Formats a numeric attribute value for display. Fields whose label carries
/// the `($)` marker render as whole dollars, everything else as a plain
/// grouped integer. The -999 sentinel always renders as "N/A".
pub fn format_number(label: &str, value: f64) -> String {
    if value == SENTINEL {
        return "N/A".to_string();
    }
    let grouped = group_digits(value.round() as i64);
    if label.contains("($)") {
        format!("${grouped}")
    } else {
        grouped
    }
}

/// Formats a raw attribute as it came off the feature service. Nulls and the
/// "-999" string are sentinels; non-numeric strings pass through unchanged.
pub fn format_field(label: &str, value: &Value) -> String {
    match value {
        Value::Null => "N/A".to_string(),
        Value::String(s) if s == "-999" => "N/A".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(v) => format_number(label, v),
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn group_digits(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sentinel_is_na_for_every_field() {
        assert_eq!(format_number("Population", SENTINEL), "N/A");
        assert_eq!(format_number("Net Cash Farm Income ($)", SENTINEL), "N/A");
    }

    #[test]
    fn currency_marker_selects_dollar_formatting() {
        assert_eq!(format_number("Net Cash Farm Income ($)", 1234567.0), "$1,234,567");
        assert_eq!(format_number("Population", 1234567.0), "1,234,567");
    }

    #[test]
    fn grouping_handles_small_and_negative_values() {
        assert_eq!(format_number("Population", 0.0), "0");
        assert_eq!(format_number("Population", 999.0), "999");
        assert_eq!(format_number("Population", 1000.0), "1,000");
        assert_eq!(format_number("Population", -12345.0), "-12,345");
    }

    #[test]
    fn raw_field_sentinels_are_na() {
        assert_eq!(format_field("Population", &Value::Null), "N/A");
        assert_eq!(format_field("Population", &json!("-999")), "N/A");
        assert_eq!(format_field("Population", &json!(-999)), "N/A");
        assert_eq!(format_field("County", &json!("Ada")), "Ada");
    }
}
