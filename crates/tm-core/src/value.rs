//! Values that segment queries compare against

use crate::Element;

/// A resolved event field or variable value
///
/// `Undefined` and `Null` are distinct: a declared variable that has no value
/// yet is `Undefined`, an explicit JSON `null` is `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Element(Box<Element>),
    Json(serde_json::Value),
}

impl FieldValue {
    /// Convert a JSON value
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(FieldValue::Number)
                .unwrap_or_else(|| FieldValue::Json(value.clone())),
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            _ => FieldValue::Json(value.clone()),
        }
    }

    /// Build a text value from an optional string (missing → `Undefined`)
    pub fn text_or_undefined(value: Option<&str>) -> Self {
        match value {
            Some(s) => FieldValue::Text(s.to_string()),
            None => FieldValue::Undefined,
        }
    }

    /// The string form used by the string-family operators
    pub fn string_form(&self) -> String {
        match self {
            FieldValue::Undefined => "undefined".to_string(),
            FieldValue::Null => "null".to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Element(e) => e.to_string(),
            FieldValue::Json(v) => v.to_string(),
        }
    }

    /// Numeric view for ordering operators: numbers as-is, numeric strings parsed
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => parse_number(s),
            _ => None,
        }
    }

    /// The element, for element-valued fields
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            FieldValue::Element(e) => Some(e),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Parse a complete numeric string (surrounding whitespace allowed)
///
/// Partial numbers such as `"5abc"` are rejected.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Format a number without a trailing `.0` for integral values
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_number_rejects_partial() {
        assert_eq!(parse_number("5"), Some(5.0));
        assert_eq!(parse_number(" 2.5 "), Some(2.5));
        assert_eq!(parse_number("5abc"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn test_string_form() {
        assert_eq!(FieldValue::Number(5.0).string_form(), "5");
        assert_eq!(FieldValue::Number(2.5).string_form(), "2.5");
        assert_eq!(FieldValue::Undefined.string_form(), "undefined");
        assert_eq!(FieldValue::Null.string_form(), "null");
        assert_eq!(FieldValue::from_json(&json!([1, 2])).string_form(), "[1,2]");
    }

    #[test]
    fn test_as_number() {
        assert_eq!(FieldValue::from("12").as_number(), Some(12.0));
        assert_eq!(FieldValue::Bool(true).as_number(), None);
        assert_eq!(FieldValue::Null.as_number(), None);
    }
}
