//! Pulling JSON out of free-form model output.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CapabilityError;

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("FENCED_BLOCK is valid");
}

/// Find the first JSON value in `text`: the whole text, then any fenced code
/// block, then the outermost `{...}` span.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    for cap in FENCED_BLOCK.captures_iter(trimmed) {
        if let Some(body) = cap.get(1) {
            if let Ok(value) = serde_json::from_str::<Value>(body.as_str().trim()) {
                return Some(value);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

/// Decode model output into `T`, tolerating code fences and surrounding prose.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, CapabilityError> {
    let value = extract_json(text).ok_or_else(|| {
        CapabilityError::InvalidResponse(format!("no JSON found in: {}", preview(text, 200)))
    })?;
    serde_json::from_value(value).map_err(|e| CapabilityError::InvalidResponse(e.to_string()))
}

/// First `max` characters of `text`, for log lines and error messages.
pub fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        assert_eq!(extract_json(r#" {"a": 1} "#), Some(json!({"a": 1})));
    }

    #[test]
    fn test_fenced_json_with_prose() {
        let text = "Here is the plan:\n```json\n{\"tasks\": []}\n```\nLet me know.";
        assert_eq!(extract_json(text), Some(json!({"tasks": []})));
    }

    #[test]
    fn test_braces_inside_prose() {
        let text = "Result -> {\"status\": \"Passed\", \"details\": \"ok\"} (end)";
        assert_eq!(
            extract_json(text),
            Some(json!({"status": "Passed", "details": "ok"}))
        );
    }

    #[test]
    fn test_no_json() {
        assert_eq!(extract_json("all good"), None);
        let err = parse_json::<Value>("all good").unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidResponse(_)));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo", 2), "hé…");
        assert_eq!(preview("hi", 10), "hi");
    }
}
