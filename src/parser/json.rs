//! JSON helpers shared by the structured parsers.

use serde_json::{Map, Value};

/// Decode a JSON document that may be wrapped in free text.
///
/// Some agents print banner lines ("Loaded cached credentials.") before the
/// payload. The whole text is tried first, then the span from the first
/// opening brace to the last closing brace. The bracket span is only tried
/// when no brace precedes the first `[`, so an inner array of a truncated
/// object is never mistaken for the payload.
pub(crate) fn decode_embedded(text: &str) -> Result<Value, serde_json::Error> {
    let trimmed = text.trim();
    let first_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    for (open, close) in [('{', '}'), ('[', ']')] {
        let Some(start) = trimmed.find(open) else {
            continue;
        };
        if open == '[' && trimmed[..start].contains('{') {
            continue;
        }
        if let Some(end) = trimmed.rfind(close)
            && start < end
            && let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end])
        {
            return Ok(value);
        }
    }

    Err(first_err)
}

/// String field that is present and non-blank.
pub(crate) fn non_empty_str<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// First key, in document order, of a non-empty object field (e.g. the model
/// name in `stats.models`).
pub(crate) fn first_key<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_object)
        .and_then(|m| m.keys().next())
        .map(String::as_str)
}
