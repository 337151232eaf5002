//! Parser for `claude --print --output-format json`.
//!
//! The CLI prints a single result object. Older builds and `--verbose` print
//! the whole event array instead, in which case the last `result` event is used.

use super::json::{decode_embedded, first_key};
use super::response::{ParsedResponse, attach_stderr};
use super::{OutputParser, ParserError};
use serde_json::{Map, Value};

const FORMAT: &str = "claude_json";

/// Scalar fields copied verbatim into metadata when present.
const PASSTHROUGH_FIELDS: &[&str] = &[
    "session_id",
    "usage",
    "total_cost_usd",
    "duration_ms",
    "duration_api_ms",
    "num_turns",
    "subtype",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct ClaudeJsonParser;

impl OutputParser for ClaudeJsonParser {
    fn id(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, stdout: &str, stderr: &str) -> Result<ParsedResponse, ParserError> {
        if stdout.trim().is_empty() {
            return Err(ParserError::EmptyOutput { format: FORMAT });
        }

        let value = decode_embedded(stdout).map_err(|e| ParserError::InvalidJson {
            format: FORMAT,
            detail: e.to_string(),
        })?;

        let result = match value {
            Value::Object(map) => map,
            Value::Array(events) => last_result_event(events)?,
            _ => {
                return Err(ParserError::UnexpectedShape {
                    format: FORMAT,
                    detail: "expected a result object or an event array".to_string(),
                });
            }
        };

        let text = match result.get("result") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Null) | None => {
                return Err(ParserError::MissingField {
                    format: FORMAT,
                    field: "result",
                });
            }
            Some(_) => {
                return Err(ParserError::UnexpectedShape {
                    format: FORMAT,
                    detail: "'result' is not a string".to_string(),
                });
            }
        };

        let mut response = ParsedResponse::new(text);
        for field in PASSTHROUGH_FIELDS {
            if let Some(value) = result.get(*field).filter(|v| !v.is_null()) {
                response.insert_meta(field, value.clone());
            }
        }
        if let Some(model) = first_key(&result, "modelUsage") {
            response.insert_meta("model_used", model);
        }
        if result.get("is_error").and_then(Value::as_bool) == Some(true) {
            response.insert_meta("is_error", true);
            response.push_warning("claude reported is_error=true for this result");
        }

        response.insert_meta("raw", Value::Object(result));
        attach_stderr(&mut response.metadata, stderr);
        Ok(response)
    }
}

fn last_result_event(events: Vec<Value>) -> Result<Map<String, Value>, ParserError> {
    events
        .into_iter()
        .rev()
        .filter_map(|event| match event {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .find(|map| map.get("type").and_then(Value::as_str) == Some("result"))
        .ok_or(ParserError::UnexpectedShape {
            format: FORMAT,
            detail: "event array contains no 'result' event".to_string(),
        })
}
