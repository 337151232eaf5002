//! Parsers for single-object JSON output (`gemini -o json`, `qwen -o json`).
//!
//! Both agents print one object:
//!
//! ```json
//! {
//!   "response": "answer text",
//!   "stats": {
//!     "models": {
//!       "gemini-2.5-pro": {
//!         "api": {"totalRequests": 1, "totalErrors": 0, "totalLatencyMs": 5321},
//!         "tokens": {"prompt": 120, "candidates": 40, "total": 160}
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! A missing `response` field is a parse error. An empty one is only accepted
//! when a diagnostic message can be derived (rate limit, API errors, stderr);
//! otherwise it is reported as no content.

use super::json::{decode_embedded, first_key, non_empty_str};
use super::response::{ParsedResponse, attach_stderr};
use super::{OutputParser, ParserError};
use serde_json::{Map, Value, json};

/// Parser for `gemini -o json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeminiJsonParser;

/// Parser for `qwen -o json`.
///
/// Same payload as Gemini, but the CLI may wrap it in a one-element array.
#[derive(Debug, Default, Clone, Copy)]
pub struct QwenJsonParser;

impl OutputParser for GeminiJsonParser {
    fn id(&self) -> &'static str {
        "gemini_json"
    }

    fn parse(&self, stdout: &str, stderr: &str) -> Result<ParsedResponse, ParserError> {
        parse_structured(self.id(), "Gemini", false, stdout, stderr)
    }
}

impl OutputParser for QwenJsonParser {
    fn id(&self) -> &'static str {
        "qwen_json"
    }

    fn parse(&self, stdout: &str, stderr: &str) -> Result<ParsedResponse, ParserError> {
        parse_structured(self.id(), "Qwen", true, stdout, stderr)
    }
}

fn parse_structured(
    format: &'static str,
    label: &str,
    accept_array: bool,
    stdout: &str,
    stderr: &str,
) -> Result<ParsedResponse, ParserError> {
    if stdout.trim().is_empty() {
        if let Some(recovered) = recover_error_payload(label, stdout, stderr) {
            return Ok(recovered);
        }
        return Err(ParserError::EmptyOutput { format });
    }

    let value = match decode_embedded(stdout) {
        Ok(value) => value,
        Err(e) => {
            if let Some(recovered) = recover_error_payload(label, stdout, stderr) {
                return Ok(recovered);
            }
            return Err(ParserError::InvalidJson {
                format,
                detail: e.to_string(),
            });
        }
    };

    let payload = match value {
        Value::Object(map) => map,
        Value::Array(items) if accept_array => match items.into_iter().next() {
            Some(Value::Object(map)) => map,
            _ => {
                return Err(ParserError::UnexpectedShape {
                    format,
                    detail: "JSON array without a response object".to_string(),
                });
            }
        },
        other => {
            return Err(ParserError::UnexpectedShape {
                format,
                detail: format!("expected a JSON object, found {}", json_type(&other)),
            });
        }
    };

    if payload.get("response").is_none() && payload.get("error").is_some() {
        if let Some(recovered) = error_block_response(label, "", &payload) {
            return Ok(recovered);
        }
    }

    let response_field = payload.get("response").ok_or(ParserError::MissingField {
        format,
        field: "response",
    })?;
    let response_text = match response_field {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => {
            return Err(ParserError::UnexpectedShape {
                format,
                detail: format!("'response' is {}, expected a string", json_type(other)),
            });
        }
    };

    let mut response = ParsedResponse::new(response_text);
    record_stats(&mut response, &payload);

    if response.content.is_empty() {
        match fallback_message(label, &payload, stderr) {
            Some(message) => {
                response.content = message;
                response.insert_meta("empty_response", true);
                if let Some(code) = rate_limit_status(stderr) {
                    response.insert_meta("rate_limit_status", code);
                }
                if let Some((errors, requests)) = api_error_counts(&payload) {
                    response.insert_meta("api_total_errors", errors);
                    if let Some(requests) = requests {
                        response.insert_meta("api_total_requests", requests);
                    }
                }
            }
            None => {
                return Err(ParserError::NoContent {
                    format,
                    detail: "'response' is empty and no diagnostics are available".to_string(),
                });
            }
        }
    }

    response.insert_meta("raw", Value::Object(payload));
    attach_stderr(&mut response.metadata, stderr);
    Ok(response)
}

/// Copy model name, token usage and latency out of `stats.models`.
fn record_stats(response: &mut ParsedResponse, payload: &Map<String, Value>) {
    let Some(stats) = payload.get("stats").and_then(Value::as_object) else {
        return;
    };
    response.insert_meta("stats", Value::Object(stats.clone()));

    let Some(model_name) = first_key(stats, "models") else {
        return;
    };
    response.insert_meta("model_used", model_name);

    let model_stats = stats
        .get("models")
        .and_then(|m| m.get(model_name))
        .and_then(Value::as_object);
    if let Some(model_stats) = model_stats {
        if let Some(tokens) = model_stats.get("tokens").filter(|t| t.is_object()) {
            response.insert_meta("token_usage", tokens.clone());
        }
        if let Some(latency) = model_stats
            .get("api")
            .and_then(|api| api.get("totalLatencyMs"))
            .filter(|v| v.is_number())
        {
            response.insert_meta("latency_ms", latency.clone());
        }
    }
}

/// Human-readable message for a payload whose `response` is empty.
fn fallback_message(label: &str, payload: &Map<String, Value>, stderr: &str) -> Option<String> {
    if rate_limit_status(stderr).is_some() {
        return Some(format!(
            "{} request returned no content because the API reported a 429 rate limit. \
             Retry after reducing the request size or waiting for quota to replenish.",
            label
        ));
    }

    if let Some((errors, _)) = api_error_counts(payload) {
        return Some(format!(
            "{} CLI returned no textual output. The API reported {} error(s); see stderr for details.",
            label, errors
        ));
    }

    if !stderr.trim().is_empty() {
        return Some(format!(
            "{} CLI returned no textual output. Raw stderr was preserved for troubleshooting.",
            label
        ));
    }

    None
}

fn rate_limit_status(stderr: &str) -> Option<u16> {
    let lower = stderr.to_lowercase();
    (lower.contains("429") || lower.contains("rate limit")).then_some(429)
}

/// `(totalErrors, totalRequests)` of the first model, when errors were reported.
fn api_error_counts(payload: &Map<String, Value>) -> Option<(u64, Option<u64>)> {
    let api = payload
        .get("stats")?
        .get("models")?
        .as_object()?
        .values()
        .next()?
        .get("api")?;
    let errors = api.get("totalErrors").and_then(Value::as_u64)?;
    if errors == 0 {
        return None;
    }
    Some((errors, api.get("totalRequests").and_then(Value::as_u64)))
}

/// Recover an `{"error": {...}}` payload the CLI printed instead of a response.
///
/// Looks at stderr followed by stdout; text before the JSON is kept as a prologue.
fn recover_error_payload(label: &str, stdout: &str, stderr: &str) -> Option<ParsedResponse> {
    let combined = [stderr, stdout]
        .iter()
        .filter(|part| !part.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    let brace = combined.find('{')?;
    let prologue = combined[..brace].trim();

    let payload = match decode_embedded(&combined[brace..]).ok()? {
        Value::Object(map) => map,
        _ => return None,
    };

    error_block_response(label, prologue, &payload)
}

fn error_block_response(
    label: &str,
    prologue: &str,
    payload: &Map<String, Value>,
) -> Option<ParsedResponse> {
    let error = payload.get("error")?.as_object()?;
    let code = error.get("code").filter(|v| !v.is_null()).cloned();
    let err_type = non_empty_str(error, "type");
    let detail = non_empty_str(error, "message");

    let mut header = format!("{} CLI reported a tool failure", label);
    match (&code, err_type) {
        (Some(code), _) => header.push_str(&format!(" ({})", display_scalar(code))),
        (None, Some(t)) => header.push_str(&format!(" ({})", t)),
        (None, None) => {}
    }
    header.push('.');

    let mut lines = vec![header];
    if !prologue.is_empty() && detail.is_none_or(|d| !d.contains(prologue)) {
        lines.push(prologue.to_string());
    }
    if let Some(detail) = detail {
        lines.push(detail.to_string());
    }

    let mut response = ParsedResponse::new(lines.join("\n"))
        .with_meta("cli_error_recovered", true)
        .with_meta("cli_error_code", code.unwrap_or(Value::Null))
        .with_meta("cli_error_type", err_type.map(Value::from).unwrap_or(Value::Null))
        .with_meta("cli_error_payload", json!(payload));
    response.push_warning(format!("{} CLI returned an error payload instead of a response", label));
    Some(response)
}

fn display_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
