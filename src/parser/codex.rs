//! Parser for `codex exec --json` event streams.
//!
//! One JSON event per line:
//!
//! ```text
//! {"type":"thread.started","thread_id":"0199a213-81c0-7800-8aa1-bbab2a035a53"}
//! {"type":"turn.started"}
//! {"type":"item.completed","item":{"id":"item_0","type":"reasoning","text":"**Scanning**"}}
//! {"type":"item.completed","item":{"id":"item_1","type":"agent_message","text":"Done."}}
//! {"type":"turn.completed","usage":{"input_tokens":2410,"cached_input_tokens":0,"output_tokens":88}}
//! ```
//!
//! Older CLI builds wrap events as `{"id":"0","msg":{"type":"agent_message","message":"..."}}`;
//! both shapes are accepted. Lines that do not start with `{` (progress text
//! some builds print) are skipped.

use super::response::{ParsedResponse, attach_stderr};
use super::{OutputParser, ParserError};
use serde_json::{Map, Value};

const FORMAT: &str = "codex_jsonl";

#[derive(Debug, Default, Clone, Copy)]
pub struct CodexJsonlParser;

/// State accumulated while walking the event stream.
#[derive(Debug, Default)]
struct Accumulator {
    messages: Vec<String>,
    reasoning: Vec<String>,
    errors: Vec<String>,
    session_id: Option<String>,
    usage: Option<Value>,
    model: Option<String>,
}

impl Accumulator {
    fn apply(&mut self, event: &Map<String, Value>) {
        if let Some(Value::Object(msg)) = event.get("msg") {
            self.apply_legacy(msg);
            return;
        }

        match event.get("type").and_then(Value::as_str).unwrap_or_default() {
            "thread.started" => {
                if let Some(id) = str_field(event, "thread_id") {
                    self.session_id = Some(id.to_string());
                }
            }
            "item.completed" => {
                if let Some(Value::Object(item)) = event.get("item") {
                    self.apply_item(item);
                }
            }
            "turn.completed" => {
                if let Some(usage) = event.get("usage").filter(|u| u.is_object()) {
                    self.usage = Some(usage.clone());
                }
            }
            "turn.failed" => {
                let message = event
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("turn failed");
                self.errors.push(message.to_string());
            }
            "error" => {
                let message = str_field(event, "message").unwrap_or("unknown error");
                self.errors.push(message.to_string());
            }
            _ => {}
        }
    }

    fn apply_item(&mut self, item: &Map<String, Value>) {
        let text = str_field(item, "text");
        match item.get("type").and_then(Value::as_str).unwrap_or_default() {
            "agent_message" | "assistant_message" => {
                if let Some(text) = text {
                    self.messages.push(text.to_string());
                }
            }
            "reasoning" => {
                if let Some(text) = text {
                    self.reasoning.push(text.to_string());
                }
            }
            "error" => {
                let message = str_field(item, "message").or(text).unwrap_or("item error");
                self.errors.push(message.to_string());
            }
            _ => {}
        }
    }

    fn apply_legacy(&mut self, msg: &Map<String, Value>) {
        match msg.get("type").and_then(Value::as_str).unwrap_or_default() {
            "agent_message" => {
                if let Some(text) = str_field(msg, "message") {
                    self.messages.push(text.to_string());
                }
            }
            "agent_reasoning" => {
                if let Some(text) = str_field(msg, "text") {
                    self.reasoning.push(text.to_string());
                }
            }
            "session_configured" => {
                if let Some(id) = str_field(msg, "session_id") {
                    self.session_id = Some(id.to_string());
                }
                if let Some(model) = str_field(msg, "model") {
                    self.model = Some(model.to_string());
                }
            }
            "token_count" => {
                if let Some(usage) = msg.get("info").filter(|u| u.is_object()) {
                    self.usage = Some(usage.clone());
                }
            }
            "error" => {
                let message = str_field(msg, "message").unwrap_or("unknown error");
                self.errors.push(message.to_string());
            }
            _ => {}
        }
    }
}

impl OutputParser for CodexJsonlParser {
    fn id(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, stdout: &str, stderr: &str) -> Result<ParsedResponse, ParserError> {
        if stdout.trim().is_empty() {
            return Err(ParserError::EmptyOutput { format: FORMAT });
        }

        let mut acc = Accumulator::default();
        let mut events = Vec::new();

        for (index, line) in stdout.lines().enumerate() {
            let line = line.trim();
            if !line.starts_with('{') {
                continue;
            }

            let event: Value = serde_json::from_str(line).map_err(|e| ParserError::InvalidJson {
                format: FORMAT,
                detail: format!("line {}: {}", index + 1, e),
            })?;

            if let Value::Object(map) = &event {
                acc.apply(map);
            }
            events.push(event);
        }

        if events.is_empty() {
            return Err(ParserError::InvalidJson {
                format: FORMAT,
                detail: "no JSON events found on stdout".to_string(),
            });
        }

        if acc.messages.is_empty() {
            let detail = if acc.errors.is_empty() {
                "event stream contains no agent message".to_string()
            } else {
                format!("event stream contains no agent message; errors: {}", acc.errors.join("; "))
            };
            return Err(ParserError::NoContent {
                format: FORMAT,
                detail,
            });
        }

        let mut response = ParsedResponse::new(acc.messages.join("\n\n").trim());
        if let Some(session_id) = acc.session_id {
            response.insert_meta("session_id", session_id);
        }
        if let Some(usage) = acc.usage {
            response.insert_meta("usage", usage);
        }
        if let Some(model) = acc.model {
            response.insert_meta("model_used", model);
        }
        if !acc.reasoning.is_empty() {
            response.insert_meta("reasoning", acc.reasoning);
        }
        if !acc.errors.is_empty() {
            response.insert_meta("errors", acc.errors);
        }
        response.insert_meta("events", events);
        attach_stderr(&mut response.metadata, stderr);
        Ok(response)
    }
}

fn str_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = concat!(
        r#"{"type":"thread.started","thread_id":"0199a213-81c0-7800-8aa1-bbab2a035a53"}"#,
        "\n",
        r#"{"type":"turn.started"}"#,
        "\n",
        r#"{"type":"item.completed","item":{"id":"item_0","type":"reasoning","text":"**Reading the diff**"}}"#,
        "\n",
        r#"{"type":"item.completed","item":{"id":"item_1","type":"command_execution","command":"ls","aggregated_output":"src\n","status":"completed"}}"#,
        "\n",
        r#"{"type":"item.completed","item":{"id":"item_2","type":"agent_message","text":"The change is safe to merge."}}"#,
        "\n",
        r#"{"type":"turn.completed","usage":{"input_tokens":2410,"cached_input_tokens":1024,"output_tokens":88}}"#,
        "\n",
    );

    #[test]
    fn test_parses_event_stream() {
        let parsed = CodexJsonlParser.parse(SAMPLE, "").unwrap();

        assert_eq!(parsed.content, "The change is safe to merge.");
        assert_eq!(parsed.session_id(), Some("0199a213-81c0-7800-8aa1-bbab2a035a53"));
        assert_eq!(parsed.metadata["usage"]["output_tokens"], json!(88));
        assert_eq!(parsed.metadata["reasoning"], json!(["**Reading the diff**"]));
        assert_eq!(parsed.metadata["events"].as_array().map(Vec::len), Some(6));
        assert!(!parsed.metadata.contains_key("errors"));
    }

    #[test]
    fn test_accumulates_messages_in_order() {
        let stdout = concat!(
            r#"{"type":"item.completed","item":{"type":"agent_message","text":"First part."}}"#,
            "\n",
            r#"{"type":"item.completed","item":{"type":"agent_message","text":"Second part."}}"#,
            "\n",
        );
        let parsed = CodexJsonlParser.parse(stdout, "").unwrap();
        assert_eq!(parsed.content, "First part.\n\nSecond part.");
    }

    #[test]
    fn test_legacy_msg_events() {
        let stdout = concat!(
            r#"{"id":"0","msg":{"type":"session_configured","session_id":"legacy-1","model":"gpt-5-codex"}}"#,
            "\n",
            r#"{"id":"1","msg":{"type":"agent_message","message":"Legacy answer."}}"#,
            "\n",
        );
        let parsed = CodexJsonlParser.parse(stdout, "").unwrap();
        assert_eq!(parsed.content, "Legacy answer.");
        assert_eq!(parsed.session_id(), Some("legacy-1"));
        assert_eq!(parsed.metadata["model_used"], json!("gpt-5-codex"));
    }

    #[test]
    fn test_skips_non_json_progress_lines() {
        let stdout = format!("[2025-01-01T00:00:00] OpenAI Codex v0.46.0\n{}", SAMPLE);
        let parsed = CodexJsonlParser.parse(&stdout, "").unwrap();
        assert_eq!(parsed.content, "The change is safe to merge.");
    }

    #[test]
    fn test_no_message_events_is_error() {
        let stdout = concat!(
            r#"{"type":"thread.started","thread_id":"t-1"}"#,
            "\n",
            r#"{"type":"turn.failed","error":{"message":"stream disconnected"}}"#,
            "\n",
        );
        let err = CodexJsonlParser.parse(stdout, "").unwrap_err();
        match err {
            ParserError::NoContent { detail, .. } => assert!(detail.contains("stream disconnected")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_truncated_line_is_error() {
        let cut = SAMPLE.rfind("\"output_tokens\"").unwrap();
        let err = CodexJsonlParser.parse(&SAMPLE[..cut], "").unwrap_err();
        match err {
            ParserError::InvalidJson { detail, .. } => assert!(detail.starts_with("line 6")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_plain_text_only_is_error() {
        let err = CodexJsonlParser.parse("error: not logged in", "").unwrap_err();
        assert!(matches!(err, ParserError::InvalidJson { .. }));
    }
}
