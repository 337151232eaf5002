//! Parser for iflow plain-text output.
//!
//! iflow has no JSON mode. It prints the answer followed by a metadata block:
//!
//! ```text
//! The handler returns early on an empty body.
//!
//! <Execution Info>
//! {
//!   "session-id": "session-5d9a1c0e",
//!   "conversation-id": "c8c1...",
//!   "tokenUsage": {"input": 1830, "output": 52, "total": 1882}
//! }
//! </Execution Info>
//! ```
//!
//! The block is optional. A block that is not valid JSON is recorded as a
//! warning and otherwise ignored.

use super::response::{ParsedResponse, attach_stderr};
use super::{OutputParser, ParserError};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

const FORMAT: &str = "iflow_plain";
const BLOCK_START: &str = "<Execution Info>";
const BLOCK_END: &str = "</Execution Info>";

/// Session-id fallbacks over raw stdout, strictest first: the quoted JSON
/// key, then a loose `session_id: value` / `session-id=value` form.
static SESSION_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)"session[-_]?id"\s*:\s*"([^"]+)""#,
        r#"(?i)session[-_]?id["']?\s*[:=]\s*["']?([^"',\s}]+)"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

#[derive(Debug, Default, Clone, Copy)]
pub struct IflowPlainParser;

impl OutputParser for IflowPlainParser {
    fn id(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, stdout: &str, stderr: &str) -> Result<ParsedResponse, ParserError> {
        if stdout.trim().is_empty() {
            return Err(ParserError::EmptyOutput { format: FORMAT });
        }

        let (body, block) = match stdout.find(BLOCK_START) {
            Some(start) => {
                let rest = &stdout[start + BLOCK_START.len()..];
                let info = rest.find(BLOCK_END).map_or(rest, |end| &rest[..end]);
                (&stdout[..start], Some(info.trim()))
            }
            None => (stdout, None),
        };

        let content = body.trim();
        if content.is_empty() {
            return Err(ParserError::NoContent {
                format: FORMAT,
                detail: format!("no text before the {} block", BLOCK_START),
            });
        }

        let mut response = ParsedResponse::new(content);
        response.insert_meta("raw_stdout", stdout);

        if let Some(info) = block.filter(|b| !b.is_empty()) {
            match serde_json::from_str::<Value>(info) {
                Ok(Value::Object(info)) => {
                    if let Some(usage) = info.get("tokenUsage") {
                        response.insert_meta("usage", usage.clone());
                    }
                    let session_id = ["session-id", "session_id", "sessionId"]
                        .iter()
                        .find_map(|key| info.get(*key).and_then(Value::as_str))
                        .filter(|s| !s.is_empty());
                    if let Some(session_id) = session_id {
                        response.insert_meta("session_id", session_id);
                    }
                    response.insert_meta("execution_info", Value::Object(info));
                }
                Ok(_) | Err(_) => {
                    response.push_warning("iflow execution info block is not a JSON object; ignored");
                }
            }
        }

        if response.session_id().is_none()
            && let Some(session_id) = SESSION_ID_PATTERNS
                .iter()
                .find_map(|re| re.captures(stdout))
                .map(|caps| caps[1].to_string())
        {
            response.insert_meta("session_id", session_id);
        }

        attach_stderr(&mut response.metadata, stderr);
        Ok(response)
    }
}
