//! Parser for vecli plain-text output.
//!
//! The whole trimmed stdout is the answer. A `<SUMMARY>` (or `< SUMMARY >`)
//! block, when present, is copied into metadata as well.

use super::response::{ParsedResponse, attach_stderr};
use super::{OutputParser, ParserError};
use regex::Regex;
use std::sync::LazyLock;

const FORMAT: &str = "vecli_plain";

static SUMMARY_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<\s*SUMMARY\s*>(.*?)</\s*SUMMARY\s*>").ok());

#[derive(Debug, Default, Clone, Copy)]
pub struct VecliPlainParser;

impl OutputParser for VecliPlainParser {
    fn id(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, stdout: &str, stderr: &str) -> Result<ParsedResponse, ParserError> {
        let content = stdout.trim();
        if content.is_empty() {
            return Err(ParserError::EmptyOutput { format: FORMAT });
        }

        let mut response = ParsedResponse::new(content).with_meta("raw_stdout", stdout);

        let summary = SUMMARY_RE
            .as_ref()
            .and_then(|re| re.captures(content))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty());
        if let Some(summary) = summary {
            response.insert_meta("summary", summary);
        }

        // "there are non-text parts functionCall in the response"
        if stderr.to_lowercase().contains("non-text parts") {
            response.insert_meta("has_non_text_parts", true);
        }
        if stderr.contains("functionCall") {
            response.insert_meta("has_function_calls", true);
        }

        attach_stderr(&mut response.metadata, stderr);
        Ok(response)
    }
}
