//! Parser for `kimi --print` output.
//!
//! Kimi echoes the prompt, then prints Python-repr style records:
//!
//! ```text
//! <echoed prompt>
//! StepBegin(n=1)
//! ThinkPart(type='think', think='Looking at the loop bounds', encrypted=None)
//! ToolCall(type='function', id='call_1', function=FunctionBody(name='read', arguments='{}'))
//! ToolResult(tool_call_id='call_1', result=ToolOk(output='...'))
//! TextPart(type='text', text='The loop is off by one.')
//! StatusUpdate(status=StatusSnapshot(context_usage=0.01))
//! ```
//!
//! Content is the `TextPart` text values in order. Without any `TextPart`,
//! the plain (unmarked) lines after the echoed prompt are used instead.

use super::response::{ParsedResponse, attach_stderr};
use super::{OutputParser, ParserError};

const FORMAT: &str = "kimi_plain";

/// Markers that start the structured section; everything before is the echoed prompt.
const STRUCTURED_MARKERS: &[&str] = &[
    "StepBegin(",
    "ThinkPart(",
    "TextPart(",
    "ToolCall(",
    "StatusUpdate(",
    "type='think'",
    "type='text'",
];

/// Tool and status records that never contribute content.
const SKIP_MARKERS: &[&str] = &[
    "StepBegin(",
    "StepEnd(",
    "StatusUpdate(",
    "ToolCall(",
    "ToolResult(",
    "FunctionBody(",
    "ToolOk(",
    "ToolError(",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct KimiPlainParser;

impl OutputParser for KimiPlainParser {
    fn id(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, stdout: &str, stderr: &str) -> Result<ParsedResponse, ParserError> {
        if stdout.trim().is_empty() {
            return Err(ParserError::EmptyOutput { format: FORMAT });
        }

        let lines: Vec<&str> = stdout.trim().lines().collect();
        let start = lines
            .iter()
            .position(|line| contains_any(line, STRUCTURED_MARKERS))
            .unwrap_or(0);
        let structured = &lines[start..];

        let mut texts = Vec::new();
        let mut thinking = Vec::new();
        for line in structured {
            if contains_any(line, SKIP_MARKERS) {
                continue;
            }
            if line.contains("TextPart(") {
                if let Some(text) = quoted_value(line, "text=") {
                    texts.push(text);
                }
            } else if line.contains("ThinkPart(")
                && let Some(think) = quoted_value(line, "think=")
            {
                thinking.push(think);
            }
        }

        let content = if texts.is_empty() {
            structured
                .iter()
                .filter(|line| {
                    !contains_any(line, SKIP_MARKERS) && !contains_any(line, STRUCTURED_MARKERS)
                })
                .map(|line| line.trim())
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            texts.join(" ").trim().to_string()
        };

        if content.is_empty() {
            return Err(ParserError::NoContent {
                format: FORMAT,
                detail: "no complete TextPart record and no plain text lines".to_string(),
            });
        }

        let mut response = ParsedResponse::new(content);
        response.insert_meta("raw_stdout", stdout);
        if !thinking.is_empty() {
            response.insert_meta("thinking", thinking);
        }
        attach_stderr(&mut response.metadata, stderr);
        Ok(response)
    }
}

fn contains_any(line: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| line.contains(m))
}

/// Extract the quoted value following `prefix` (e.g. `text=`), unescaping it.
///
/// Returns `None` when the value is not quoted, is empty, or the closing
/// quote is missing (a truncated record).
fn quoted_value(line: &str, prefix: &str) -> Option<String> {
    let rest = &line[line.find(prefix)? + prefix.len()..];
    let mut chars = rest.chars();
    let quote = chars.next().filter(|c| *c == '\'' || *c == '"')?;

    let mut value = String::new();
    let mut escaped = false;
    for c in chars {
        if escaped {
            match c {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => {}
                other => value.push(other),
            }
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return (!value.is_empty()).then_some(value);
        } else {
            value.push(c);
        }
    }

    None
}
