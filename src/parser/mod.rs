//! Output normalization for external agents.
//!
//! Every supported agent writes its answer in its own wire format. This module
//! provides one parser per format behind the [`OutputParser`] trait, and a
//! [`ParserSet`] that selects a parser by the string id stored in an agent
//! profile:
//!
//! - `gemini_json` / `qwen_json` - single JSON object with `response` and `stats`
//! - `claude_json` - result object (or event array) with `result` and `usage`
//! - `codex_jsonl` - newline-delimited JSON events
//! - `iflow_plain` - plain text followed by an `<Execution Info>` block
//! - `kimi_plain` - `TextPart(...)` / `ThinkPart(...)` markers mixed with plain lines
//! - `vecli_plain` - plain text with an optional `<SUMMARY>` block
//!
//! Parsers are pure functions over captured text. They never panic on
//! malformed input; they return a [`ParserError`] naming the expectation that
//! failed. The set applies the shared [`NonSubstantivePolicy`] to every
//! successful parse.

mod claude;
mod codex;
mod heuristic;
mod iflow;
mod json;
mod kimi;
mod response;
mod structured;
mod vecli;

pub use claude::ClaudeJsonParser;
pub use codex::CodexJsonlParser;
pub use heuristic::{NonSubstantivePolicy, PolicyConfig, ResponseKind, Verdict};
pub use iflow::IflowPlainParser;
pub use kimi::KimiPlainParser;
pub use response::{LARGE_METADATA_FIELDS, Metadata, ParsedResponse};
pub use structured::{GeminiJsonParser, QwenJsonParser};
pub use vecli::VecliPlainParser;

use std::collections::BTreeMap;
use thiserror::Error;

/// A structural expectation of a wire format that the output did not meet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParserError {
    /// Standard output was empty or whitespace only.
    #[error("{format}: agent produced no output on stdout")]
    EmptyOutput { format: &'static str },

    /// Output that must be JSON did not decode.
    #[error("{format}: output is not valid JSON ({detail})")]
    InvalidJson { format: &'static str, detail: String },

    /// A required field is absent from the decoded payload.
    #[error("{format}: expected field '{field}' is missing")]
    MissingField {
        format: &'static str,
        field: &'static str,
    },

    /// The payload decoded but has the wrong overall shape.
    #[error("{format}: unexpected output shape ({detail})")]
    UnexpectedShape { format: &'static str, detail: String },

    /// The output was well-formed but carried no answer text.
    #[error("{format}: no extractable content ({detail})")]
    NoContent { format: &'static str, detail: String },

    /// No parser is registered under the requested id.
    #[error("no parser registered for '{0}'")]
    UnknownParser(String),
}

/// Normalizes one agent wire format into a [`ParsedResponse`].
pub trait OutputParser: Send + Sync {
    /// Registry id stored in agent profiles (e.g. `codex_jsonl`).
    fn id(&self) -> &'static str;

    /// Parse captured standard output and (already noise-filtered) standard error.
    fn parse(&self, stdout: &str, stderr: &str) -> Result<ParsedResponse, ParserError>;
}

/// Ids of the parsers compiled into the crate.
pub const BUILTIN_PARSER_IDS: &[&str] = &[
    "claude_json",
    "codex_jsonl",
    "gemini_json",
    "iflow_plain",
    "kimi_plain",
    "qwen_json",
    "vecli_plain",
];

/// Named parser implementations plus the non-substantive policy applied to
/// their results.
///
/// Adding a wire format means registering one more [`OutputParser`]; the
/// runner only ever talks to the set.
pub struct ParserSet {
    parsers: BTreeMap<&'static str, Box<dyn OutputParser>>,
    policy: NonSubstantivePolicy,
}

impl std::fmt::Debug for ParserSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserSet")
            .field("parsers", &self.parsers.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Default for ParserSet {
    fn default() -> Self {
        Self::builtin(NonSubstantivePolicy::default())
    }
}

impl ParserSet {
    /// Create a set holding every built-in parser.
    pub fn builtin(policy: NonSubstantivePolicy) -> Self {
        let mut set = Self::empty(policy);
        set.register(Box::new(GeminiJsonParser));
        set.register(Box::new(QwenJsonParser));
        set.register(Box::new(ClaudeJsonParser));
        set.register(Box::new(CodexJsonlParser));
        set.register(Box::new(IflowPlainParser));
        set.register(Box::new(KimiPlainParser));
        set.register(Box::new(VecliPlainParser));
        set
    }

    /// Create a set with no parsers registered.
    pub fn empty(policy: NonSubstantivePolicy) -> Self {
        Self {
            parsers: BTreeMap::new(),
            policy,
        }
    }

    /// Register a parser, replacing any previous parser with the same id.
    pub fn register(&mut self, parser: Box<dyn OutputParser>) {
        self.parsers.insert(parser.id(), parser);
    }

    /// Check whether a parser id is registered (case-insensitive).
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_ok()
    }

    /// Registered parser ids in sorted order.
    pub fn ids(&self) -> Vec<&'static str> {
        self.parsers.keys().copied().collect()
    }

    /// The policy applied to every successful parse.
    pub fn policy(&self) -> &NonSubstantivePolicy {
        &self.policy
    }

    /// Look up a parser by id (case-insensitive).
    pub fn get(&self, id: &str) -> Result<&dyn OutputParser, ParserError> {
        let normalized = id.trim().to_lowercase();
        self.parsers
            .get(normalized.as_str())
            .map(|p| p.as_ref())
            .ok_or_else(|| ParserError::UnknownParser(id.to_string()))
    }

    /// Parse agent output with the named parser and classify the content.
    ///
    /// An empty content string is never returned; it is reported as
    /// [`ParserError::NoContent`].
    pub fn parse(
        &self,
        id: &str,
        stdout: &str,
        stderr: &str,
    ) -> Result<ParsedResponse, ParserError> {
        let parser = self.get(id)?;
        let mut response = parser.parse(stdout, stderr)?;

        if response.content.trim().is_empty() {
            return Err(ParserError::NoContent {
                format: parser.id(),
                detail: "normalized content is empty".to_string(),
            });
        }

        self.policy.apply(&mut response);
        Ok(response)
    }
}
