//! Non-substantive response detection.
//!
//! Some agents answer the first call of a session with a greeting or a
//! request for clarification instead of doing the task. Content is flagged
//! only when ALL of the following hold:
//!
//! - it is shorter than `max_chars` and has at most `max_lines` lines
//! - it contains no code fence and no multi-line list
//! - every sentence is either boilerplate (matches a clarification or
//!   generic pattern) or a short filler such as "Understood."
//! - no sentence carries technical content: backticks, digits, paths,
//!   `--flags`, `SCREAMING_CASE` names or `::` paths
//!
//! A trailing "What would you like me to do next?" after a real answer
//! therefore leaves the answer substantive. The policy looks only at the
//! shape of the response; it makes no attempt to judge whether the prompt
//! warranted a short answer.

use super::response::ParsedResponse;
use crate::error::{BridgeError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default maximum length (in characters) of a flaggable response.
const DEFAULT_MAX_CHARS: usize = 400;

/// Default maximum number of non-blank lines in a flaggable response.
const DEFAULT_MAX_LINES: usize = 4;

/// Unmatched sentences up to this many words (and `FILLER_MAX_CHARS`) are
/// treated as filler ("Sure.", "Got it, thanks!").
const FILLER_MAX_WORDS: usize = 3;
const FILLER_MAX_CHARS: usize = 16;

const LIST_ITEM: &str = r"^\s*([-*+•]|\d+[.)])\s+\S";

/// Markers of technical content. A sentence carrying one is never boilerplate.
const TECHNICAL: &str =
    r"`|\d|\b[A-Z][A-Z0-9]*_[A-Z0-9_]+\b|::|(^|\s)--?[A-Za-z]|\w/\w|\b\w+\.(rs|py|ts|js|go|toml|ya?ml|json|md|txt)\b";

/// Which pattern class matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Greeting or "ready to help" boilerplate.
    Generic,
    /// Pure request for more information.
    Clarification,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Generic => "generic",
            ResponseKind::Clarification => "clarification",
        }
    }
}

/// Result of classifying one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub kind: ResponseKind,
    /// The pattern that matched, for diagnostics.
    pub pattern: String,
}

/// Tunable policy settings, loadable from the profile document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Responses longer than this many characters are always substantive.
    pub max_chars: usize,

    /// Responses with more non-blank lines than this are always substantive.
    pub max_lines: usize,

    /// Case-insensitive regexes for clarification requests.
    pub clarification_patterns: Vec<String>,

    /// Case-insensitive regexes for greetings and boilerplate.
    pub generic_patterns: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            max_lines: DEFAULT_MAX_LINES,
            clarification_patterns: default_clarification_patterns(),
            generic_patterns: default_generic_patterns(),
        }
    }
}

/// Default clarification-request phrasing.
pub fn default_clarification_patterns() -> Vec<String> {
    [
        r"\b(could|can|would) you (please )?(clarify|provide|specify|share|tell me|elaborate)\b",
        r"\bplease (provide|share|specify|clarify|elaborate)\b",
        r"\b(need|require) (some )?more (information|context|details)\b",
        r"\bwhat (exactly )?do you (want|mean)\b",
        r"\bwhich (file|files|function|module|part|repository|project)\b[^.]*\?",
        r"\bcould you be more specific\b",
        r"请(提供|说明|明确|告诉我)",
        r"需要更多(信息|上下文|细节)",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Default greeting / boilerplate phrasing.
pub fn default_generic_patterns() -> Vec<String> {
    [
        r"\bready to (help|assist)\b",
        r"\bhow (can|may) i (help|assist)\b",
        r"\bwhat would you like( me)? to\b",
        r"\bwhat (else )?can i (do|help with) for you\b",
        r"\bwhat can i do for you\b",
        r"\bi'?m (here|happy|glad) to help\b",
        r"\b(awaiting|waiting for) (your|further) instructions\b",
        r"^\s*(hi|hello|hey|greetings)( there)?\s*[!.,]*\s*$",
        r"有什么(可以|能|需要)(帮|协助)",
        r"我(可以|能)(帮|协助)(你|您)",
        r"准备好(了)?(帮|协助)",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Compiled non-substantive policy.
///
/// Create once and share; classification is read-only.
#[derive(Clone)]
pub struct NonSubstantivePolicy {
    max_chars: usize,
    max_lines: usize,
    clarification: Vec<(Regex, String)>,
    generic: Vec<(Regex, String)>,
    list_item: Option<Regex>,
    technical: Option<Regex>,
}

impl std::fmt::Debug for NonSubstantivePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonSubstantivePolicy")
            .field("max_chars", &self.max_chars)
            .field("max_lines", &self.max_lines)
            .field(
                "clarification",
                &self.clarification.iter().map(|(_, s)| s).collect::<Vec<_>>(),
            )
            .field(
                "generic",
                &self.generic.iter().map(|(_, s)| s).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for NonSubstantivePolicy {
    fn default() -> Self {
        // The built-in patterns are known to compile; anything that does not
        // is dropped rather than failing construction.
        let config = PolicyConfig::default();
        Self {
            max_chars: config.max_chars,
            max_lines: config.max_lines,
            clarification: compile_lossy(&config.clarification_patterns),
            generic: compile_lossy(&config.generic_patterns),
            list_item: Regex::new(LIST_ITEM).ok(),
            technical: Regex::new(TECHNICAL).ok(),
        }
    }
}

impl NonSubstantivePolicy {
    /// Compile a policy from configuration.
    ///
    /// Returns `BridgeError::Config` naming the first pattern that fails to compile.
    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        if config.max_chars == 0 || config.max_lines == 0 {
            return Err(BridgeError::Config(
                "non_substantive: max_chars and max_lines must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            max_chars: config.max_chars,
            max_lines: config.max_lines,
            clarification: compile(&config.clarification_patterns, "clarification_patterns")?,
            generic: compile(&config.generic_patterns, "generic_patterns")?,
            list_item: Regex::new(LIST_ITEM).ok(),
            technical: Regex::new(TECHNICAL).ok(),
        })
    }

    /// Classify content; `None` means substantive.
    pub fn classify(&self, content: &str) -> Option<Verdict> {
        let trimmed = content.trim();
        if trimmed.is_empty() || trimmed.chars().count() > self.max_chars {
            return None;
        }

        let lines: Vec<&str> = trimmed.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() > self.max_lines {
            return None;
        }

        if trimmed.contains("```") {
            return None;
        }

        if let Some(list_item) = &self.list_item {
            let list_lines = lines.iter().filter(|l| list_item.is_match(l)).count();
            if list_lines >= 2 {
                return None;
            }
        }

        let mut clarification = None;
        let mut generic = None;
        for sentence in sentences(trimmed) {
            if self.technical.as_ref().is_some_and(|t| t.is_match(sentence)) {
                return None;
            }
            if let Some(pattern) = first_match(&self.clarification, sentence) {
                clarification.get_or_insert(pattern);
            } else if let Some(pattern) = first_match(&self.generic, sentence) {
                generic.get_or_insert(pattern);
            } else if !is_filler(sentence) {
                return None;
            }
        }

        match (clarification, generic) {
            (Some(pattern), _) => Some(Verdict {
                kind: ResponseKind::Clarification,
                pattern,
            }),
            (None, Some(pattern)) => Some(Verdict {
                kind: ResponseKind::Generic,
                pattern,
            }),
            (None, None) => None,
        }
    }

    /// Classify a response and record the verdict on it.
    pub fn apply(&self, response: &mut ParsedResponse) {
        match self.classify(&response.content) {
            Some(verdict) => {
                response.non_substantive = true;
                response.insert_meta("response_type", verdict.kind.as_str());
                response.insert_meta("detected_pattern", verdict.pattern);
            }
            None => response.non_substantive = false,
        }
    }
}

/// Split on line breaks and on sentence-ending punctuation.
///
/// ASCII terminators only end a sentence when followed by whitespace, so
/// `4.5` and `a.txt` stay whole.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for line in text.lines() {
        let mut start = 0;
        let mut chars = line.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            let boundary = match c {
                '。' | '！' | '？' => true,
                '.' | '!' | '?' => chars.peek().is_none_or(|(_, next)| next.is_whitespace()),
                _ => false,
            };
            if boundary {
                let end = i + c.len_utf8();
                push_sentence(&mut out, &line[start..end]);
                start = end;
            }
        }
        push_sentence(&mut out, &line[start..]);
    }
    out
}

fn push_sentence<'a>(out: &mut Vec<&'a str>, sentence: &'a str) {
    let sentence = sentence.trim();
    if !sentence.is_empty() {
        out.push(sentence);
    }
}

fn is_filler(sentence: &str) -> bool {
    sentence.split_whitespace().count() <= FILLER_MAX_WORDS
        && sentence.chars().count() <= FILLER_MAX_CHARS
}

fn first_match(patterns: &[(Regex, String)], text: &str) -> Option<String> {
    patterns
        .iter()
        .find(|(regex, _)| regex.is_match(text))
        .map(|(_, source)| source.clone())
}

fn compile(patterns: &[String], field: &str) -> Result<Vec<(Regex, String)>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("(?im){}", p))
                .map(|r| (r, p.clone()))
                .map_err(|e| {
                    BridgeError::Config(format!(
                        "non_substantive.{}: invalid regex '{}': {}",
                        field, p, e
                    ))
                })
        })
        .collect()
}

fn compile_lossy(patterns: &[String]) -> Vec<(Regex, String)> {
    patterns
        .iter()
        .filter_map(|p| {
            Regex::new(&format!("(?im){}", p))
                .ok()
                .map(|r| (r, p.clone()))
        })
        .collect()
}
