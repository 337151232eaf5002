//! Static agent profiles.
//!
//! # File Format
//!
//! ```yaml
//! defaults:
//!   timeout_seconds: 1800
//!   max_output_bytes: 10485760
//!   continuation_prompt: continue
//!
//! non_substantive:
//!   max_chars: 400
//!
//! agents:
//!   - id: claude
//!     name: Claude Code
//!     command: claude
//!     args: [--print, --output-format, json]
//!     parser: claude_json
//!     prompt_delivery: stdin
//!     system_prompt_flag: --append-system-prompt
//!     session_args: [--resume, "{session_id}"]
//!     roles:
//!       default:
//!         prompt: builtin:default
//!       codereviewer:
//!         prompt: prompts/review.txt
//!         args: [--permission-mode, plan]
//! ```
//!
//! `agents` is a list so duplicate ids are detectable. Role prompt paths are
//! relative to the directory of the file that declares them; `builtin:<name>`
//! refers to a prompt compiled into the crate.

use super::builtin;
use crate::error::{BridgeError, Result};
use crate::parser::PolicyConfig;
use crate::runner::template;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default per-call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 1800;

/// Default cap on captured bytes per stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Default prompt sent on a continuation retry.
pub const DEFAULT_CONTINUATION_PROMPT: &str = "continue";

/// How the prompt reaches the agent process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptDelivery {
    /// Written to the process's stdin, which is then closed.
    #[default]
    Stdin,
    /// Passed as the value of `prompt_flag` (e.g. `--prompt <text>`).
    NamedArg,
    /// Passed as the final positional argument.
    Positional,
}

impl PromptDelivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptDelivery::Stdin => "stdin",
            PromptDelivery::NamedArg => "named_arg",
            PromptDelivery::Positional => "positional",
        }
    }
}

/// Session-based retry support declared by a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySupport {
    /// Whether a non-substantive first answer may be retried.
    pub enabled: bool,

    /// Prompt for the retry; falls back to `defaults.continuation_prompt`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_prompt: Option<String>,
}

/// One role of an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// System prompt reference: `builtin:<name>` or a file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Arguments appended after the profile defaults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// Static description of how to invoke one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent identifier.
    #[serde(default)]
    pub id: String,

    /// Human-readable name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Launch command; split with shell quoting rules, so it may carry
    /// leading arguments (`npx @qwen-code/qwen-code`).
    #[serde(default)]
    pub command: String,

    /// Default arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Parser id (see `ParserSet`).
    #[serde(default)]
    pub parser: String,

    #[serde(default)]
    pub prompt_delivery: PromptDelivery,

    /// Flag preceding the prompt when `prompt_delivery` is `named_arg`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_flag: Option<String>,

    /// Flag carrying the role's system prompt. Without it the system prompt
    /// is prepended to the user prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_flag: Option<String>,

    /// Arguments inserted when the request carries a session id.
    /// Must reference `{session_id}`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_args: Vec<String>,

    #[serde(default)]
    pub retry: RetrySupport,

    /// Per-agent timeout (overrides `defaults.timeout_seconds`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Per-agent stream cap (overrides `defaults.max_output_bytes`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_bytes: Option<usize>,

    /// Environment additions for the process.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Regexes for benign stderr lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stderr_noise: Vec<String>,

    /// Supported roles keyed by name.
    #[serde(default)]
    pub roles: BTreeMap<String, RoleConfig>,

    /// Directory of the declaring document, for relative prompt paths.
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

/// Settings shared by every profile in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDefaults {
    pub timeout_seconds: u64,
    pub max_output_bytes: usize,
    pub continuation_prompt: String,
}

impl Default for ProfileDefaults {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            continuation_prompt: DEFAULT_CONTINUATION_PROMPT.to_string(),
        }
    }
}

/// On-disk document shape.
#[derive(Debug, Deserialize)]
struct ProfileDocument {
    #[serde(default)]
    defaults: ProfileDefaults,

    #[serde(default)]
    non_substantive: PolicyConfig,

    #[serde(default)]
    agents: Vec<AgentProfile>,
}

/// Validated profiles keyed by agent id. Immutable after load.
#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    profiles: BTreeMap<String, AgentProfile>,
    defaults: ProfileDefaults,
    policy: PolicyConfig,
}

impl ProfileSet {
    /// Load profiles from a YAML file.
    ///
    /// Unlike overrides, a missing profile file is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!(
                "failed to read agent profiles '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content, path.parent())
    }

    /// The profiles compiled into the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(builtin::PROFILES_YAML, None)
    }

    /// Parse and validate a profile document.
    ///
    /// `base_dir` anchors relative role prompt paths.
    pub fn from_yaml(yaml: &str, base_dir: Option<&Path>) -> Result<Self> {
        let document: ProfileDocument = serde_yaml::from_str(yaml)
            .map_err(|e| BridgeError::Config(format!("failed to parse agent profiles: {}", e)))?;

        let mut profiles = BTreeMap::new();
        for mut profile in document.agents {
            validate_profile(&profile)?;
            if profiles.contains_key(&profile.id) {
                return Err(BridgeError::Config(format!(
                    "profile validation failed: duplicate agent id '{}'",
                    profile.id
                )));
            }
            profile.source_dir = base_dir.map(Path::to_path_buf);
            profiles.insert(profile.id.clone(), profile);
        }

        if document.defaults.timeout_seconds == 0 {
            return Err(BridgeError::Config(
                "profile validation failed: defaults.timeout_seconds must be greater than 0"
                    .to_string(),
            ));
        }
        if document.defaults.max_output_bytes == 0 {
            return Err(BridgeError::Config(
                "profile validation failed: defaults.max_output_bytes must be greater than 0"
                    .to_string(),
            ));
        }

        Ok(Self {
            profiles,
            defaults: document.defaults,
            policy: document.non_substantive,
        })
    }

    pub fn get(&self, id: &str) -> Option<&AgentProfile> {
        self.profiles.get(id)
    }

    /// Agent ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AgentProfile)> {
        self.profiles.iter().map(|(id, p)| (id.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn defaults(&self) -> &ProfileDefaults {
        &self.defaults
    }

    /// Non-substantive policy settings declared by the document.
    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }
}

/// Validation rules:
/// - id, command and parser must be present
/// - `named_arg` delivery needs a `prompt_flag`
/// - session args must contain the `{session_id}` slot and only known variables
/// - timeout and output cap, when set, must be positive
fn validate_profile(profile: &AgentProfile) -> Result<()> {
    let fail = |msg: String| Err(BridgeError::Config(format!("profile validation failed: {}", msg)));

    if profile.id.trim().is_empty() {
        return fail("agent entry is missing required field 'id'".to_string());
    }
    let id = &profile.id;

    if profile.command.trim().is_empty() {
        return fail(format!("agent '{}' is missing required field 'command'", id));
    }
    if profile.parser.trim().is_empty() {
        return fail(format!("agent '{}' is missing required field 'parser'", id));
    }

    if profile.prompt_delivery == PromptDelivery::NamedArg
        && profile.prompt_flag.as_deref().is_none_or(|f| f.trim().is_empty())
    {
        return fail(format!(
            "agent '{}' uses prompt_delivery 'named_arg' but has no 'prompt_flag'",
            id
        ));
    }

    if !profile.session_args.is_empty() {
        if !profile.session_args.iter().any(|a| a.contains("{session_id}")) {
            return fail(format!(
                "agent '{}' has 'session_args' without a {{session_id}} slot",
                id
            ));
        }
        for arg in &profile.session_args {
            template::check(arg).map_err(|e| {
                BridgeError::Config(format!(
                    "profile validation failed: agent '{}' session_args '{}': {}",
                    id, arg, e
                ))
            })?;
        }
    }

    if profile.retry.enabled && profile.session_args.is_empty() {
        return fail(format!(
            "agent '{}' enables retry but declares no 'session_args'",
            id
        ));
    }

    if profile.timeout_seconds == Some(0) {
        return fail(format!("agent '{}' has timeout_seconds of 0", id));
    }
    if profile.max_output_bytes == Some(0) {
        return fail(format!("agent '{}' has max_output_bytes of 0", id));
    }

    if profile.roles.is_empty() {
        return fail(format!("agent '{}' declares no roles", id));
    }

    Ok(())
}
