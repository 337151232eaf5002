//! User overrides layered on top of the static profiles.
//!
//! # File Format
//!
//! ```yaml
//! gemini:
//!   command: /opt/gemini/bin/gemini
//!   args: [--model, gemini-2.5-flash]
//!   env:
//!     GEMINI_API_KEY: "..."
//!   timeout_seconds: 600
//!   roles:
//!     codereviewer:
//!       prompt_file: prompts/strict-review.txt
//!       args: [--sandbox]
//!
//! claude:
//!   args: [--print, --output-format, json, --model, opus]
//!   replace_args: true
//! ```
//!
//! Keyed by agent id. Arguments are appended to the profile's unless
//! `replace_args` is set. Unknown fields are ignored.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Per-role override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleOverride {
    /// Replacement system prompt file, relative to the overrides file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_file: Option<String>,

    /// Role arguments (appended, or replacing the role's own with `replace_args`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    pub replace_args: bool,
}

/// Per-agent override. Every field is optional; unset fields fall through to the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserOverride {
    /// Replacement launch command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Replace the profile's default arguments instead of appending.
    pub replace_args: bool,

    /// Environment additions; win over profile values on key collision.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Role overrides; a role absent from the profile is added.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub roles: BTreeMap<String, RoleOverride>,

    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

/// Overrides keyed by agent id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideSet {
    overrides: BTreeMap<String, UserOverride>,
}

impl OverrideSet {
    /// Load overrides from a YAML file.
    ///
    /// Returns an empty set if the file does not exist.
    /// Returns `Err` if the file exists but cannot be parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!(
                "failed to read overrides '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content, path.parent())
    }

    /// Parse and validate an overrides document.
    pub fn from_yaml(yaml: &str, base_dir: Option<&Path>) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let overrides: Option<BTreeMap<String, UserOverride>> = serde_yaml::from_str(yaml)
            .map_err(|e| BridgeError::Config(format!("failed to parse overrides: {}", e)))?;
        let mut overrides = overrides.unwrap_or_default();

        for (id, over) in overrides.iter_mut() {
            if over.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return Err(BridgeError::Config(format!(
                    "overrides validation failed: agent '{}' has empty command",
                    id
                )));
            }
            if over.timeout_seconds == Some(0) {
                return Err(BridgeError::Config(format!(
                    "overrides validation failed: agent '{}' has timeout_seconds of 0",
                    id
                )));
            }
            over.source_dir = base_dir.map(Path::to_path_buf);
        }

        Ok(Self { overrides })
    }

    pub fn get(&self, id: &str) -> Option<&UserOverride> {
        self.overrides.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.overrides.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// Insert or replace the override for one agent.
    pub fn insert(&mut self, id: impl Into<String>, over: UserOverride) {
        self.overrides.insert(id.into(), over);
    }
}
