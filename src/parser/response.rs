//! Normalized response shape shared by every parser.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Response metadata: unique keys, scalar or nested JSON values.
pub type Metadata = BTreeMap<String, Value>;

/// Metadata fields that carry raw agent output and can be large.
pub const LARGE_METADATA_FIELDS: &[&str] = &["raw", "raw_stdout", "events", "thinking"];

/// Agent output normalized into one stable shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// Answer text extracted from the agent output.
    pub content: String,

    /// Token counts, model, latency, session id, warnings and similar.
    #[serde(default)]
    pub metadata: Metadata,

    /// Set when the content is boilerplate or a pure clarification request.
    #[serde(default)]
    pub non_substantive: bool,
}

impl ParsedResponse {
    /// Create a response with the given content and no metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
            non_substantive: false,
        }
    }

    /// Builder-style metadata insertion.
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert_meta(key, value);
        self
    }

    /// Insert or replace a metadata entry.
    pub fn insert_meta(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Session identifier exposed by the agent, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.metadata
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Append a warning to the `warnings` metadata list.
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        let entry = self
            .metadata
            .entry("warnings".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));

        match entry {
            Value::Array(items) => items.push(Value::String(warning.into())),
            other => {
                let previous = std::mem::take(other);
                *other = Value::Array(vec![previous, Value::String(warning.into())]);
            }
        }
    }

    /// Warnings recorded so far.
    pub fn warnings(&self) -> Vec<&str> {
        match self.metadata.get("warnings") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(s)) => vec![s.as_str()],
            _ => Vec::new(),
        }
    }

    /// Copy of the response without the bulky raw-output metadata fields.
    ///
    /// Dropped keys are listed under `pruned_fields`.
    pub fn pruned(&self) -> Self {
        let mut copy = self.clone();
        let mut pruned = Vec::new();
        for field in LARGE_METADATA_FIELDS {
            if copy.metadata.remove(*field).is_some() {
                pruned.push(Value::String((*field).to_string()));
            }
        }
        if !pruned.is_empty() {
            copy.metadata
                .insert("pruned_fields".to_string(), Value::Array(pruned));
        }
        copy
    }
}

/// Record trimmed stderr in metadata when the agent wrote any.
pub(crate) fn attach_stderr(metadata: &mut Metadata, stderr: &str) {
    let trimmed = stderr.trim();
    if !trimmed.is_empty() {
        metadata.insert("stderr".to_string(), Value::String(trimmed.to_string()));
    }
}
