//! Error types for the agent bridge.
//!
//! Uses thiserror for derive macros. Every variant names the agent involved so
//! a failing call is diagnosable from the message alone.

use crate::exit_codes;
use crate::parser::{Metadata, ParserError};
use std::time::Duration;
use thiserror::Error;

/// Main error type for bridge operations.
///
/// Configuration-class variants come from the registry, `Parser` wraps the
/// parser set's errors, and the rest are produced while running an agent.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Profile or override data is malformed or incomplete.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested agent id is not in the loaded profile set.
    #[error("unknown agent '{agent}' (available: {available})")]
    UnknownAgent { agent: String, available: String },

    /// The agent has no such role and no override adds it.
    #[error("agent '{agent}' does not support role '{role}' (supported: {supported})")]
    UnsupportedRole {
        agent: String,
        role: String,
        supported: String,
    },

    /// The agent process could not be started.
    #[error("failed to launch agent '{agent}' with command '{command}': {reason}")]
    Launch {
        agent: String,
        command: String,
        reason: String,
    },

    /// The agent process exceeded its timeout and was killed.
    #[error(
        "agent '{agent}' ({command}) timed out after {:.1}s",
        .timeout.as_secs_f64()
    )]
    Timeout {
        agent: String,
        command: String,
        timeout: Duration,
    },

    /// The agent's output did not match its declared wire format.
    #[error("agent '{agent}' returned unusable output: {source}")]
    Parser {
        agent: String,
        #[source]
        source: ParserError,
    },

    /// The caller cancelled the call.
    ///
    /// When the cancellation hit a retry attempt, `first_attempt` carries the
    /// metadata of the completed first attempt for diagnostics.
    #[error("call to agent '{agent}' was cancelled")]
    Cancelled {
        agent: String,
        first_attempt: Option<Metadata>,
    },
}

impl BridgeError {
    /// Returns the binary exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeError::Config(_) => exit_codes::CONFIG_ERROR,
            BridgeError::UnknownAgent { .. } => exit_codes::USAGE_ERROR,
            BridgeError::UnsupportedRole { .. } => exit_codes::USAGE_ERROR,
            BridgeError::Launch { .. } => exit_codes::LAUNCH_FAILURE,
            BridgeError::Timeout { .. } => exit_codes::TIMEOUT,
            BridgeError::Parser { .. } => exit_codes::PARSE_FAILURE,
            BridgeError::Cancelled { .. } => exit_codes::CANCELLED,
        }
    }

    /// Short machine-readable name for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Config(_) => "config",
            BridgeError::UnknownAgent { .. } => "unknown_agent",
            BridgeError::UnsupportedRole { .. } => "unsupported_role",
            BridgeError::Launch { .. } => "launch",
            BridgeError::Timeout { .. } => "timeout",
            BridgeError::Parser { .. } => "parser",
            BridgeError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
