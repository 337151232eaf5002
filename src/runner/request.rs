//! Per-call request.

use std::path::PathBuf;
use std::time::Duration;

/// One logical call: role, prompt and optional continuation token.
///
/// Created per call and never shared between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub role: String,
    pub prompt: String,

    /// Continuation token from a previous response's `session_id` metadata.
    pub session_id: Option<String>,

    /// Working directory for the agent; the current directory when unset.
    pub working_dir: Option<PathBuf>,

    /// Per-call timeout; the invocation's timeout when unset.
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    pub fn new(role: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            prompt: prompt.into(),
            session_id: None,
            working_dir: None,
            timeout: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Follow-up request that continues `session_id` with `prompt`.
    pub(crate) fn continuation(&self, session_id: &str, prompt: &str) -> Self {
        Self {
            role: self.role.clone(),
            prompt: prompt.to_string(),
            session_id: Some(session_id.to_string()),
            working_dir: self.working_dir.clone(),
            timeout: self.timeout,
        }
    }
}
