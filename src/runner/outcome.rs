//! Final result of one call.

use crate::error::{BridgeError, Result};
use crate::parser::ParsedResponse;
use serde_json::{Value, json};

/// What a caller gets back from one `execute`.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// First attempt produced a usable response (possibly after a failed or
    /// non-substantive retry, in which case the original response is kept).
    Success(ParsedResponse),

    /// First answer was non-substantive and the continuation retry produced a real one.
    RetriedSuccess {
        response: ParsedResponse,
        attempts: u32,
    },

    Failure(BridgeError),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ExecutionOutcome::Failure(_))
    }

    pub fn response(&self) -> Option<&ParsedResponse> {
        match self {
            ExecutionOutcome::Success(response)
            | ExecutionOutcome::RetriedSuccess { response, .. } => Some(response),
            ExecutionOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&BridgeError> {
        match self {
            ExecutionOutcome::Failure(err) => Some(err),
            _ => None,
        }
    }

    /// Number of agent processes the call consumed.
    pub fn attempts(&self) -> u32 {
        match self {
            ExecutionOutcome::RetriedSuccess { attempts, .. } => *attempts,
            ExecutionOutcome::Success(response) => response
                .metadata
                .get("attempts")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(1),
            ExecutionOutcome::Failure(_) => 0,
        }
    }

    /// Convert into a plain `Result`, dropping the retry distinction.
    pub fn into_result(self) -> Result<ParsedResponse> {
        match self {
            ExecutionOutcome::Success(response)
            | ExecutionOutcome::RetriedSuccess { response, .. } => Ok(response),
            ExecutionOutcome::Failure(err) => Err(err),
        }
    }

    /// JSON rendering for callers that speak JSON.
    ///
    /// With `prune` the bulky raw-output metadata is dropped.
    pub fn to_json(&self, prune: bool) -> Value {
        let render = |response: &ParsedResponse| {
            let response = if prune { response.pruned() } else { response.clone() };
            serde_json::to_value(response).unwrap_or(Value::Null)
        };

        match self {
            ExecutionOutcome::Success(response) => json!({
                "status": "success",
                "response": render(response),
            }),
            ExecutionOutcome::RetriedSuccess { response, attempts } => json!({
                "status": "retried_success",
                "attempts": attempts,
                "response": render(response),
            }),
            ExecutionOutcome::Failure(err) => {
                let mut error = json!({
                    "kind": err.kind(),
                    "message": err.to_string(),
                });
                if let BridgeError::Cancelled {
                    first_attempt: Some(metadata),
                    ..
                } = err
                {
                    error["first_attempt"] = json!(metadata);
                }
                json!({
                    "status": "failure",
                    "error": error,
                })
            }
        }
    }
}
