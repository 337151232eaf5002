//! Attempt execution and the continuation retry.

use super::cancel::CancelToken;
use super::command::build_command;
use super::outcome::ExecutionOutcome;
use super::process::{self, ProcessError};
use super::request::ExecutionRequest;
use crate::error::{BridgeError, Result};
use crate::parser::{ParsedResponse, ParserSet};
use crate::registry::ResolvedInvocation;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether a response warrants the single continuation retry.
///
/// Only the first attempt of an agent whose profile supports retry is ever
/// retried, so a call spawns at most two processes.
pub fn should_retry(non_substantive: bool, retry_supported: bool, attempt: u32) -> bool {
    non_substantive && retry_supported && attempt == 1
}

/// Runs resolved invocations. Cheap to clone and share between threads.
#[derive(Debug, Clone)]
pub struct AgentRunner {
    parsers: Arc<ParserSet>,
}

impl AgentRunner {
    pub fn new(parsers: Arc<ParserSet>) -> Self {
        Self { parsers }
    }

    pub fn parsers(&self) -> &ParserSet {
        &self.parsers
    }

    /// Execute one logical call, including the optional retry.
    ///
    /// Never panics on agent misbehavior; every failure comes back as
    /// `ExecutionOutcome::Failure`.
    pub fn execute(
        &self,
        invocation: &ResolvedInvocation,
        request: &ExecutionRequest,
        cancel: &CancelToken,
    ) -> ExecutionOutcome {
        let mut first = match self.attempt(invocation, request, cancel, 1) {
            Ok(response) => response,
            Err(err) => return ExecutionOutcome::Failure(err),
        };

        if !should_retry(first.non_substantive, invocation.retry.enabled, 1) {
            return ExecutionOutcome::Success(first);
        }

        let Some(session_id) = first.session_id().map(str::to_string) else {
            warn!(
                agent = %invocation.agent_id,
                "non-substantive response without a session id; not retrying"
            );
            first.push_warning("non-substantive response carried no session id; retry skipped");
            return ExecutionOutcome::Success(first);
        };

        info!(
            agent = %invocation.agent_id,
            session_id = %session_id,
            "non-substantive response; continuing session"
        );
        let follow_up = request.continuation(&session_id, &invocation.retry.continuation_prompt);

        match self.attempt(invocation, &follow_up, cancel, 2) {
            Ok(mut retried) if !retried.non_substantive => {
                retried.insert_meta("retried_from_session", session_id);
                ExecutionOutcome::RetriedSuccess {
                    response: retried,
                    attempts: 2,
                }
            }
            Ok(_) => {
                warn!(agent = %invocation.agent_id, "continuation was also non-substantive");
                first.push_warning("continuation retry also returned a non-substantive response");
                mark_retried(&mut first);
                ExecutionOutcome::Success(first)
            }
            Err(BridgeError::Cancelled { agent, .. }) => {
                ExecutionOutcome::Failure(BridgeError::Cancelled {
                    agent,
                    first_attempt: Some(first.metadata),
                })
            }
            Err(err) => {
                warn!(agent = %invocation.agent_id, error = %err, "continuation retry failed");
                first.push_warning(format!("continuation retry failed: {}", err));
                mark_retried(&mut first);
                ExecutionOutcome::Success(first)
            }
        }
    }

    /// Spawn, capture and parse a single attempt.
    fn attempt(
        &self,
        invocation: &ResolvedInvocation,
        request: &ExecutionRequest,
        cancel: &CancelToken,
        attempt: u32,
    ) -> Result<ParsedResponse> {
        let agent = invocation.agent_id.as_str();
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled {
                agent: agent.to_string(),
                first_attempt: None,
            });
        }

        let spec = build_command(invocation, request)?;
        let command_line = spec.display();
        let timeout = request.timeout.unwrap_or(invocation.timeout);
        debug!(
            agent,
            role = %invocation.role,
            attempt,
            command = %command_line,
            "running agent"
        );

        let started_at = Utc::now();
        let output = process::run(
            &spec,
            &invocation.env,
            request.working_dir.as_deref(),
            timeout,
            invocation.max_output_bytes,
            cancel,
        )
        .map_err(|err| match err {
            ProcessError::Launch(e) => BridgeError::Launch {
                agent: agent.to_string(),
                command: invocation.program.clone(),
                reason: e.to_string(),
            },
            ProcessError::Wait(e) => BridgeError::Launch {
                agent: agent.to_string(),
                command: invocation.program.clone(),
                reason: format!("lost track of the process: {}", e),
            },
            ProcessError::TimedOut => {
                warn!(agent, timeout_secs = timeout.as_secs_f64(), "agent timed out; killed");
                BridgeError::Timeout {
                    agent: agent.to_string(),
                    command: invocation.program.clone(),
                    timeout,
                }
            }
            ProcessError::Cancelled => {
                info!(agent, "call cancelled; agent killed");
                BridgeError::Cancelled {
                    agent: agent.to_string(),
                    first_attempt: None,
                }
            }
        })?;

        let mut warnings = Vec::new();
        let stdout = decode(&output.stdout, "stdout", &mut warnings);
        let stderr = decode(&output.stderr, "stderr", &mut warnings);
        if output.stdout_truncated {
            warnings.push(format!(
                "stdout exceeded {} bytes and was truncated",
                invocation.max_output_bytes
            ));
        }
        if output.stderr_truncated {
            warnings.push(format!(
                "stderr exceeded {} bytes and was truncated",
                invocation.max_output_bytes
            ));
        }

        let (stderr, noise_removed) = invocation.noise.filter(&stderr);

        let mut response = self
            .parsers
            .parse(&invocation.parser_id, &stdout, &stderr)
            .map_err(|source| {
                if output.exit_code != Some(0) {
                    warn!(
                        agent,
                        exit_code = ?output.exit_code,
                        "agent exited unsuccessfully and its output could not be parsed"
                    );
                }
                BridgeError::Parser {
                    agent: agent.to_string(),
                    source,
                }
            })?;

        // A non-zero exit with parseable output is reported, not fatal
        if output.exit_code != Some(0) {
            let message = match output.exit_code {
                Some(code) => format!("agent exited with status {} but its output parsed", code),
                None => "agent was killed by a signal but its output parsed".to_string(),
            };
            warn!(agent, exit_code = ?output.exit_code, "{}", message);
            warnings.push(message);
        }

        for warning in warnings {
            response.push_warning(warning);
        }
        if noise_removed > 0 {
            response.insert_meta("stderr_noise_removed", noise_removed);
        }

        let duration_ms = u64::try_from(output.duration.as_millis()).unwrap_or(u64::MAX);
        response.insert_meta("agent", agent);
        response.insert_meta("role", invocation.role.as_str());
        response.insert_meta("parser", invocation.parser_id.as_str());
        response.insert_meta(
            "exit_code",
            output.exit_code.map(Value::from).unwrap_or(Value::Null),
        );
        response.insert_meta("duration_ms", duration_ms);
        response.insert_meta("attempts", attempt);
        response.insert_meta("command", command_line);
        response.insert_meta(
            "started_at",
            started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        );

        debug!(
            agent,
            attempt,
            duration_ms,
            non_substantive = response.non_substantive,
            "agent finished"
        );
        Ok(response)
    }
}

fn mark_retried(response: &mut ParsedResponse) {
    response.insert_meta("retry_attempted", true);
    response.insert_meta("attempts", 2);
}

/// Decode captured bytes, replacing invalid UTF-8 and noting it.
fn decode(bytes: &[u8], stream: &str, warnings: &mut Vec<String>) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            warnings.push(format!(
                "{} was not valid UTF-8; invalid bytes were replaced",
                stream
            ));
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
