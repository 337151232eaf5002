//! Concrete argv construction for one attempt.

use super::request::ExecutionRequest;
use super::template;
use crate::error::{BridgeError, Result};
use crate::registry::{PromptDelivery, ResolvedInvocation};

/// Everything needed to spawn one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Bytes written to stdin before it is closed; `None` leaves stdin empty.
    pub stdin: Option<String>,
    /// Position of the prompt in `args` for argument delivery modes.
    pub prompt_index: Option<usize>,
}

impl CommandSpec {
    /// Shell-quoted command line for logs and metadata.
    ///
    /// The prompt is elided so large prompts do not flood the log.
    pub fn display(&self) -> String {
        let mut words: Vec<&str> = Vec::with_capacity(self.args.len() + 1);
        words.push(&self.program);
        for (index, arg) in self.args.iter().enumerate() {
            if Some(index) == self.prompt_index {
                words.push("<prompt>");
            } else {
                words.push(arg);
            }
        }
        shell_words::join(words)
    }
}

/// Build the argv for `request` against `invocation`.
///
/// Order: argument template, session slot (when the request carries a session
/// id), system prompt flag, then the prompt in exactly one delivery mode.
pub fn build_command(invocation: &ResolvedInvocation, request: &ExecutionRequest) -> Result<CommandSpec> {
    let agent = invocation.agent_id.as_str();
    let mut args = invocation.args.clone();

    let session_id = request.session_id.as_deref().filter(|s| !s.trim().is_empty());
    if let Some(session_id) = session_id {
        let variables = [
            ("session_id", session_id),
            ("agent", agent),
            ("role", invocation.role.as_str()),
        ];
        for slot in &invocation.session_args {
            let rendered = template::render(slot, &variables).map_err(|e| {
                BridgeError::Config(format!(
                    "agent '{}': session_args '{}': {}",
                    agent, slot, e
                ))
            })?;
            args.push(rendered);
        }
    }

    // A continued session already carries the system prompt
    let system_prompt = invocation
        .system_prompt
        .as_deref()
        .filter(|_| session_id.is_none());

    let prompt = match (system_prompt, invocation.system_prompt_flag.as_deref()) {
        (Some(system), Some(flag)) => {
            args.push(flag.to_string());
            args.push(system.to_string());
            request.prompt.clone()
        }
        (Some(system), None) => format!("{}\n\n{}", system, request.prompt),
        (None, _) => request.prompt.clone(),
    };

    let (stdin, prompt_index) = match invocation.prompt_delivery {
        PromptDelivery::Stdin => (Some(prompt), None),
        PromptDelivery::NamedArg => {
            let flag = invocation
                .prompt_flag
                .as_deref()
                .filter(|f| !f.trim().is_empty())
                .ok_or_else(|| {
                    BridgeError::Config(format!(
                        "agent '{}' uses prompt_delivery 'named_arg' but has no 'prompt_flag'",
                        agent
                    ))
                })?;
            args.push(flag.to_string());
            args.push(prompt);
            (None, Some(args.len() - 1))
        }
        PromptDelivery::Positional => {
            args.push(prompt);
            (None, Some(args.len() - 1))
        }
    };

    Ok(CommandSpec {
        program: invocation.program.clone(),
        args,
        stdin,
        prompt_index,
    })
}
