//! Implementation of the `agent-bridge run` command.

use crate::cli::RunArgs;
use agent_bridge::exit_codes;
use agent_bridge::runner::{CancelToken, ExecutionRequest};
use agent_bridge::{Bridge, BridgeError, Result};
use std::io::Read;
use std::time::Duration;
use tracing::warn;

/// Execute the `agent-bridge run` command.
///
/// 1. Reads the prompt (from stdin when it is `-`)
/// 2. Installs a Ctrl-C handler that cancels the call
/// 3. Runs the agent through the bridge
/// 4. Prints the outcome JSON on stdout
///
/// Returns the exit code for the outcome; only a failure to read the prompt
/// is reported as an error.
pub fn cmd_run(bridge: &Bridge, args: RunArgs) -> Result<i32> {
    let prompt = read_prompt(&args.prompt)?;

    let mut request = ExecutionRequest::new(args.role, prompt);
    if let Some(session) = args.session {
        request = request.with_session(session);
    }
    if let Some(cwd) = args.cwd {
        request = request.with_working_dir(cwd);
    }
    if let Some(secs) = args.timeout {
        request = request.with_timeout(Duration::from_secs(secs));
    }

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || trigger.cancel()) {
        warn!(error = %e, "failed to install Ctrl-C handler; run cannot be interrupted cleanly");
    }

    let outcome = bridge.execute(&args.agent, &request, &cancel);
    println!("{:#}", outcome.to_json(!args.raw));

    Ok(outcome
        .error()
        .map(BridgeError::exit_code)
        .unwrap_or(exit_codes::SUCCESS))
}

fn read_prompt(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }

    let mut prompt = String::new();
    std::io::stdin()
        .read_to_string(&mut prompt)
        .map_err(|e| BridgeError::Config(format!("failed to read prompt from stdin: {}", e)))?;
    Ok(prompt)
}
