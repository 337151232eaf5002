//! agent-bridge: run external command-line AI agents from the shell.
//!
//! Parses arguments, dispatches to the command handler, and maps errors to
//! exit codes.

mod cli;
mod commands;

use agent_bridge::logging;
use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    logging::init(cli.verbose);

    match commands::dispatch(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            // User-actionable message on stderr; stdout is reserved for results
            eprintln!("Error: {}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

