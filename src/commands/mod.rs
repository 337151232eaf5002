//! Command implementations for agent-bridge.
//!
//! Every command needs the loaded bridge, so it is built once here and
//! handed to the handler. Handlers return the process exit code.

mod agents;
mod run;

use crate::cli::{AgentsAction, Cli, Command};
use agent_bridge::{Bridge, Result};

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> Result<i32> {
    let bridge = Bridge::from_paths(cli.profiles.as_deref(), cli.overrides.as_deref())?;

    match cli.command {
        Command::Run(args) => run::cmd_run(&bridge, args),
        Command::Agents(agents_cmd) => match agents_cmd.action {
            AgentsAction::List => agents::cmd_agents_list(&bridge),
            AgentsAction::Show(args) => agents::cmd_agents_show(&bridge, args),
        },
    }
}
