//! Implementation of the `agent-bridge agents` commands.
//!
//! - `agents list` - List configured agents with their roles
//! - `agents show` - Print the resolved invocation for an agent and role

use crate::cli::ShowArgs;
use agent_bridge::exit_codes;
use agent_bridge::{Bridge, Result};

/// Execute the `agent-bridge agents list` command.
pub fn cmd_agents_list(bridge: &Bridge) -> Result<i32> {
    let registry = bridge.registry();
    let ids = registry.agent_ids();

    if ids.is_empty() {
        println!("No agents configured.");
        return Ok(exit_codes::SUCCESS);
    }

    println!("Configured agents ({}):", ids.len());
    println!();

    for id in &ids {
        let Some(profile) = registry.profile(id) else {
            continue;
        };
        let name = if profile.name.is_empty() {
            id.as_str()
        } else {
            profile.name.as_str()
        };
        let override_marker = if registry.override_for(id).is_some() {
            " (overridden)"
        } else {
            ""
        };

        println!("  {}{}", id, override_marker);
        println!("    Name:        {}", name);
        println!("    Command:     {}", truncate_command(&profile.command, 50));
        println!("    Parser:      {}", profile.parser);
        println!("    Prompt via:  {}", profile.prompt_delivery.as_str());
        println!("    Retry:       {}", if profile.retry.enabled { "yes" } else { "no" });
        println!("    Roles:       {}", registry.supported_roles(id).join(", "));
        println!();
    }

    Ok(exit_codes::SUCCESS)
}

/// Execute the `agent-bridge agents show` command.
///
/// Prints the fully merged invocation (profile, role and overrides) as JSON.
pub fn cmd_agents_show(bridge: &Bridge, args: ShowArgs) -> Result<i32> {
    let invocation = bridge.registry().resolve(&args.agent, &args.role)?;
    let mut json = serde_json::to_value(invocation.as_ref()).unwrap_or_default();
    json["command_line"] = invocation.command_line().into();
    println!("{:#}", json);
    Ok(exit_codes::SUCCESS)
}

/// Truncate a command string for display, respecting char boundaries.
fn truncate_command(cmd: &str, max_len: usize) -> String {
    if cmd.chars().count() <= max_len {
        cmd.to_string()
    } else {
        let kept: String = cmd.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
