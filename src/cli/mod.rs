//! CLI argument parsing for agent-bridge.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// agent-bridge: run external command-line AI agents and print their
/// normalized answers as JSON.
///
/// Agents are described by profiles (built in, or a YAML document passed via
/// `--profiles`) and can be adjusted per user with an overrides document.
#[derive(Parser, Debug)]
#[command(name = "agent-bridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Agent profile document (YAML). The built-in profiles are used when omitted.
    #[arg(long, global = true, env = "AGENT_BRIDGE_PROFILES")]
    pub profiles: Option<PathBuf>,

    /// User overrides document (YAML). A missing file means no overrides.
    #[arg(long, global = true, env = "AGENT_BRIDGE_OVERRIDES")]
    pub overrides: Option<PathBuf>,

    /// Log at debug level unless AGENT_BRIDGE_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for agent-bridge.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an agent once and print the outcome as JSON.
    ///
    /// Exits with 0 on success and with the error's exit code otherwise;
    /// the JSON outcome is printed either way.
    Run(RunArgs),

    /// Inspect configured agents.
    Agents(AgentsCommand),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Agent id (e.g. gemini, codex, claude).
    pub agent: String,

    /// Prompt text, or `-` to read it from stdin.
    pub prompt: String,

    /// Role selecting the system prompt and extra arguments.
    #[arg(short, long, default_value = "default")]
    pub role: String,

    /// Continue an earlier conversation with this session id.
    #[arg(short, long)]
    pub session: Option<String>,

    /// Working directory for the agent.
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Timeout in seconds, replacing the profile's.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Keep raw output fields (raw, raw_stdout, events, thinking) in metadata.
    #[arg(long)]
    pub raw: bool,
}

/// Agent inspection subcommands.
#[derive(Parser, Debug)]
pub struct AgentsCommand {
    #[command(subcommand)]
    pub action: AgentsAction,
}

/// Available agent inspection actions.
#[derive(Subcommand, Debug)]
pub enum AgentsAction {
    /// List configured agents and their roles.
    List,

    /// Show the resolved invocation for one agent and role as JSON.
    Show(ShowArgs),
}

/// Arguments for the `agents show` command.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Agent id.
    pub agent: String,

    /// Role to resolve.
    #[arg(short, long, default_value = "default")]
    pub role: String,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
