//! Merging a profile, one of its roles and the user override into a
//! [`ResolvedInvocation`].

use super::builtin;
use super::overrides::UserOverride;
use super::profile::{AgentProfile, ProfileDefaults, PromptDelivery};
use crate::error::{BridgeError, Result};
use crate::runner::NoiseFilter;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Resolved retry behavior of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub continuation_prompt: String,
}

/// Fully merged, ready-to-run descriptor for one (agent, role) pair.
///
/// Never mutated after creation and shared behind an `Arc`; it holds no
/// per-call state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedInvocation {
    pub agent_id: String,
    pub role: String,

    /// Executable (first word of the merged command).
    pub program: String,

    /// Argument template: command remainder, profile or override defaults,
    /// role arguments, then appended override arguments.
    pub args: Vec<String>,

    /// Environment additions on top of the inherited environment.
    pub env: BTreeMap<String, String>,

    pub prompt_delivery: PromptDelivery,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_flag: Option<String>,

    /// Role system prompt text, already loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt_flag: Option<String>,

    /// Session slot, rendered only when the request carries a session id.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub session_args: Vec<String>,

    pub parser_id: String,

    pub retry: RetryPolicy,

    #[serde(rename = "timeout_seconds", serialize_with = "serialize_secs")]
    pub timeout: Duration,

    pub max_output_bytes: usize,

    #[serde(rename = "stderr_noise", skip_serializing_if = "NoiseFilter::is_empty")]
    pub noise: NoiseFilter,
}

impl ResolvedInvocation {
    /// Shell-quoted `program args...` for display.
    pub fn command_line(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(self.args.iter()))
    }
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

/// Role names of a profile plus roles added by its override, sorted.
pub(crate) fn supported_roles(profile: &AgentProfile, over: Option<&UserOverride>) -> Vec<String> {
    let mut roles: Vec<String> = profile.roles.keys().cloned().collect();
    if let Some(over) = over {
        for role in over.roles.keys() {
            if !profile.roles.contains_key(role) {
                roles.push(role.clone());
            }
        }
    }
    roles.sort();
    roles
}

/// Merge `profile` + role `role` + optional override.
///
/// Pure apart from reading the role prompt file.
pub(crate) fn resolve_invocation(
    profile: &AgentProfile,
    role: &str,
    over: Option<&UserOverride>,
    defaults: &ProfileDefaults,
) -> Result<ResolvedInvocation> {
    let id = profile.id.as_str();
    let role_config = profile.roles.get(role);
    let role_override = over.and_then(|o| o.roles.get(role));

    if role_config.is_none() && role_override.is_none() {
        return Err(BridgeError::UnsupportedRole {
            agent: id.to_string(),
            role: role.to_string(),
            supported: supported_roles(profile, over).join(", "),
        });
    }

    // Command: override wins
    let command = over
        .and_then(|o| o.command.as_deref())
        .unwrap_or(&profile.command);
    let mut words = shell_words::split(command).map_err(|e| {
        BridgeError::Config(format!(
            "agent '{}': failed to parse command '{}': {}",
            id, command, e
        ))
    })?;
    if words.is_empty() {
        return Err(BridgeError::Config(format!(
            "agent '{}': command is empty after parsing: '{}'",
            id, command
        )));
    }
    let program = words.remove(0);
    let mut args = words;

    // Arguments: profile defaults (or full replacement), role, appended override
    let replace_defaults = over.is_some_and(|o| o.replace_args);
    match over {
        Some(o) if replace_defaults => args.extend(o.args.iter().cloned()),
        _ => args.extend(profile.args.iter().cloned()),
    }

    match role_override {
        Some(ro) if ro.replace_args => args.extend(ro.args.iter().cloned()),
        _ => {
            if let Some(rc) = role_config {
                args.extend(rc.args.iter().cloned());
            }
            if let Some(ro) = role_override {
                args.extend(ro.args.iter().cloned());
            }
        }
    }

    if let Some(o) = over
        && !replace_defaults
    {
        args.extend(o.args.iter().cloned());
    }

    // Environment: override wins on key collision
    let mut env = profile.env.clone();
    if let Some(o) = over {
        env.extend(o.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let timeout_seconds = over
        .and_then(|o| o.timeout_seconds)
        .or(profile.timeout_seconds)
        .unwrap_or(defaults.timeout_seconds);

    // System prompt: role override file wins over the role's own reference
    let system_prompt = match (role_override.and_then(|ro| ro.prompt_file.as_deref()), role_config) {
        (Some(file), _) => Some(load_prompt(
            id,
            role,
            file,
            over.and_then(|o| o.source_dir.as_deref()),
        )?),
        (None, Some(rc)) => match rc.prompt.as_deref() {
            Some(reference) => Some(load_prompt(id, role, reference, profile.source_dir.as_deref())?),
            None => None,
        },
        (None, None) => None,
    }
    .filter(|text| !text.is_empty());

    Ok(ResolvedInvocation {
        agent_id: id.to_string(),
        role: role.to_string(),
        program,
        args,
        env,
        prompt_delivery: profile.prompt_delivery,
        prompt_flag: profile.prompt_flag.clone(),
        system_prompt,
        system_prompt_flag: profile.system_prompt_flag.clone(),
        session_args: profile.session_args.clone(),
        parser_id: profile.parser.clone(),
        retry: RetryPolicy {
            enabled: profile.retry.enabled,
            continuation_prompt: profile
                .retry
                .continuation_prompt
                .clone()
                .unwrap_or_else(|| defaults.continuation_prompt.clone()),
        },
        timeout: Duration::from_secs(timeout_seconds),
        max_output_bytes: profile.max_output_bytes.unwrap_or(defaults.max_output_bytes),
        noise: NoiseFilter::new(id, &profile.stderr_noise)?,
    })
}

/// Load a role prompt: `builtin:<name>` or a path relative to `base_dir`.
fn load_prompt(agent: &str, role: &str, reference: &str, base_dir: Option<&Path>) -> Result<String> {
    if let Some(name) = reference.strip_prefix(builtin::PROMPT_PREFIX) {
        return builtin::prompt(name)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| {
                BridgeError::Config(format!(
                    "agent '{}' role '{}': unknown built-in prompt '{}' (available: {})",
                    agent,
                    role,
                    name,
                    builtin::prompt_names().collect::<Vec<_>>().join(", ")
                ))
            });
    }

    let path = match base_dir {
        Some(dir) if Path::new(reference).is_relative() => dir.join(reference),
        _ => Path::new(reference).to_path_buf(),
    };

    std::fs::read_to_string(&path)
        .map(|text| text.trim().to_string())
        .map_err(|e| {
            BridgeError::Config(format!(
                "agent '{}' role '{}': failed to read prompt file '{}': {}",
                agent,
                role,
                path.display(),
                e
            ))
        })
}
