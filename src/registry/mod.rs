//! Agent registry.
//!
//! Turns an (agent id, role) pair into a [`ResolvedInvocation`] by merging:
//!
//! - **Profiles**: static per-agent launch descriptions (built-in or YAML file)
//! - **Roles**: per-profile system prompt and extra arguments
//! - **Overrides**: optional user YAML that replaces commands, adds
//!   arguments and environment, and adds or adjusts roles
//!
//! Every (agent, role) pair is resolved once when the registry is built and
//! cached behind an `Arc`. Reloading overrides resolves everything again into
//! a fresh cache and swaps it in; existing `Arc`s held by in-flight calls are
//! unaffected.

mod builtin;
mod overrides;
mod profile;
mod resolve;

#[cfg(test)]
mod tests;

pub use overrides::{OverrideSet, RoleOverride, UserOverride};
pub use profile::{
    AgentProfile, DEFAULT_CONTINUATION_PROMPT, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_SECONDS,
    ProfileDefaults, ProfileSet, PromptDelivery, RetrySupport, RoleConfig,
};
pub use resolve::{ResolvedInvocation, RetryPolicy};

use crate::error::{BridgeError, Result};
use crate::parser::ParserSet;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Resolved invocations keyed by agent id, then role.
type ResolvedMap = BTreeMap<String, BTreeMap<String, Arc<ResolvedInvocation>>>;

/// One immutable generation of the resolution cache.
#[derive(Debug)]
struct Snapshot {
    overrides: OverrideSet,
    resolved: ResolvedMap,
}

/// Profiles plus the current override generation.
///
/// Safe to share across threads; `resolve` only takes a read lock long enough
/// to clone an `Arc`.
#[derive(Debug)]
pub struct Registry {
    profiles: ProfileSet,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl Registry {
    /// Build a registry, checking every profile's parser id against `parsers`.
    ///
    /// Fails with `BridgeError::Config` on unknown parser ids or any
    /// (agent, role) pair that cannot be resolved (bad command quoting,
    /// unreadable prompt file, invalid noise pattern).
    pub fn new(profiles: ProfileSet, overrides: OverrideSet, parsers: &ParserSet) -> Result<Self> {
        for (id, profile) in profiles.iter() {
            if !parsers.contains(&profile.parser) {
                return Err(BridgeError::Config(format!(
                    "agent '{}' references unknown parser '{}' (available: {})",
                    id,
                    profile.parser,
                    parsers.ids().join(", ")
                )));
            }
        }

        let snapshot = build_snapshot(&profiles, overrides)?;
        Ok(Self {
            profiles,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Resolve an (agent, role) pair.
    ///
    /// Returns `UnknownAgent` or `UnsupportedRole` before anything is spawned.
    pub fn resolve(&self, agent_id: &str, role: &str) -> Result<Arc<ResolvedInvocation>> {
        if self.profiles.get(agent_id).is_none() {
            return Err(BridgeError::UnknownAgent {
                agent: agent_id.to_string(),
                available: self.agent_ids().join(", "),
            });
        }

        let snapshot = self.current();
        snapshot
            .resolved
            .get(agent_id)
            .and_then(|roles| roles.get(role))
            .cloned()
            .ok_or_else(|| BridgeError::UnsupportedRole {
                agent: agent_id.to_string(),
                role: role.to_string(),
                supported: self.supported_roles(agent_id).join(", "),
            })
    }

    /// Reload user overrides from `path` and rebuild the resolution cache.
    ///
    /// On error the previous generation stays in place.
    pub fn reload_overrides<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let overrides = OverrideSet::load(path)?;
        self.replace_overrides(overrides)
    }

    /// Swap in a new override set and rebuild the resolution cache.
    pub fn replace_overrides(&self, overrides: OverrideSet) -> Result<()> {
        let snapshot = Arc::new(build_snapshot(&self.profiles, overrides)?);
        let count: usize = snapshot.resolved.values().map(BTreeMap::len).sum();

        let mut guard = self.snapshot.write().unwrap_or_else(|p| p.into_inner());
        *guard = snapshot;
        drop(guard);

        info!(invocations = count, "reloaded agent overrides");
        Ok(())
    }

    /// Loaded agent ids, sorted.
    pub fn agent_ids(&self) -> Vec<String> {
        self.profiles.ids().map(str::to_string).collect()
    }

    pub fn profile(&self, agent_id: &str) -> Option<&AgentProfile> {
        self.profiles.get(agent_id)
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    /// Roles available for an agent, including roles added by overrides.
    pub fn supported_roles(&self, agent_id: &str) -> Vec<String> {
        self.current()
            .resolved
            .get(agent_id)
            .map(|roles| roles.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Override currently applied to an agent.
    pub fn override_for(&self, agent_id: &str) -> Option<UserOverride> {
        self.current().overrides.get(agent_id).cloned()
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

fn build_snapshot(profiles: &ProfileSet, overrides: OverrideSet) -> Result<Snapshot> {
    for id in overrides.ids() {
        if profiles.get(id).is_none() {
            warn!(agent = id, "override for unknown agent ignored");
        }
    }

    let mut resolved = ResolvedMap::new();
    for (id, profile) in profiles.iter() {
        let over = overrides.get(id);
        let mut roles = BTreeMap::new();
        for role in resolve::supported_roles(profile, over) {
            let invocation =
                resolve::resolve_invocation(profile, &role, over, profiles.defaults())?;
            roles.insert(role, Arc::new(invocation));
        }
        resolved.insert(id.to_string(), roles);
    }

    Ok(Snapshot {
        overrides,
        resolved,
    })
}
