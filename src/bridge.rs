//! Entry point tying the registry to the runner.
//!
//! A [`Bridge`] is what an orchestrator holds: it resolves an agent id and
//! role through the [`Registry`], then hands the resolved invocation to the
//! [`AgentRunner`]. Resolution failures surface before any process is spawned.

use crate::error::Result;
use crate::parser::{NonSubstantivePolicy, ParserSet};
use crate::registry::{OverrideSet, ProfileSet, Registry};
use crate::runner::{AgentRunner, CancelToken, ExecutionOutcome, ExecutionRequest};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct Bridge {
    registry: Registry,
    runner: AgentRunner,
}

impl Bridge {
    pub fn new(registry: Registry, runner: AgentRunner) -> Self {
        Self { registry, runner }
    }

    /// Load profiles and overrides and compile the parser set.
    ///
    /// Without `profiles` the built-in profile set is used. A missing
    /// overrides file means no overrides.
    pub fn from_paths(profiles: Option<&Path>, overrides: Option<&Path>) -> Result<Self> {
        let profiles = match profiles {
            Some(path) => ProfileSet::load(path)?,
            None => ProfileSet::builtin()?,
        };
        let overrides = match overrides {
            Some(path) => OverrideSet::load(path)?,
            None => OverrideSet::default(),
        };

        let override_count = overrides.ids().count();
        let policy = NonSubstantivePolicy::from_config(profiles.policy())?;
        let parsers = Arc::new(ParserSet::builtin(policy));
        let registry = Registry::new(profiles, overrides, &parsers)?;

        info!(
            agents = registry.agent_ids().len(),
            overrides = override_count,
            "agent registry loaded"
        );

        Ok(Self::new(registry, AgentRunner::new(parsers)))
    }

    /// Built-in profiles, no overrides.
    pub fn builtin() -> Result<Self> {
        Self::from_paths(None, None)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn runner(&self) -> &AgentRunner {
        &self.runner
    }

    /// Resolve `agent_id` for the request's role and execute it.
    pub fn execute(
        &self,
        agent_id: &str,
        request: &ExecutionRequest,
        cancel: &CancelToken,
    ) -> ExecutionOutcome {
        match self.registry.resolve(agent_id, &request.role) {
            Ok(invocation) => self.runner.execute(&invocation, request, cancel),
            Err(err) => ExecutionOutcome::Failure(err),
        }
    }
}
