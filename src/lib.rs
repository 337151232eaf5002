//! Agent bridge: invoke external command-line AI agents and normalize
//! their answers.
//!
//! An orchestrator asks for an agent by id and role. The [`registry`]
//! resolves that into a concrete invocation, the [`runner`] spawns the
//! agent and enforces timeout, cancellation and the single continuation
//! retry, and the [`parser`] set turns the agent's wire format into a
//! [`parser::ParsedResponse`].
//!
//! [`bridge::Bridge`] ties the three together.

pub mod bridge;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod parser;
pub mod registry;
pub mod runner;

pub use bridge::Bridge;
pub use error::{BridgeError, Result};
