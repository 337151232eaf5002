//! Agent runner.
//!
//! Executes one [`ResolvedInvocation`](crate::registry::ResolvedInvocation)
//! against one [`ExecutionRequest`]:
//!
//! - Builds the argv (session slot, system prompt, prompt delivery)
//! - Spawns the agent with stdin/stdout/stderr piped and a hard timeout
//! - Strips configured stderr noise and hands both streams to the parser
//! - Retries once by continuing the session when the answer is non-substantive
//!
//! Each call owns its own process and buffers, so independent calls may run
//! on separate threads without coordinating.

mod cancel;
mod command;
mod executor;
mod noise;
mod outcome;
mod process;
mod request;
pub(crate) mod template;

#[cfg(test)]
mod tests;

pub use cancel::CancelToken;
pub use command::{CommandSpec, build_command};
pub use executor::{AgentRunner, should_retry};
pub use noise::NoiseFilter;
pub use outcome::ExecutionOutcome;
pub use request::ExecutionRequest;
