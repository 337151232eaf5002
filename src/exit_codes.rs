//! Exit code constants for the agent-bridge binary.
//!
//! - 0: Success
//! - 1: Configuration error (bad profile or override data)
//! - 2: Caller error (unknown agent, unsupported role)
//! - 3: Launch failure (executable missing, spawn failed)
//! - 4: Agent timed out
//! - 5: Agent output could not be parsed
//! - 6: Call was cancelled

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Profile or override data is malformed.
pub const CONFIG_ERROR: i32 = 1;

/// Unknown agent id or role the agent does not support.
pub const USAGE_ERROR: i32 = 2;

/// The agent executable could not be started.
pub const LAUNCH_FAILURE: i32 = 3;

/// The agent exceeded its timeout and was killed.
pub const TIMEOUT: i32 = 4;

/// The agent's output did not match its declared wire format.
pub const PARSE_FAILURE: i32 = 5;

/// The call was cancelled before the agent finished.
pub const CANCELLED: i32 = 6;
