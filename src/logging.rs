//! Log subscriber setup for the binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to whoever embeds it. Output goes to stderr so stdout stays JSON.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "AGENT_BRIDGE_LOG";

const DEFAULT_FILTER: &str = "agent_bridge=info";

/// Install the global subscriber. `verbose` raises the default to debug.
///
/// Directives in `AGENT_BRIDGE_LOG` win over both defaults. Calling this
/// twice is harmless; the second call is ignored.
pub fn init(verbose: bool) {
    let filter = filter_from(std::env::var(LOG_ENV).ok().as_deref(), verbose);

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .try_init();
}

fn filter_from(directives: Option<&str>, verbose: bool) -> EnvFilter {
    let fallback = if verbose {
        "agent_bridge=debug"
    } else {
        DEFAULT_FILTER
    };

    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback))
}
