//! Known-benign stderr noise.
//!
//! Some agents print platform warnings on stderr on every run (iflow on
//! Windows prints "The system cannot find the path specified"). Profiles list
//! regexes for such lines; matching lines are removed before stderr reaches
//! the parser and the number of removed lines is recorded in metadata.

use crate::error::{BridgeError, Result};
use regex::Regex;
use serde::{Serialize, Serializer};

/// Compiled per-agent stderr noise patterns.
#[derive(Clone, Default)]
pub struct NoiseFilter {
    patterns: Vec<(Regex, String)>,
}

impl std::fmt::Debug for NoiseFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.patterns.iter().map(|(_, source)| source))
            .finish()
    }
}

impl PartialEq for NoiseFilter {
    fn eq(&self, other: &Self) -> bool {
        self.sources().eq(other.sources())
    }
}

impl Serialize for NoiseFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.sources())
    }
}

impl NoiseFilter {
    /// Compile noise patterns declared by agent `agent`.
    pub fn new(agent: &str, patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map(|r| (r, p.clone())).map_err(|e| {
                    BridgeError::Config(format!(
                        "agent '{}': invalid stderr_noise pattern '{}': {}",
                        agent, p, e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Source strings of the compiled patterns.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(_, source)| source.as_str())
    }

    /// Remove matching lines. Returns the kept text and the number of lines removed.
    pub fn filter(&self, stderr: &str) -> (String, usize) {
        if self.patterns.is_empty() {
            return (stderr.to_string(), 0);
        }

        let mut removed = 0;
        let kept: Vec<&str> = stderr
            .lines()
            .filter(|line| {
                let noisy = self.patterns.iter().any(|(re, _)| re.is_match(line));
                if noisy {
                    removed += 1;
                }
                !noisy
            })
            .collect();

        (kept.join("\n"), removed)
    }
}
