//! Profiles and role prompts compiled into the crate.

/// Profile document for the supported agents.
pub const PROFILES_YAML: &str = include_str!("builtin.yaml");

/// Prefix of a prompt reference that names a compiled-in prompt.
pub const PROMPT_PREFIX: &str = "builtin:";

const PROMPTS: &[(&str, &str)] = &[
    ("default", include_str!("prompts/default.txt")),
    ("planner", include_str!("prompts/planner.txt")),
    ("codereviewer", include_str!("prompts/codereviewer.txt")),
];

/// Look up a compiled-in prompt by name.
pub fn prompt(name: &str) -> Option<&'static str> {
    PROMPTS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, text)| *text)
}

/// Names of the compiled-in prompts.
pub fn prompt_names() -> impl Iterator<Item = &'static str> {
    PROMPTS.iter().map(|(name, _)| *name)
}
