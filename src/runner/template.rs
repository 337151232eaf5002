//! `{variable}` substitution for session argument slots.
//!
//! Profiles declare where a continuation token goes, e.g.
//! `session_args: ["--resume", "{session_id}"]`. Each element is rendered
//! with the per-call variables:
//!
//! - `{session_id}` - continuation token from a previous response
//! - `{agent}` - agent id
//! - `{role}` - role name
//!
//! `{{` and `}}` render literal braces. Unknown variables are an error rather
//! than an empty substitution, so a typo in a profile fails loudly.

use std::fmt;

/// Variable names available to session argument templates.
pub const SLOT_VARIABLES: &[&str] = &["session_id", "agent", "role"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A variable was referenced but not provided.
    UndefinedVariable { name: String, position: usize },
    /// A `{` was found without a matching `}`.
    UnmatchedBrace { position: usize },
    /// `{}` with nothing inside.
    EmptyVariableName { position: usize },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::UndefinedVariable { name, position } => write!(
                f,
                "undefined variable '{}' at position {} (available: {})",
                name,
                position,
                SLOT_VARIABLES.join(", ")
            ),
            TemplateError::UnmatchedBrace { position } => {
                write!(f, "unmatched '{{' at position {}", position)
            }
            TemplateError::EmptyVariableName { position } => {
                write!(f, "empty variable name '{{}}' at position {}", position)
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// Render one template string against `(name, value)` pairs.
pub fn render(template: &str, variables: &[(&str, &str)]) -> Result<String, TemplateError> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' => {
                if let Some((_, '{')) = chars.peek() {
                    chars.next();
                    result.push('{');
                    continue;
                }

                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, c)) => name.push(c),
                        None => return Err(TemplateError::UnmatchedBrace { position: pos }),
                    }
                }

                let name = name.trim();
                if name.is_empty() {
                    return Err(TemplateError::EmptyVariableName { position: pos });
                }

                match variables.iter().find(|(key, _)| *key == name) {
                    Some((_, value)) => result.push_str(value),
                    None => {
                        return Err(TemplateError::UndefinedVariable {
                            name: name.to_string(),
                            position: pos,
                        });
                    }
                }
            }
            '}' => {
                if let Some((_, '}')) = chars.peek() {
                    chars.next();
                }
                result.push('}');
            }
            _ => result.push(ch),
        }
    }

    Ok(result)
}

/// Check a template against [`SLOT_VARIABLES`] without real values.
pub fn check(template: &str) -> Result<(), TemplateError> {
    let placeholders: Vec<(&str, &str)> = SLOT_VARIABLES.iter().map(|v| (*v, "")).collect();
    render(template, &placeholders).map(|_| ())
}
