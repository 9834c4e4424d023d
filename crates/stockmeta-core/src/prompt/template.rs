//! `{name}` placeholder substitution.
//!
//! `{{` and `}}` produce literal braces. Any placeholder without a value, or a
//! stray brace, is an error so the caller can fall back to a built-in prompt.

use std::collections::HashMap;

/// Why a template could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    UnknownPlaceholder(String),
    UnbalancedBrace(usize),
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPlaceholder(name) => write!(f, "no value for placeholder {{{name}}}"),
            Self::UnbalancedBrace(pos) => write!(f, "unbalanced brace at byte {pos}"),
        }
    }
}

/// Substitute `{name}` placeholders from `vars`.
pub fn render(template: &str, vars: &HashMap<String, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, '{')) | None => return Err(TemplateError::UnbalancedBrace(pos)),
                        Some((_, ch)) => name.push(ch),
                    }
                }
                let value = vars
                    .get(name.trim())
                    .ok_or_else(|| TemplateError::UnknownPlaceholder(name.clone()))?;
                out.push_str(value);
            }
            '}' => return Err(TemplateError::UnbalancedBrace(pos)),
            other => out.push(other),
        }
    }
    Ok(out)
}
