use regex::Regex;

use crate::core::{RenderError, VarMap};

/// Template renderer contract: raw text plus a variable mapping in,
/// rendered text out. Referencing a name absent from the mapping is an
/// error, never an empty substitution.
pub trait Renderer {
    fn render(&self, raw: &str, vars: &VarMap) -> Result<String, RenderError>;
}

/// Built-in renderer: substitutes `{{ name }}` placeholders.
///
/// Rendering internals are deliberately a black box to the engine; a
/// richer template engine can be plugged in through the [`Renderer`]
/// trait without touching planning or execution.
#[derive(Debug)]
pub struct VarRenderer {
    placeholder: Regex,
}

impl VarRenderer {
    pub fn new() -> Self {
        Self {
            placeholder: Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
                .unwrap(),
        }
    }
}

impl Default for VarRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for VarRenderer {
    fn render(&self, raw: &str, vars: &VarMap) -> Result<String, RenderError> {
        let mut missing: Option<String> = None;
        let rendered = self
            .placeholder
            .replace_all(raw, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                match vars.get(name) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => {
                        if missing.is_none() {
                            missing = Some(name.to_string());
                        }
                        String::new()
                    }
                }
            })
            .into_owned();

        match missing {
            Some(name) => Err(RenderError::UndefinedVariable(name)),
            None => Ok(rendered),
        }
    }
}
