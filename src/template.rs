//! Template interpolation for stream paths
//!
//! Handles `{{ variable }}` interpolation in connector definitions.
//! Supports nested access like `{{ config.data_dir }}` and `{{ slice.repository }}`;
//! a bare name looks in the slice values first, then in the config.

use crate::error::{Error, Result};
use crate::stream::Slice;
use crate::types::JsonValue;
use regex::Regex;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\s*\}\}")
        .expect("template pattern is valid")
});

/// Context for template interpolation
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    /// Connector configuration values
    pub config: &'a JsonValue,
    /// Current slice values
    pub slice: Option<&'a Slice>,
}

impl<'a> TemplateContext<'a> {
    /// Context with config values only
    pub fn new(config: &'a JsonValue) -> Self {
        Self {
            config,
            slice: None,
        }
    }

    /// Add slice values
    #[must_use]
    pub fn with_slice(mut self, slice: &'a Slice) -> Self {
        self.slice = Some(slice);
        self
    }

    /// Get a value by path (e.g., "config.data_dir")
    pub fn get(&self, path: &str) -> Option<&'a JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        let (head, rest) = parts.split_first()?;

        match *head {
            "config" => get_nested_value(self.config, rest),
            "slice" => {
                let (key, rest) = rest.split_first()?;
                get_nested_value(self.slice?.get(key)?, rest)
            }
            _ => self
                .slice
                .and_then(|slice| slice.get(head))
                .and_then(|value| get_nested_value(value, rest))
                .or_else(|| get_nested_value(self.config, &parts)),
        }
    }
}

/// Get a nested value from a JSON value by path
fn get_nested_value<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut current = value;
    for part in path {
        match current {
            JsonValue::Object(map) => {
                current = map.get(*part)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext<'_>) -> Result<String> {
    let mut missing = Vec::new();

    let rendered = TEMPLATE_REGEX.replace_all(template, |caps: &regex::Captures<'_>| {
        let var_path = &caps[1];
        match ctx.get(var_path) {
            Some(value) => value_to_string(value),
            None => {
                missing.push(var_path.to_string());
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(Error::config(format!(
            "Undefined template variable(s): {}",
            missing.join(", ")
        )))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Extract all variable names from a template
pub fn extract_variables(template: &str) -> Vec<String> {
    TEMPLATE_REGEX
        .captures_iter(template)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Convert a JSON value to a string for template substitution
fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null => String::new(),
        _ => value.to_string(),
    }
}
