//! Variable scope and `{{expr}}` substitution.
//!
//! The templating engine proper is outside this crate; this module is the
//! black-box seam the pipeline calls before transport. Expressions are dotted
//! paths looked up in a [`VariableSet`], where values are JSON so a named
//! region's response body can be addressed field by field.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

/// Scoped variable map. Later [`set`](VariableSet::set) calls shadow earlier
/// ones, which gives the global-then-local overlay order.
#[derive(Debug, Clone, Default)]
pub struct VariableSet {
    values: HashMap<String, Value>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn set_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), Value::String(value.into()));
    }

    pub fn extend_text<I>(&mut self, assignments: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in assignments {
            self.set_text(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Resolves a dotted path such as `foo.test` against the stored values.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Replaces every `{{expr}}` in `text` with the looked-up value. Strings are
/// inserted raw, other JSON values in their compact rendering. Unresolvable
/// expressions are left untouched so the failure stays visible downstream.
pub fn replace_variables(text: &str, variables: &VariableSet) -> String {
    let pattern = Regex::new(r"\{\{\s*([^}]+?)\s*\}\}").unwrap();
    pattern
        .replace_all(text, |caps: &regex::Captures| {
            match variables.lookup(&caps[1]) {
                Some(Value::String(text)) => text.clone(),
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
