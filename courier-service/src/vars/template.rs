//! `{{name}}` placeholder expansion
//!
//! A single left-to-right pass: values are substituted verbatim and never
//! re-expanded, so a value containing `{{x}}` stays as-is. Unknown names
//! expand to the empty string and are reported once each for diagnostics.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::store::VariableStore;

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z0-9_.\-]+)\}\}").expect("token pattern is valid"));

/// Result of expanding one template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub output: String,
    /// Names that had no enabled value in any scope, deduplicated in first
    /// occurrence order
    pub unresolved: Vec<String>,
}

/// Expand every `{{IDENT}}` token in `template` against the store
pub fn expand(template: &str, store: &VariableStore) -> Expansion {
    let mut unresolved: Vec<String> = Vec::new();
    let output = TOKEN.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match store.resolve(name) {
            Some(resolved) => resolved.value.to_string(),
            None => {
                if !unresolved.iter().any(|u| u == name) {
                    unresolved.push(name.to_string());
                }
                String::new()
            }
        }
    });

    Expansion {
        output: output.into_owned(),
        unresolved,
    }
}
