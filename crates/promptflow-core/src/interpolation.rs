//! Variable interpolation for `{{name}}` placeholders
//!
//! Used standalone for prompt templates and inside flow nodes. Matching is
//! equivalent to applying `\{\{([^{}]+)\}\}` sequentially over the text, so
//! nested braces are not supported.

use crate::environment::VariableEnvironment;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder pattern is valid"))
}

/// Anything that can supply a textual value for a variable name
pub trait VariableSource {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>>;
}

impl VariableSource for VariableEnvironment {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).and_then(value_text)
    }
}

impl VariableSource for Map<String, Value> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).and_then(value_text)
    }
}

impl VariableSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|s| Cow::Borrowed(s.as_str()))
    }
}

impl VariableSource for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).and_then(value_text)
    }
}

/// Text form of a JSON value. `null` counts as absent.
fn value_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        other => Some(Cow::Owned(other.to_string())),
    }
}

/// Render a JSON value the way it is substituted into templates
pub fn value_to_text(value: &Value) -> String {
    value_text(value).map(Cow::into_owned).unwrap_or_default()
}

/// Extract placeholder names in first-occurrence order, deduplicated.
///
/// Names are trimmed; empty names are ignored.
pub fn extract_variable_names(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for caps in placeholder_regex().captures_iter(text) {
        let name = caps[1].trim();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    }

    names
}

/// Replace every `{{name}}` with the environment value, else the default,
/// else the empty string. Substituted values are not re-scanned.
pub fn resolve<S: VariableSource + ?Sized>(
    template: &str,
    environment: &S,
    defaults: &HashMap<String, String>,
) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &Captures| {
            let name = caps[1].trim();
            if name.is_empty() {
                return caps[0].to_string();
            }
            if let Some(value) = environment.lookup(name) {
                return value.into_owned();
            }
            defaults.get(name).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Resolve without defaults
pub fn resolve_with<S: VariableSource + ?Sized>(template: &str, environment: &S) -> String {
    resolve(template, environment, &HashMap::new())
}

/// True iff every name has a value or a non-empty default
pub fn validate_required<S: VariableSource + ?Sized>(
    names: &[String],
    environment: &S,
    defaults: &HashMap<String, String>,
) -> bool {
    missing_variables(names, environment, defaults).is_empty()
}

/// Names that have neither a value nor a non-empty default, in input order
pub fn missing_variables<S: VariableSource + ?Sized>(
    names: &[String],
    environment: &S,
    defaults: &HashMap<String, String>,
) -> Vec<String> {
    names
        .iter()
        .filter(|name| {
            environment.lookup(name).is_none()
                && defaults.get(name.as_str()).map_or(true, |d| d.is_empty())
        })
        .cloned()
        .collect()
}
