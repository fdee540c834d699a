// PromptFlow Core - Variable environment
//
// The environment is the name -> value map threaded through a flow run.
// It preserves insertion order and only ever grows during a run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Insertion-ordered variable environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableEnvironment {
    vars: Map<String, Value>,
}

impl VariableEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a variable value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Set a variable. Existing keys keep their original position.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Merge another map into this one, key by key
    pub fn extend(&mut self, other: Map<String, Value>) {
        for (k, v) in other {
            self.vars.insert(k, v);
        }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.vars.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.vars
    }

    /// JSON object snapshot of the current state
    pub fn snapshot(&self) -> Value {
        Value::Object(self.vars.clone())
    }
}

impl From<Map<String, Value>> for VariableEnvironment {
    fn from(vars: Map<String, Value>) -> Self {
        Self { vars }
    }
}

impl From<HashMap<String, String>> for VariableEnvironment {
    fn from(vars: HashMap<String, String>) -> Self {
        vars.into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect()
    }
}

impl FromIterator<(String, Value)> for VariableEnvironment {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}
