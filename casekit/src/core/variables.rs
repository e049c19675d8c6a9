//! Variable scopes attached to case executions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flattened name -> value view used for guard evaluation and snapshots.
pub type Variables = BTreeMap<String, Value>;

/// Local variables owned by one execution.
///
/// Delegation to ancestors is resolved by the instance that owns the tree;
/// a scope only knows its own values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableScope {
    values: Variables,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Store `value` under `name`, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn values(&self) -> &Variables {
        &self.values
    }

    /// Copy entries not already present in `into` (nearest scope wins).
    pub fn merge_missing_into(&self, into: &mut Variables) {
        for (name, value) in &self.values {
            into.entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }
}
