//! Per-operation context: who is acting, a value store, and the activation
//! counters of dynamic grants.
//!
//! A context belongs to one logical operation (usually one request). Values
//! and counters are sharded maps, so concurrent work inside one operation
//! never takes a process-wide lock and separate operations share nothing.

use crate::dynamic::ActivationKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value as JsonValue;

/// Context value key holding the current user's id, used by filters that
/// compare record fields against the caller.
pub const USER_ID_KEY: &str = "user_id";

#[derive(Debug, Default)]
pub struct OperationContext {
    name: String,
    values: DashMap<String, JsonValue>,
    activations: DashMap<ActivationKey, usize>,
}

impl OperationContext {
    /// A new context; `name` identifies it in diagnostics (session, request id).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A context acting on behalf of a user
    pub fn for_user(name: impl Into<String>, user_id: impl Into<JsonValue>) -> Self {
        let ctx = Self::new(name);
        ctx.set_value(USER_ID_KEY, user_id);
        ctx
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn user_id(&self) -> Option<JsonValue> {
        self.get_value(USER_ID_KEY)
    }

    pub fn get_value(&self, key: &str) -> Option<JsonValue> {
        self.values.get(key).map(|v| v.value().clone())
    }

    pub fn get_value_or(&self, key: &str, default: JsonValue) -> JsonValue {
        self.get_value(key).unwrap_or(default)
    }

    pub fn set_value(&self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove_value(&self, key: &str) -> Option<JsonValue> {
        self.values.remove(key).map(|(_, v)| v)
    }

    /// Number of open activations for a dynamic grant
    pub(crate) fn activation_count(&self, key: ActivationKey) -> usize {
        self.activations.get(&key).map_or(0, |c| *c)
    }

    /// Increment an activation counter, returning the new count.
    pub(crate) fn increment_activation(&self, key: ActivationKey) -> usize {
        let mut count = self.activations.entry(key).or_insert(0);
        *count += 1;
        *count
    }

    /// Decrement an activation counter, dropping the entry at zero.
    /// Returns the remaining count.
    pub(crate) fn decrement_activation(&self, key: ActivationKey) -> usize {
        match self.activations.entry(key) {
            Entry::Occupied(mut entry) => {
                if *entry.get() <= 1 {
                    entry.remove();
                    0
                } else {
                    *entry.get_mut() -= 1;
                    *entry.get()
                }
            }
            Entry::Vacant(_) => 0,
        }
    }

    /// Number of dynamic grants with open activations in this context
    pub fn active_grant_count(&self) -> usize {
        self.activations.len()
    }
}
