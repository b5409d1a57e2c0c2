//! Opaque user profile returned by the auth endpoints

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Profile fields owned by the caller. The client core never interprets them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Value);

impl UserProfile {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Convenience lookup of a top-level string field (e.g. `email`).
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }
}

impl From<Value> for UserProfile {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
