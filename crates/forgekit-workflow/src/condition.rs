use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use forgekit_core::types::StateMap;

/// Runtime gate on a dependency edge, evaluated against the current state.
///
/// An absent key leaves the condition unsatisfied; it never fails the run.
#[derive(Clone)]
pub enum Condition {
    /// Satisfied when `state[key]` equals the literal value.
    Equals { key: String, value: Value },
    /// Satisfied when the key is present and the predicate holds for its value.
    Predicate {
        key: String,
        test: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
    },
}

impl Condition {
    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn predicate<F>(key: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::Predicate {
            key: key.into(),
            test: Arc::new(test),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Equals { key, .. } | Self::Predicate { key, .. } => key,
        }
    }

    pub fn is_satisfied(&self, state: &StateMap) -> bool {
        match self {
            Self::Equals { key, value } => state.get(key) == Some(value),
            Self::Predicate { key, test } => state.get(key).is_some_and(|v| test(v)),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { key, value } => f
                .debug_struct("Equals")
                .field("key", key)
                .field("value", value)
                .finish(),
            Self::Predicate { key, .. } => f
                .debug_struct("Predicate")
                .field("key", key)
                .finish_non_exhaustive(),
        }
    }
}
