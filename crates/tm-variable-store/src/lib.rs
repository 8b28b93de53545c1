//! Variable storage for the tag manager
//!
//! Segments read variables through the [`VariableLookup`] trait. The
//! [`VariableStore`] implementation keeps declared variables in a concurrent
//! map; each one holds either a plain value set by the host, nothing yet, or
//! a provider closure that computes the value on demand (cookie readers, URL
//! parsers and DOM reads live behind such providers).

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tm_core::{Event, FieldValue};
use tracing::{debug, instrument, trace};

/// Errors raised by variable lookups
#[derive(Debug, Clone, Error)]
pub enum VariableError {
    #[error("variable not declared: {0}")]
    NotFound(String),

    #[error("variable provider failed for {name}: {message}")]
    Provider { name: String, message: String },
}

/// Result type for variable lookups
pub type VariableResult<T> = Result<T, VariableError>;

/// Provider closure computing a variable from the current event (if any)
///
/// Returning `Ok(None)` yields `undefined`.
pub type VariableProvider =
    Arc<dyn Fn(Option<&Event>) -> Result<Option<serde_json::Value>, String> + Send + Sync>;

/// Variable lookup collaborator
pub trait VariableLookup: Send + Sync {
    /// Resolve a variable by name
    ///
    /// An error means the reference could not be resolved at all; a declared
    /// variable without a value resolves to [`FieldValue::Undefined`].
    fn resolve(&self, name: &str, event: Option<&Event>) -> VariableResult<FieldValue>;
}

#[derive(Clone)]
enum VariableEntry {
    Unset,
    Value(serde_json::Value),
    Provider(VariableProvider),
}

/// The variable store tracks declared variables
pub struct VariableStore {
    variables: DashMap<String, VariableEntry>,
}

impl VariableStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            variables: DashMap::new(),
        }
    }

    /// Declare a variable without a value
    ///
    /// Already declared variables keep their current value.
    pub fn declare(&self, name: impl Into<String>) {
        self.variables.entry(name.into()).or_insert(VariableEntry::Unset);
    }

    /// Set (and declare) a variable
    #[instrument(skip(self, name, value), fields(name = %name.as_ref()))]
    pub fn set(&self, name: impl AsRef<str>, value: serde_json::Value) {
        debug!("Setting variable");
        self.variables
            .insert(name.as_ref().to_string(), VariableEntry::Value(value));
    }

    /// Register a provider for a variable
    pub fn set_provider<F>(&self, name: impl Into<String>, provider: F)
    where
        F: Fn(Option<&Event>) -> Result<Option<serde_json::Value>, String> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(name = %name, "Registering variable provider");
        self.variables
            .insert(name, VariableEntry::Provider(Arc::new(provider)));
    }

    /// Clear a variable's value, keeping it declared
    pub fn unset(&self, name: &str) {
        if let Some(mut entry) = self.variables.get_mut(name) {
            *entry = VariableEntry::Unset;
        }
    }

    /// Remove a variable entirely
    pub fn remove(&self, name: &str) -> bool {
        self.variables.remove(name).is_some()
    }

    /// Check whether a variable is declared
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Number of declared variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether no variables are declared
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableLookup for VariableStore {
    fn resolve(&self, name: &str, event: Option<&Event>) -> VariableResult<FieldValue> {
        // Clone the entry so the map shard is not locked while a provider runs
        let entry = self
            .variables
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| VariableError::NotFound(name.to_string()))?;

        let value = match entry {
            VariableEntry::Unset => FieldValue::Undefined,
            VariableEntry::Value(v) => FieldValue::from_json(&v),
            VariableEntry::Provider(provider) => match provider(event) {
                Ok(Some(v)) => FieldValue::from_json(&v),
                Ok(None) => FieldValue::Undefined,
                Err(message) => {
                    return Err(VariableError::Provider {
                        name: name.to_string(),
                        message,
                    })
                }
            },
        };

        trace!(name, ?value, "Resolved variable");
        Ok(value)
    }
}

/// Thread-safe wrapper for VariableStore
pub type SharedVariableStore = Arc<VariableStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tm_core::EventCategory;

    #[test]
    fn test_undeclared_variable_is_error() {
        let store = VariableStore::new();
        assert!(matches!(
            store.resolve("missing", None),
            Err(VariableError::NotFound(_))
        ));
    }

    #[test]
    fn test_declared_without_value_is_undefined() {
        let store = VariableStore::new();
        store.declare("user_id");
        assert_eq!(store.resolve("user_id", None).unwrap(), FieldValue::Undefined);

        store.set("user_id", json!("u-1"));
        store.declare("user_id");
        assert_eq!(
            store.resolve("user_id", None).unwrap(),
            FieldValue::Text("u-1".to_string())
        );

        store.unset("user_id");
        assert_eq!(store.resolve("user_id", None).unwrap(), FieldValue::Undefined);
    }

    #[test]
    fn test_set_and_resolve_number() {
        let store = VariableStore::new();
        store.set("cart_total", json!(99.5));
        assert_eq!(
            store.resolve("cart_total", None).unwrap(),
            FieldValue::Number(99.5)
        );
        assert_eq!(store.len(), 1);
        assert!(store.remove("cart_total"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_provider_sees_event() {
        let store = VariableStore::new();
        store.set_provider("event_category", |event| {
            Ok(event.map(|e| json!(e.category.as_str())))
        });

        let event = Event::empty(EventCategory::DomReady);
        assert_eq!(
            store.resolve("event_category", Some(&event)).unwrap(),
            FieldValue::Text("dom_ready".to_string())
        );
        assert_eq!(
            store.resolve("event_category", None).unwrap(),
            FieldValue::Undefined
        );
    }

    #[test]
    fn test_provider_failure() {
        let store = VariableStore::new();
        store.set_provider("cookie", |_| Err("cookies disabled".to_string()));
        assert!(matches!(
            store.resolve("cookie", None),
            Err(VariableError::Provider { .. })
        ));
    }
}
