//! Tag registry with async handlers for the tag manager
//!
//! Tags are the side-effecting actions instructions execute: HTML snippets,
//! pixels, popups, analytics pushes. Their implementations live outside the
//! engine; the registry only maps a tag id to an async handler.

use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tm_core::{Context, Event};
use tracing::{debug, instrument, warn};

/// Result type for tag execution
pub type TagResult = Result<(), TagError>;

/// Future type for async tag handlers
pub type TagFuture = Pin<Box<dyn Future<Output = TagResult> + Send>>;

/// Tag handler function type
pub type TagHandler = Arc<dyn Fn(TagCall) -> TagFuture + Send + Sync>;

/// Errors that can occur when working with tags
#[derive(Debug, Clone, Error)]
pub enum TagError {
    #[error("tag not found: {0}")]
    NotFound(String),

    #[error("tag execution failed: {0}")]
    ExecutionFailed(String),
}

/// A request to execute a tag
#[derive(Debug, Clone)]
pub struct TagCall {
    /// Tag being executed
    pub tag_id: String,
    /// Instruction that bound the tag
    pub instruction_id: String,
    /// Event that caused the execution
    pub event: Event,
    /// Correlation context
    pub context: Context,
}

/// Information about a registered tag
#[derive(Debug, Clone)]
pub struct TagDescription {
    /// Tag id referenced by instructions
    pub id: String,
    /// Implementation kind (e.g. "html", "pixel")
    pub kind: Option<String>,
    /// Human-readable name
    pub name: Option<String>,
}

/// Internal representation of a registered tag
struct RegisteredTag {
    handler: TagHandler,
    description: TagDescription,
}

/// The tag registry manages all registered tags
pub struct TagRegistry {
    tags: DashMap<String, RegisteredTag>,
}

impl TagRegistry {
    /// Create a new empty tag registry
    pub fn new() -> Self {
        Self {
            tags: DashMap::new(),
        }
    }

    /// Register a tag handler
    #[instrument(skip(self, id, handler), fields(tag_id = %id.as_ref()))]
    pub fn register<F, Fut>(&self, id: impl AsRef<str>, handler: F)
    where
        F: Fn(TagCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TagResult> + Send + 'static,
    {
        let description = TagDescription {
            id: id.as_ref().to_string(),
            kind: None,
            name: None,
        };
        self.register_with_description(description, handler);
    }

    /// Register a tag with full description
    pub fn register_with_description<F, Fut>(&self, description: TagDescription, handler: F)
    where
        F: Fn(TagCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TagResult> + Send + 'static,
    {
        debug!(tag_id = %description.id, kind = ?description.kind, "Registering tag");

        let handler: TagHandler = Arc::new(move |call| Box::pin(handler(call)) as TagFuture);

        self.tags.insert(
            description.id.clone(),
            RegisteredTag {
                handler,
                description,
            },
        );
    }

    /// Resolve a tag handler
    pub fn get(&self, id: &str) -> Option<TagHandler> {
        self.tags.get(id).map(|t| t.handler.clone())
    }

    /// Execute a tag
    pub async fn call(&self, call: TagCall) -> TagResult {
        let handler = self.get(&call.tag_id).ok_or_else(|| {
            warn!(tag_id = %call.tag_id, "Tag not found");
            TagError::NotFound(call.tag_id.clone())
        })?;

        debug!(
            tag_id = %call.tag_id,
            instruction_id = %call.instruction_id,
            "Executing tag"
        );
        handler(call).await
    }

    /// Check if a tag exists
    pub fn has_tag(&self, id: &str) -> bool {
        self.tags.contains_key(id)
    }

    /// Get a tag description
    pub fn describe(&self, id: &str) -> Option<TagDescription> {
        self.tags.get(id).map(|t| t.description.clone())
    }

    /// Unregister a tag
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.tags.remove(id).is_some();
        if removed {
            debug!(tag_id = %id, "Unregistered tag");
        }
        removed
    }

    /// Get total number of registered tags
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for TagRegistry
pub type SharedTagRegistry = Arc<TagRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tm_core::EventCategory;

    fn call_for(tag_id: &str) -> TagCall {
        TagCall {
            tag_id: tag_id.to_string(),
            instruction_id: "i1".to_string(),
            event: Event::empty(EventCategory::ViewPage),
            context: Context::new(),
        }
    }

    #[tokio::test]
    async fn test_register_and_call() {
        let registry = TagRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        registry.register("pixel", move |call: TagCall| {
            let counter = counter.clone();
            async move {
                assert_eq!(call.instruction_id, "i1");
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio_test::assert_ok!(registry.call(call_for("pixel")).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_call_outside_a_runtime() {
        let registry = TagRegistry::new();
        registry.register("pixel", |call: TagCall| async move {
            assert_eq!(call.tag_id, "pixel");
            Ok(())
        });

        tokio_test::assert_ok!(tokio_test::block_on(registry.call(call_for("pixel"))));
        tokio_test::assert_err!(tokio_test::block_on(registry.call(call_for("other"))));
    }

    #[tokio::test]
    async fn test_tag_not_found() {
        let registry = TagRegistry::new();
        let result = registry.call(call_for("missing")).await;
        assert!(matches!(result, Err(TagError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_tag_error() {
        let registry = TagRegistry::new();
        registry.register("broken", |_: TagCall| async {
            Err(TagError::ExecutionFailed("intentional failure".to_string()))
        });

        let err = tokio_test::assert_err!(registry.call(call_for("broken")).await);
        assert!(matches!(err, TagError::ExecutionFailed(_)));
    }

    #[test]
    fn test_describe_and_unregister() {
        let registry = TagRegistry::new();
        registry.register_with_description(
            TagDescription {
                id: "ga".to_string(),
                kind: Some("html".to_string()),
                name: Some("Analytics".to_string()),
            },
            |_: TagCall| async { Ok(()) },
        );

        assert!(registry.has_tag("ga"));
        assert_eq!(registry.describe("ga").unwrap().kind.as_deref(), Some("html"));
        assert_eq!(registry.tag_count(), 1);
        assert!(registry.unregister("ga"));
        assert!(!registry.unregister("ga"));
        assert!(registry.get("ga").is_none());
    }
}
