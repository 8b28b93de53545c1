//! Context type for correlating a dispatch with the records it produces

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Correlation id carried by every event
///
/// Synthetic events (group firings, scroll checkpoints) get a child of the
/// context that produced them, so an act record traces back to a host event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// ULID string
    pub id: String,

    /// Context of the event this one was derived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// A root context
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
        }
    }

    /// A root context with a fixed id
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
        }
    }

    /// A fresh context derived from this one
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_context_links_parent() {
        let parent = Context::with_id("root");
        let child = parent.child();

        assert_eq!(child.parent_id.as_deref(), Some("root"));
        assert_ne!(child.id, parent.id);
        assert_eq!(child.id.len(), 26);
    }
}
