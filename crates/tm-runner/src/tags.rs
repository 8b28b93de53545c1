//! Built-in tag kinds for the runner
//!
//! Real tags live in the host page. The runner stands them in with handlers
//! that log the call, do nothing, or fail.

use tm_engine::TagConfig;
use tm_tag_registry::{TagCall, TagDescription, TagError, TagRegistry};
use tracing::{info, warn};

/// How a container tag is executed by the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Log,
    Noop,
    Fail,
}

impl TagKind {
    fn from_config(config: &TagConfig) -> Self {
        match config.kind.as_deref() {
            None | Some("log") => TagKind::Log,
            Some("noop") => TagKind::Noop,
            Some("fail") => TagKind::Fail,
            Some(other) => {
                warn!(tag_id = %config.id, kind = other, "Unknown tag kind, logging instead");
                TagKind::Log
            }
        }
    }
}

/// Register one handler per container tag
pub fn register_all(registry: &TagRegistry, tags: &[TagConfig]) {
    for config in tags {
        let kind = TagKind::from_config(config);
        let description = TagDescription {
            id: config.id.clone(),
            kind: config.kind.clone(),
            name: config.name.clone(),
        };
        registry.register_with_description(description, move |call: TagCall| async move {
            match kind {
                TagKind::Log => {
                    info!(
                        tag_id = %call.tag_id,
                        instruction_id = %call.instruction_id,
                        category = %call.event.category,
                        "Tag fired"
                    );
                    Ok(())
                }
                TagKind::Noop => Ok(()),
                TagKind::Fail => Err(TagError::ExecutionFailed(format!(
                    "tag {} is configured to fail",
                    call.tag_id
                ))),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_core::{Context, Event};

    fn tag(id: &str, kind: Option<&str>) -> TagConfig {
        TagConfig {
            id: id.to_string(),
            kind: kind.map(str::to_string),
            name: None,
        }
    }

    fn call(tag_id: &str) -> TagCall {
        TagCall {
            tag_id: tag_id.to_string(),
            instruction_id: "i".to_string(),
            event: Event::initialization(),
            context: Context::new(),
        }
    }

    #[tokio::test]
    async fn test_registered_kinds() {
        let registry = TagRegistry::new();
        register_all(
            &registry,
            &[
                tag("ga", None),
                tag("pixel", Some("noop")),
                tag("broken", Some("fail")),
                tag("odd", Some("carrier_pigeon")),
            ],
        );

        assert_eq!(registry.tag_count(), 4);
        assert!(registry.call(call("ga")).await.is_ok());
        assert!(registry.call(call("pixel")).await.is_ok());
        assert!(registry.call(call("odd")).await.is_ok());
        assert!(matches!(
            registry.call(call("broken")).await,
            Err(TagError::ExecutionFailed(_))
        ));
        assert_eq!(
            registry.describe("pixel").and_then(|d| d.kind),
            Some("noop".to_string())
        );
    }
}
