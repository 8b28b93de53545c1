//! Session replay
//!
//! A session is a JSON-lines file. Each line is one host operation:
//!
//! ```text
//! {"op": "initialization"}
//! {"op": "event", "category": "click", "data": {"tag": "button", "id": "buy"}}
//! {"op": "set_variable", "name": "page_type", "value": "checkout"}
//! {"op": "run", "instruction_id": "i_ga", "force": true}
//! {"op": "clean"}
//! {"op": "update"}
//! {"op": "sleep", "ms": 1500}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tm_core::Event;
use tm_engine::DispatchOutcome;
use tracing::{debug, warn};

use crate::Page;

/// One line of a session file
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Initialization,
    Event {
        category: String,
        #[serde(default)]
        data: serde_json::Value,
    },
    SetVariable {
        name: String,
        value: serde_json::Value,
    },
    Run {
        instruction_id: String,
        #[serde(default)]
        force: bool,
    },
    Clean,
    Update,
    Sleep {
        ms: u64,
    },
}

/// Parse a session, reporting the offending line number on error
pub fn parse(content: &str) -> Result<Vec<Step>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(number, line)| {
            serde_json::from_str(line).with_context(|| format!("session line {}", number + 1))
        })
        .collect()
}

/// Replay a session against a page; returns the number of steps run
pub async fn run(page: &Page, content: &str) -> Result<usize> {
    let steps = parse(content)?;
    for step in &steps {
        apply(page, step).await?;
    }
    Ok(steps.len())
}

async fn apply(page: &Page, step: &Step) -> Result<()> {
    debug!(?step, "Replaying step");
    match step {
        Step::Initialization => {
            page.dispatcher.dispatch(Event::initialization()).await;
        }
        Step::Event { category, data } => {
            let outcome = page.dispatcher.dispatch_json(category, data.clone()).await?;
            if let DispatchOutcome::Aborted(reason) = outcome {
                warn!(%category, %reason, "Dispatch aborted");
            }
        }
        Step::SetVariable { name, value } => {
            page.variables.set(name, value.clone());
        }
        Step::Run {
            instruction_id,
            force,
        } => {
            page.dispatcher.run_instruction(instruction_id, *force).await?;
        }
        Step::Clean => page.dispatcher.clean(),
        Step::Update => page.dispatcher.update(),
        Step::Sleep { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER: &str = r#"
variables:
  page_type: product
tags:
  - { id: ga, kind: noop }
triggers:
  - { id: t_init, category: initialization }
  - id: t_product_click
    category: click
    segment:
      - { argument: page_type, operator: equals, filter: product }
instructions:
  - { id: i_boot, trigger_ids: [t_init], tag_id: ga, firing_policy: once_page }
  - { id: i_click, trigger_ids: [t_product_click], tag_id: ga }
"#;

    fn page() -> (tempfile::TempDir, Page) {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("container.yaml");
        std::fs::write(&container, CONTAINER).unwrap();
        let page = Page::boot(&container).unwrap();
        (dir, page)
    }

    #[test]
    fn test_parse_session() {
        let steps = parse(
            r#"
# boot
{"op": "initialization"}
{"op": "event", "category": "click", "data": {"tag": "a"}}

{"op": "sleep", "ms": 10}
"#,
        )
        .unwrap();
        assert_eq!(steps.len(), 3);
        assert!(matches!(steps[1], Step::Event { .. }));

        let err = parse("{\"op\": \"initialization\"}\n{\"op\": \"teleport\"}").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_replay_session() {
        let (_dir, page) = page();
        let mut acts = page.dispatcher.subscribe_acts();

        let session = r#"
{"op": "initialization"}
{"op": "initialization"}
{"op": "event", "category": "click", "data": {"tag": "button"}}
{"op": "set_variable", "name": "page_type", "value": "checkout"}
{"op": "event", "category": "click", "data": {"tag": "button"}}
{"op": "clean"}
{"op": "initialization"}
"#;
        assert_eq!(run(&page, session).await.unwrap(), 7);

        let mut activated = Vec::new();
        while let Ok(record) = acts.try_recv() {
            activated.push(record.activated_instructions);
        }
        assert_eq!(
            activated,
            vec![
                vec!["i_boot".to_string()],
                vec![],
                vec!["i_click".to_string()],
                vec![],
                vec!["i_boot".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_category_is_an_error() {
        let (_dir, page) = page();
        let session = r#"{"op": "event", "category": "telepathy"}"#;
        assert!(run(&page, session).await.is_err());
    }
}
