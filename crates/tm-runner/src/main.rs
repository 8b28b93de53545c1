//! Tag Manager Runner
//!
//! Boots a dispatcher from a container file and replays a recorded page
//! session through it, printing every act record as a JSON line.
//!
//! ```text
//! tagmanager <container.yaml> [session.jsonl] [--wait]
//! ```

mod replay;
mod tags;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tm_engine::{Dispatcher, EngineConfig};
use tm_event_bus::EventBus;
use tm_tag_registry::TagRegistry;
use tm_variable_store::VariableStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command line arguments
struct Args {
    container: PathBuf,
    session: Option<PathBuf>,
    /// Keep timers running until ctrl-c after the replay
    wait: bool,
}

impl Args {
    fn parse(args: impl Iterator<Item = String>) -> Result<Self> {
        let mut positional = Vec::new();
        let mut wait = false;
        for arg in args {
            match arg.as_str() {
                "--wait" => wait = true,
                flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
                _ => positional.push(PathBuf::from(arg)),
            }
        }

        let mut positional = positional.into_iter();
        let Some(container) = positional.next() else {
            bail!("usage: tagmanager <container.yaml> [session.jsonl] [--wait]");
        };
        let session = positional.next();
        if positional.next().is_some() {
            bail!("too many arguments");
        }

        Ok(Self {
            container,
            session,
            wait,
        })
    }
}

/// Everything a page needs to run a container
pub struct Page {
    pub variables: Arc<VariableStore>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Page {
    /// Build a page from a container file
    pub fn boot(container: &Path) -> Result<Self> {
        let config_dir = container
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file = container.file_name().map(Path::new).unwrap_or(container);
        let value = tm_config::load_container(&config_dir, file)
            .with_context(|| format!("loading container {}", container.display()))?;
        let config = EngineConfig::from_yaml_value(value)?;

        let variables = Arc::new(VariableStore::new());
        config.apply_variables(&variables);

        let registry = TagRegistry::new();
        tags::register_all(&registry, &config.tags);

        let dispatcher = Dispatcher::new(
            &config,
            variables.clone(),
            Arc::new(registry),
            Arc::new(EventBus::new()),
        )?;

        Ok(Self {
            variables,
            dispatcher,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    info!(container = %args.container.display(), "Starting tag manager");

    let page = Page::boot(&args.container)?;

    let mut acts = page.dispatcher.subscribe_acts();
    let printer = tokio::spawn(async move {
        while let Ok(record) = acts.recv().await {
            match serde_json::to_string(&record) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Could not serialize act record"),
            }
        }
    });

    page.dispatcher.start();

    if let Some(session) = &args.session {
        let content = tokio::fs::read_to_string(session)
            .await
            .with_context(|| format!("reading session {}", session.display()))?;
        let replayed = replay::run(&page, &content).await?;
        info!(lines = replayed, "Session replayed");
    }

    if args.wait {
        info!("Waiting for ctrl-c");
        tokio::signal::ctrl_c().await?;
    }

    info!("Shutting down...");
    page.dispatcher.stop();
    drop(page);
    // The act channel closes once the last dispatcher handle is gone
    let _ = printer.await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        Args::parse(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["container.yaml", "session.jsonl", "--wait"]).unwrap();
        assert_eq!(parsed.container, PathBuf::from("container.yaml"));
        assert_eq!(parsed.session, Some(PathBuf::from("session.jsonl")));
        assert!(parsed.wait);

        let parsed = args(&["container.yaml"]).unwrap();
        assert!(parsed.session.is_none());
        assert!(!parsed.wait);

        assert!(args(&[]).is_err());
        assert!(args(&["a", "b", "c"]).is_err());
        assert!(args(&["a", "--verbose"]).is_err());
    }

    #[tokio::test]
    async fn test_boot_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("triggers.yaml"),
            "- { id: t_view, category: view_page }\n",
        )
        .unwrap();
        let container = dir.path().join("container.yaml");
        std::fs::write(
            &container,
            r#"
tags: [{ id: log, kind: noop }]
triggers: !include triggers.yaml
instructions:
  - { id: i_view, trigger_ids: [t_view], tag_id: log }
"#,
        )
        .unwrap();

        let page = Page::boot(&container).unwrap();
        let record = page
            .dispatcher
            .dispatch(tm_core::Event::empty(tm_core::EventCategory::ViewPage))
            .await
            .into_record()
            .unwrap();
        assert_eq!(record.activated_instructions, vec!["i_view"]);
    }
}
