//! Instructions: trigger to tag bindings
//!
//! Instructions are stored in an [`InstructionArena`] and refer to each other
//! through [`InstructionIndex`] values resolved once at boot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Index;
use tm_core::Event;
use tm_tag_registry::{TagCall, TagError, TagRegistry};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// How often an instruction may execute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiringPolicy {
    /// At most once per dispatch
    OnceEvent,
    /// At most once until the page accumulator is cleaned
    OncePage,
    #[default]
    NoRestriction,
    /// Unrecognised policy; never fires
    #[serde(other)]
    Unknown,
}

/// Time window an instruction is active in (both ends inclusive)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindow {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl ActiveWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start.map(|start| now >= start).unwrap_or(true)
            && self.end.map(|end| now <= end).unwrap_or(true)
    }
}

/// Instruction definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionConfig {
    pub id: String,
    pub trigger_ids: Vec<String>,
    pub tag_id: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub firing_policy: FiringPolicy,
    /// Instruction walked before this one
    #[serde(default)]
    pub before: Option<String>,
    /// Instruction walked after this one
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub period: Option<ActiveWindow>,
}

impl InstructionConfig {
    pub fn new(
        id: impl Into<String>,
        trigger_id: impl Into<String>,
        tag_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            trigger_ids: vec![trigger_id.into()],
            tag_id: tag_id.into(),
            priority: 0,
            firing_policy: FiringPolicy::default(),
            before: None,
            after: None,
            period: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_policy(mut self, policy: FiringPolicy) -> Self {
        self.firing_policy = policy;
        self
    }

    pub fn with_trigger(mut self, trigger_id: impl Into<String>) -> Self {
        self.trigger_ids.push(trigger_id.into());
        self
    }

    pub fn with_before(mut self, id: impl Into<String>) -> Self {
        self.before = Some(id.into());
        self
    }

    pub fn with_after(mut self, id: impl Into<String>) -> Self {
        self.after = Some(id.into());
        self
    }

    pub fn with_period(mut self, period: ActiveWindow) -> Self {
        self.period = Some(period);
        self
    }
}

/// Position of an instruction in its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionIndex(pub usize);

/// Result of running an instruction
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Whether the tag was resolved and invoked
    pub attempted: bool,
    /// Failure reported by the tag
    pub error: Option<String>,
}

/// A runtime instruction
#[derive(Debug, Clone)]
pub struct Instruction {
    pub id: String,
    pub trigger_ids: Vec<String>,
    pub tag_id: String,
    pub priority: i64,
    pub firing_policy: FiringPolicy,
    pub window: Option<ActiveWindow>,
    pub before: Option<InstructionIndex>,
    pub after: Option<InstructionIndex>,
}

impl Instruction {
    /// Whether the instruction may run now
    pub fn act(&self, force: bool) -> bool {
        self.act_at(force, Utc::now())
    }

    pub fn act_at(&self, force: bool, now: DateTime<Utc>) -> bool {
        force || self.window.map(|w| w.contains(now)).unwrap_or(true)
    }

    /// Execute the bound tag if the instruction is active
    pub async fn run(&self, force: bool, tags: &TagRegistry, event: &Event) -> RunOutcome {
        if !self.act(force) {
            debug!(instruction_id = %self.id, "Instruction outside its active window");
            return RunOutcome::default();
        }

        let call = TagCall {
            tag_id: self.tag_id.clone(),
            instruction_id: self.id.clone(),
            event: event.clone(),
            context: event.context.child(),
        };

        match tags.call(call).await {
            Ok(()) => RunOutcome {
                attempted: true,
                error: None,
            },
            Err(TagError::NotFound(_)) => {
                debug!(instruction_id = %self.id, tag_id = %self.tag_id, "Tag not resolved");
                RunOutcome::default()
            }
            Err(e) => {
                warn!(instruction_id = %self.id, tag_id = %self.tag_id, error = %e, "Tag failed");
                RunOutcome {
                    attempted: true,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Stable sort, descending by priority; ties keep their relative order
pub fn sort_by_priority<T, F>(items: &mut [T], priority: F)
where
    F: Fn(&T) -> i64,
{
    // slice::sort_by is a stable merge sort
    items.sort_by(|a, b| priority(b).cmp(&priority(a)));
}

/// All instructions of a container, with before/after links resolved
#[derive(Debug, Default)]
pub struct InstructionArena {
    items: Vec<Instruction>,
    by_id: HashMap<String, InstructionIndex>,
}

impl InstructionArena {
    /// Build the arena, rejecting duplicate ids
    ///
    /// Links to unknown instructions resolve to no node.
    pub fn build(configs: &[InstructionConfig]) -> EngineResult<Self> {
        let mut by_id = HashMap::with_capacity(configs.len());
        for (i, config) in configs.iter().enumerate() {
            if by_id
                .insert(config.id.clone(), InstructionIndex(i))
                .is_some()
            {
                return Err(EngineError::DuplicateInstruction(config.id.clone()));
            }
        }

        let resolve = |owner: &str, link: &Option<String>, side: &str| {
            let id = link.as_deref()?;
            let index = by_id.get(id).copied();
            if index.is_none() {
                warn!(instruction_id = owner, link = id, side, "Unknown linked instruction");
            }
            index
        };

        let items = configs
            .iter()
            .map(|config| Instruction {
                id: config.id.clone(),
                trigger_ids: config.trigger_ids.clone(),
                tag_id: config.tag_id.clone(),
                priority: config.priority,
                firing_policy: config.firing_policy,
                window: config.period,
                before: resolve(&config.id, &config.before, "before"),
                after: resolve(&config.id, &config.after, "after"),
            })
            .collect();

        Ok(Self { items, by_id })
    }

    pub fn get(&self, index: InstructionIndex) -> Option<&Instruction> {
        self.items.get(index.0)
    }

    pub fn find(&self, id: &str) -> Option<InstructionIndex> {
        self.by_id.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstructionIndex, &Instruction)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, instruction)| (InstructionIndex(i), instruction))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Index<InstructionIndex> for InstructionArena {
    type Output = Instruction;

    fn index(&self, index: InstructionIndex) -> &Self::Output {
        &self.items[index.0]
    }
}
