//! The dispatcher
//!
//! Receives events, selects the triggers that fire, walks the bound
//! instructions in priority order with firing-policy gating, and emits one
//! [`ActRecord`] per dispatch.
//!
//! ```text
//! event → triggers(category).handle → bound instructions (priority sorted)
//!       → walk(before, self, after) → tags → completions → act record → groups
//! ```

use async_trait::async_trait;
use dashmap::DashSet;
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tm_core::{Event, EventCategory, EventPayload};
use tm_event_bus::SharedEventBus;
use tm_tag_registry::SharedTagRegistry;
use tm_variable_store::VariableLookup;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::instruction::{
    sort_by_priority, FiringPolicy, Instruction, InstructionArena, InstructionIndex,
};
use crate::trigger::{Completion, Trigger, TriggerKind, TriggerSignal};
use crate::walker::{Visitor, Walker};

/// Capacity of the act record channel
const ACT_CHANNEL_CAPACITY: usize = 256;

/// A tag failure recorded during a dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagFailure {
    pub instruction_id: String,
    pub tag_id: String,
    pub message: String,
}

/// Aggregated result of one dispatch
#[derive(Debug, Clone, Serialize)]
pub struct ActRecord {
    /// Context of the dispatched event
    pub context_id: String,
    /// Triggers whose firing completed
    pub running_triggers: Vec<String>,
    /// Instructions whose tag executed, in execution order
    pub activated_instructions: Vec<String>,
    pub errors: Vec<TagFailure>,
    pub event: Event,
}

/// How a dispatch ended
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Completed(ActRecord),
    /// The form-submit wait elapsed; the remaining work continues detached
    TimedOut,
    /// The detached form-submit task failed
    Aborted(String),
}

impl DispatchOutcome {
    pub fn record(&self) -> Option<&ActRecord> {
        match self {
            DispatchOutcome::Completed(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<ActRecord> {
        match self {
            DispatchOutcome::Completed(record) => Some(record),
            _ => None,
        }
    }
}

/// Orchestrates triggers, instructions and tags
pub struct Dispatcher {
    triggers: Vec<Trigger>,
    by_category: HashMap<EventCategory, Vec<usize>>,
    /// Group trigger indexes per child trigger id
    groups_by_child: HashMap<String, Vec<usize>>,
    /// Bound instructions per trigger id, in config order
    bindings: HashMap<String, Vec<InstructionIndex>>,
    instructions: InstructionArena,
    tags: SharedTagRegistry,
    /// Instructions that fired under `once_page` since the last clean
    page_fired: DashSet<String>,
    acts: broadcast::Sender<ActRecord>,
    bus: SharedEventBus,
    page_start: Instant,
    bus_task: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Build a dispatcher from a container, validating every reference
    pub fn new(
        config: &EngineConfig,
        variables: Arc<dyn VariableLookup>,
        tags: SharedTagRegistry,
        bus: SharedEventBus,
    ) -> EngineResult<Arc<Self>> {
        let mut triggers = Vec::with_capacity(config.triggers.len());
        let mut trigger_ids: HashMap<String, usize> = HashMap::new();
        for trigger_config in &config.triggers {
            let id = trigger_config.id().to_string();
            if trigger_ids.insert(id.clone(), triggers.len()).is_some() {
                return Err(EngineError::DuplicateTrigger(id));
            }
            triggers.push(Trigger::from_config(trigger_config, variables.clone())?);
        }

        let mut by_category: HashMap<EventCategory, Vec<usize>> = HashMap::new();
        let mut groups_by_child: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, trigger) in triggers.iter().enumerate() {
            by_category.entry(trigger.category()).or_default().push(index);
            for child in trigger.group_children() {
                if !trigger_ids.contains_key(&child) {
                    return Err(EngineError::UnknownGroupChild {
                        group_id: trigger.id().to_string(),
                        trigger_id: child,
                    });
                }
                groups_by_child.entry(child).or_default().push(index);
            }
        }

        let instructions = InstructionArena::build(&config.instructions)?;
        let mut bindings: HashMap<String, Vec<InstructionIndex>> = HashMap::new();
        for (index, instruction) in instructions.iter() {
            for trigger_id in &instruction.trigger_ids {
                if !trigger_ids.contains_key(trigger_id) {
                    return Err(EngineError::UnknownTrigger {
                        instruction_id: instruction.id.clone(),
                        trigger_id: trigger_id.clone(),
                    });
                }
                bindings.entry(trigger_id.clone()).or_default().push(index);
            }
        }

        let walker = Walker::new(&instructions);
        for (index, _) in instructions.iter() {
            walker.order(index)?;
        }

        for trigger in &triggers {
            trigger.registration();
        }

        info!(
            triggers = triggers.len(),
            instructions = instructions.len(),
            "Dispatcher ready"
        );

        let (acts, _) = broadcast::channel(ACT_CHANNEL_CAPACITY);
        Ok(Arc::new(Self {
            triggers,
            by_category,
            groups_by_child,
            bindings,
            instructions,
            tags,
            page_fired: DashSet::new(),
            acts,
            bus,
            page_start: Instant::now(),
            bus_task: Mutex::new(None),
        }))
    }

    /// Subscribe to act records
    pub fn subscribe_acts(&self) -> broadcast::Receiver<ActRecord> {
        self.acts.subscribe()
    }

    pub fn trigger(&self, id: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.id() == id)
    }

    pub fn instructions(&self) -> &InstructionArena {
        &self.instructions
    }

    /// Whether a `once_page` instruction already fired on this page
    pub fn fired_on_page(&self, instruction_id: &str) -> bool {
        self.page_fired.contains(instruction_id)
    }

    /// Dispatch an event to the triggers of its category
    ///
    /// Group triggers only fire from their children's completions, so they
    /// are never candidates here.
    #[instrument(skip(self, event), fields(category = %event.category, context_id = %event.context.id))]
    pub async fn dispatch(self: &Arc<Self>, event: Event) -> DispatchOutcome {
        let candidates: Vec<usize> = self
            .by_category
            .get(&event.category)
            .map(|indexes| {
                indexes
                    .iter()
                    .copied()
                    .filter(|&i| !matches!(self.triggers[i].kind(), TriggerKind::Group(_)))
                    .collect()
            })
            .unwrap_or_default();
        self.clone().dispatch_to(event, candidates).await
    }

    /// Dispatch untyped event data under a category name
    pub async fn dispatch_json(
        self: &Arc<Self>,
        category: &str,
        data: serde_json::Value,
    ) -> EngineResult<DispatchOutcome> {
        let category: EventCategory = category.parse()?;
        let event = Event::from_json(category, data)?;
        Ok(self.dispatch(event).await)
    }

    fn dispatch_to(
        self: Arc<Self>,
        event: Event,
        candidates: Vec<usize>,
    ) -> BoxFuture<'static, DispatchOutcome> {
        async move {
            let fired: Vec<(usize, Completion)> = candidates
                .into_iter()
                .filter_map(|index| {
                    let result = self.triggers[index].handle(&event);
                    result.completion.map(|completion| (index, completion))
                })
                .collect();

            if fired.is_empty() {
                debug!(category = %event.category, "No trigger running");
            }

            let wait = if event.category == EventCategory::FormSubmit {
                fired
                    .iter()
                    .filter_map(|(index, _)| self.triggers[*index].wait_tags())
                    .max()
            } else {
                None
            };

            let Some(limit) = wait else {
                return DispatchOutcome::Completed(self.settle(event, fired).await);
            };

            // Bound how long the native submission waits; the work itself goes on
            let task = tokio::spawn(self.clone().settle(event, fired));
            match tokio::time::timeout(limit, task).await {
                Ok(Ok(record)) => DispatchOutcome::Completed(record),
                Ok(Err(e)) => {
                    error!(error = %e, "Form submission dispatch failed");
                    DispatchOutcome::Aborted(e.to_string())
                }
                Err(_) => {
                    warn!(
                        wait_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        "Form submission wait elapsed"
                    );
                    DispatchOutcome::TimedOut
                }
            }
        }
        .boxed()
    }

    /// Walk the bound instructions, resolve completions and emit the act record
    fn settle(
        self: Arc<Self>,
        event: Event,
        fired: Vec<(usize, Completion)>,
    ) -> BoxFuture<'static, ActRecord> {
        async move {
            let mut queue: Vec<(InstructionIndex, Event)> = Vec::new();
            for (_, completion) in &fired {
                if let Some(bound) = self.bindings.get(completion.trigger_id()) {
                    queue.extend(bound.iter().map(|&i| (i, completion.event().clone())));
                }
            }
            sort_by_priority(&mut queue, |(index, _)| self.instructions[*index].priority);

            let mut visitor = GatingVisitor::new(&self, false);
            for (root, fired_with) in queue {
                visitor.walk_root(root, fired_with).await;
            }
            let GatingVisitor {
                activated, errors, ..
            } = visitor;

            let signals: Vec<TriggerSignal> = fired
                .into_iter()
                .map(|(_, completion)| completion.complete())
                .collect();

            let record = ActRecord {
                context_id: event.context.id.clone(),
                running_triggers: signals.iter().map(|s| s.trigger_id.clone()).collect(),
                activated_instructions: activated,
                errors,
                event,
            };
            self.emit(&record);

            for signal in &signals {
                let groups = self
                    .groups_by_child
                    .get(&signal.trigger_id)
                    .cloned()
                    .unwrap_or_default();
                for group in groups {
                    if let Some(group_event) = self.triggers[group].on_child_complete(signal) {
                        self.clone().dispatch_to(group_event, vec![group]).await;
                    }
                }
            }

            record
        }
        .boxed()
    }

    fn emit(&self, record: &ActRecord) {
        info!(
            category = %record.event.category,
            running_triggers = ?record.running_triggers,
            activated_instructions = ?record.activated_instructions,
            errors = record.errors.len(),
            "Act"
        );
        // Send errors only mean there is no subscriber
        let _ = self.acts.send(record.clone());
    }

    /// Run one instruction and its chain outside of trigger dispatch
    pub async fn run_instruction(&self, id: &str, force: bool) -> EngineResult<ActRecord> {
        let root = self
            .instructions
            .find(id)
            .ok_or_else(|| EngineError::InstructionNotFound(id.to_string()))?;

        let event = Event::custom("run_instruction", serde_json::json!({ "instruction_id": id }));
        let mut visitor = GatingVisitor::new(self, force);
        visitor.walk_root(root, event.clone()).await;

        let record = ActRecord {
            context_id: event.context.id.clone(),
            running_triggers: Vec::new(),
            activated_instructions: visitor.activated,
            errors: visitor.errors,
            event,
        };
        self.emit(&record);
        Ok(record)
    }

    /// Fire the synthetic initialization event on the bus
    pub fn initialization(&self) {
        self.bus.fire(Event::initialization());
    }

    /// Fire a host event on the bus
    pub fn emit_event(&self, event: Event) {
        self.bus.fire(event);
    }

    /// Start timers and the bus loop
    pub fn start(self: &Arc<Self>) {
        self.start_stopped_timers();

        let Ok(mut slot) = self.bus_task.lock() else {
            return;
        };
        if slot.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return;
        }

        let mut rx = self.bus.subscribe_all();
        let weak = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(dispatcher) = weak.upgrade() else {
                            break;
                        };
                        dispatcher.dispatch(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Dispatcher lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
        info!("Dispatcher started");
    }

    /// Stop the bus loop and all timers
    pub fn stop(&self) {
        if let Ok(mut slot) = self.bus_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        for trigger in &self.triggers {
            if let Some(timer) = trigger.timer() {
                timer.stop();
            }
        }
        info!("Dispatcher stopped");
    }

    /// Reset all stateful triggers and the page accumulator
    ///
    /// Scroll-depth triggers come back armed with no passed checkpoints.
    /// Timers stay stopped until [`Dispatcher::update`] or a new start.
    pub fn clean(&self) {
        for trigger in &self.triggers {
            trigger.reset();
            trigger.registration();
        }
        self.page_fired.clear();
        info!("Dispatcher cleaned");
    }

    /// Re-arm scroll-depth triggers and restart stopped timers
    pub fn update(self: &Arc<Self>) {
        for trigger in &self.triggers {
            trigger.update();
        }
        self.start_stopped_timers();
        debug!("Dispatcher updated");
    }

    fn start_stopped_timers(self: &Arc<Self>) {
        for (index, trigger) in self.triggers.iter().enumerate() {
            if let Some(timer) = trigger.timer() {
                if !timer.is_running() {
                    self.start_timer(index);
                }
            }
        }
    }

    fn start_timer(self: &Arc<Self>, index: usize) {
        let Some(timer) = self.triggers[index].timer() else {
            return;
        };

        let period = timer.interval();
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(dispatcher) = weak.upgrade() else {
                    break;
                };
                let Some(event) = dispatcher.timer_event(index) else {
                    break;
                };
                let fired: Vec<(usize, Completion)> = dispatcher.triggers[index]
                    .handle_tick(&event)
                    .completion
                    .map(|completion| (index, completion))
                    .into_iter()
                    .collect();
                dispatcher.clone().settle(event, fired).await;
            }
        });

        debug!(trigger_id = %self.triggers[index].id(), interval = ?period, "Timer started");
        timer.begin(task);
    }

    fn timer_event(&self, index: usize) -> Option<Event> {
        let data = self.triggers[index].timer()?.next_tick(self.page_start)?;
        Some(Event::new(EventCategory::Timer, EventPayload::Timer(data)))
    }
}

/// Applies firing policies while walking instruction chains
struct GatingVisitor<'a> {
    dispatcher: &'a Dispatcher,
    force: bool,
    /// Event handed to tags of the current walk
    event: Option<Event>,
    /// Instructions that fired under `once_event` in this dispatch
    run_registry: HashSet<String>,
    executed: bool,
    activated: Vec<String>,
    errors: Vec<TagFailure>,
}

impl<'a> GatingVisitor<'a> {
    fn new(dispatcher: &'a Dispatcher, force: bool) -> Self {
        Self {
            dispatcher,
            force,
            event: None,
            run_registry: HashSet::new(),
            executed: false,
            activated: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn admits(&self, instruction: &Instruction) -> bool {
        match instruction.firing_policy {
            FiringPolicy::OnceEvent => !self.run_registry.contains(&instruction.id),
            FiringPolicy::OncePage => !self.dispatcher.page_fired.contains(&instruction.id),
            FiringPolicy::NoRestriction => true,
            FiringPolicy::Unknown => false,
        }
    }

    fn mark_fired(&mut self, instruction: &Instruction) {
        match instruction.firing_policy {
            FiringPolicy::OnceEvent => {
                self.run_registry.insert(instruction.id.clone());
            }
            FiringPolicy::OncePage => {
                self.dispatcher.page_fired.insert(instruction.id.clone());
            }
            FiringPolicy::NoRestriction | FiringPolicy::Unknown => {}
        }
    }

    async fn walk_root(&mut self, root: InstructionIndex, event: Event) {
        let dispatcher = self.dispatcher;
        let instruction = &dispatcher.instructions[root];
        if !self.admits(instruction) {
            debug!(
                instruction_id = %instruction.id,
                policy = ?instruction.firing_policy,
                "Instruction skipped by firing policy"
            );
            return;
        }

        self.event = Some(event);
        self.executed = false;
        if let Err(e) = Walker::new(&dispatcher.instructions).walk(root, self).await {
            warn!(instruction_id = %instruction.id, error = %e, "Instruction walk aborted");
        }
        if self.executed {
            self.mark_fired(instruction);
        }
    }
}

#[async_trait]
impl<'a> Visitor for GatingVisitor<'a> {
    async fn visit(&mut self, instruction: &Instruction, is_root: bool) {
        if !self.admits(instruction) {
            debug!(
                instruction_id = %instruction.id,
                is_root,
                policy = ?instruction.firing_policy,
                "Instruction skipped by firing policy"
            );
            return;
        }
        let Some(event) = self.event.clone() else {
            return;
        };

        debug!(instruction_id = %instruction.id, tag_id = %instruction.tag_id, is_root, "Running instruction");
        let outcome = instruction
            .run(self.force, &self.dispatcher.tags, &event)
            .await;

        if let Some(message) = outcome.error {
            self.errors.push(TagFailure {
                instruction_id: instruction.id.clone(),
                tag_id: instruction.tag_id.clone(),
                message,
            });
        }
        if outcome.attempted {
            self.executed = true;
            self.mark_fired(instruction);
            self.activated.push(instruction.id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::InstructionConfig;
    use crate::trigger::{BasicTriggerConfig, TriggerConfig};
    use std::time::Duration;
    use tm_core::Element;
    use tm_event_bus::EventBus;
    use tm_tag_registry::{TagCall, TagRegistry};
    use tm_variable_store::VariableStore;

    fn dispatcher(config: EngineConfig, tags: TagRegistry) -> Arc<Dispatcher> {
        Dispatcher::new(
            &config,
            Arc::new(VariableStore::new()),
            Arc::new(tags),
            Arc::new(EventBus::new()),
        )
        .unwrap()
    }

    fn noop_tags() -> TagRegistry {
        let tags = TagRegistry::new();
        tags.register("tag", |_: TagCall| async { Ok(()) });
        tags
    }

    fn click_config(instructions: Vec<InstructionConfig>) -> EngineConfig {
        EngineConfig {
            triggers: vec![TriggerConfig::Click(BasicTriggerConfig::new("t_click"))],
            instructions,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_invalid_references() {
        let build = |config: EngineConfig| {
            Dispatcher::new(
                &config,
                Arc::new(VariableStore::new()),
                Arc::new(TagRegistry::new()),
                Arc::new(EventBus::new()),
            )
        };

        let config = click_config(vec![InstructionConfig::new("i", "t_missing", "tag")]);
        assert!(matches!(build(config), Err(EngineError::UnknownTrigger { .. })));

        let mut config = click_config(vec![]);
        config
            .triggers
            .push(TriggerConfig::Click(BasicTriggerConfig::new("t_click")));
        assert!(matches!(build(config), Err(EngineError::DuplicateTrigger(_))));

        let config = click_config(vec![
            InstructionConfig::new("a", "t_click", "tag").with_after("b"),
            InstructionConfig::new("b", "t_click", "tag").with_before("a"),
        ]);
        assert!(matches!(build(config), Err(EngineError::CyclicInstructions(_))));

        let config = EngineConfig::from_yaml_str(
            "triggers:\n  - { id: g, category: group, triggers: [nope] }\n",
        )
        .unwrap();
        assert!(matches!(build(config), Err(EngineError::UnknownGroupChild { .. })));
    }

    #[tokio::test]
    async fn test_unknown_policy_never_fires() {
        let d = dispatcher(
            click_config(vec![
                InstructionConfig::new("i", "t_click", "tag").with_policy(FiringPolicy::Unknown)
            ]),
            noop_tags(),
        );
        let record = d
            .dispatch(Event::click(Element::new("a")))
            .await
            .into_record()
            .unwrap();
        assert_eq!(record.running_triggers, vec!["t_click"]);
        assert!(record.activated_instructions.is_empty());
    }

    #[tokio::test]
    async fn test_tag_failure_is_isolated() {
        let tags = TagRegistry::new();
        tags.register("broken", |_: TagCall| async {
            Err(tm_tag_registry::TagError::ExecutionFailed("boom".to_string()))
        });
        tags.register("tag", |_: TagCall| async { Ok(()) });

        // b hangs off an idle trigger so it only runs through a's after-link
        let mut config = click_config(vec![
            InstructionConfig::new("a", "t_click", "broken").with_after("b"),
            InstructionConfig::new("b", "t_ready", "tag"),
        ]);
        config
            .triggers
            .push(TriggerConfig::DomReady(BasicTriggerConfig::new("t_ready")));
        let d = dispatcher(config, tags);

        let record = d
            .dispatch(Event::click(Element::new("a")))
            .await
            .into_record()
            .unwrap();
        assert_eq!(record.activated_instructions, vec!["a", "b"]);
        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.errors[0].instruction_id, "a");
    }

    #[tokio::test]
    async fn test_run_instruction_honours_force() {
        let window = crate::instruction::ActiveWindow {
            start: None,
            end: Some(chrono::Utc::now() - chrono::Duration::days(1)),
        };
        let d = dispatcher(
            click_config(vec![
                InstructionConfig::new("expired", "t_click", "tag").with_period(window)
            ]),
            noop_tags(),
        );

        let record = d.run_instruction("expired", false).await.unwrap();
        assert!(record.activated_instructions.is_empty());

        let record = d.run_instruction("expired", true).await.unwrap();
        assert_eq!(record.activated_instructions, vec!["expired"]);

        assert!(matches!(
            d.run_instruction("nope", true).await,
            Err(EngineError::InstructionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_form_submit_times_out_but_tags_finish() {
        let tags = TagRegistry::new();
        tags.register("slow", |_: TagCall| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });

        let config = EngineConfig::from_yaml_str(
            r#"
triggers:
  - { id: t_form, category: form_submit, wait_tags: 1000 }
instructions:
  - { id: i_slow, trigger_ids: [t_form], tag_id: slow }
"#,
        )
        .unwrap();
        let d = dispatcher(config, tags);
        let mut acts = d.subscribe_acts();

        let outcome = d.dispatch(Event::form_submit(Element::new("form"))).await;
        assert!(matches!(outcome, DispatchOutcome::TimedOut));

        let record = acts.recv().await.unwrap();
        assert_eq!(record.activated_instructions, vec!["i_slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_form_submit_within_wait() {
        let config = EngineConfig::from_yaml_str(
            r#"
triggers:
  - { id: t_form, category: form_submit, wait_tags: 1000 }
instructions:
  - { id: i, trigger_ids: [t_form], tag_id: tag }
"#,
        )
        .unwrap();
        let d = dispatcher(config, noop_tags());

        let outcome = d.dispatch(Event::form_submit(Element::new("form"))).await;
        assert_eq!(outcome.record().unwrap().activated_instructions, vec!["i"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_ticks_until_limit() {
        let config = EngineConfig::from_yaml_str(
            r#"
triggers:
  - { id: t_timer, category: timer, interval_ms: 1000, limit: 2 }
instructions:
  - { id: i_tick, trigger_ids: [t_timer], tag_id: tag }
"#,
        )
        .unwrap();
        let d = dispatcher(config, noop_tags());
        let mut acts = d.subscribe_acts();
        d.start();

        let first = acts.recv().await.unwrap();
        match &first.event.payload {
            EventPayload::Timer(data) => assert_eq!(data.count, 1),
            other => panic!("Expected timer payload, got {:?}", other),
        }
        let second = acts.recv().await.unwrap();
        assert_eq!(second.activated_instructions, vec!["i_tick"]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(acts.try_recv().is_err());
        assert!(!d.trigger("t_timer").unwrap().timer().unwrap().is_running());

        d.update();
        let restarted = acts.recv().await.unwrap();
        match &restarted.event.payload {
            EventPayload::Timer(data) => assert_eq!(data.count, 1),
            other => panic!("Expected timer payload, got {:?}", other),
        }
        d.stop();
    }

    #[tokio::test]
    async fn test_bus_loop_dispatches_in_order() {
        let config = EngineConfig::from_yaml_str(
            r#"
triggers:
  - { id: t_init, category: initialization }
  - { id: t_view, category: view_page }
instructions:
  - { id: i_init, trigger_ids: [t_init], tag_id: tag }
  - { id: i_view, trigger_ids: [t_view], tag_id: tag }
"#,
        )
        .unwrap();
        let d = dispatcher(config, noop_tags());
        let mut acts = d.subscribe_acts();
        d.start();

        d.initialization();
        d.emit_event(Event::empty(EventCategory::ViewPage));

        assert_eq!(acts.recv().await.unwrap().activated_instructions, vec!["i_init"]);
        assert_eq!(acts.recv().await.unwrap().activated_instructions, vec!["i_view"]);
        d.stop();
    }
}
