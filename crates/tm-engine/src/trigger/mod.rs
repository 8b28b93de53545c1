//! Triggers
//!
//! A trigger binds an event category to an optional segment. Handling an
//! event either leaves the trigger idle or returns a [`Completion`] that
//! the dispatcher resolves once all work attributed to the firing is done.
//! Group triggers listen to those completions.

mod group;
mod scroll;
mod timer;
mod visibility;

pub use group::GroupState;
pub use scroll::ScrollState;
pub use timer::TimerState;
pub use visibility::VisibilityState;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tm_core::{
    Event, EventCategory, EventPayload, GroupData, ScrollOrientation, ScrollUnits,
};
use tm_variable_store::VariableLookup;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::segment::{Segment, SegmentConfig};

/// Trigger definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum TriggerConfig {
    Click(BasicTriggerConfig),
    LinkClick(BasicTriggerConfig),
    ViewPage(BasicTriggerConfig),
    DomReady(BasicTriggerConfig),
    WindowLoaded(BasicTriggerConfig),
    Initialization(BasicTriggerConfig),
    HistoryChange(BasicTriggerConfig),
    JsError(BasicTriggerConfig),

    /// Fires on host-emitted custom events
    Custom(CustomTriggerConfig),

    /// Fires on form submission; may delay the native submit
    FormSubmit(FormTriggerConfig),

    /// Fires when an observed element enters the viewport
    #[serde(rename = "dom_element_visible")]
    ElementVisible(VisibilityTriggerConfig),

    /// Fires when scroll checkpoints are passed
    ScrollDepth(ScrollTriggerConfig),

    /// Fires periodically on its own
    Timer(TimerTriggerConfig),

    /// Fires once all child triggers have completed
    Group(GroupTriggerConfig),
}

impl TriggerConfig {
    pub fn id(&self) -> &str {
        match self {
            TriggerConfig::Click(t)
            | TriggerConfig::LinkClick(t)
            | TriggerConfig::ViewPage(t)
            | TriggerConfig::DomReady(t)
            | TriggerConfig::WindowLoaded(t)
            | TriggerConfig::Initialization(t)
            | TriggerConfig::HistoryChange(t)
            | TriggerConfig::JsError(t) => &t.id,
            TriggerConfig::Custom(t) => &t.id,
            TriggerConfig::FormSubmit(t) => &t.id,
            TriggerConfig::ElementVisible(t) => &t.id,
            TriggerConfig::ScrollDepth(t) => &t.id,
            TriggerConfig::Timer(t) => &t.id,
            TriggerConfig::Group(t) => &t.id,
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            TriggerConfig::Click(_) => EventCategory::Click,
            TriggerConfig::LinkClick(_) => EventCategory::LinkClick,
            TriggerConfig::ViewPage(_) => EventCategory::ViewPage,
            TriggerConfig::DomReady(_) => EventCategory::DomReady,
            TriggerConfig::WindowLoaded(_) => EventCategory::WindowLoaded,
            TriggerConfig::Initialization(_) => EventCategory::Initialization,
            TriggerConfig::HistoryChange(_) => EventCategory::HistoryChange,
            TriggerConfig::JsError(_) => EventCategory::JsError,
            TriggerConfig::Custom(_) => EventCategory::Custom,
            TriggerConfig::FormSubmit(_) => EventCategory::FormSubmit,
            TriggerConfig::ElementVisible(_) => EventCategory::ElementVisible,
            TriggerConfig::ScrollDepth(_) => EventCategory::ScrollDepth,
            TriggerConfig::Timer(_) => EventCategory::Timer,
            TriggerConfig::Group(_) => EventCategory::Group,
        }
    }

    pub fn segment(&self) -> &SegmentConfig {
        match self {
            TriggerConfig::Click(t)
            | TriggerConfig::LinkClick(t)
            | TriggerConfig::ViewPage(t)
            | TriggerConfig::DomReady(t)
            | TriggerConfig::WindowLoaded(t)
            | TriggerConfig::Initialization(t)
            | TriggerConfig::HistoryChange(t)
            | TriggerConfig::JsError(t) => &t.segment,
            TriggerConfig::Custom(t) => &t.segment,
            TriggerConfig::FormSubmit(t) => &t.segment,
            TriggerConfig::ElementVisible(t) => &t.segment,
            TriggerConfig::ScrollDepth(t) => &t.segment,
            TriggerConfig::Timer(t) => &t.segment,
            TriggerConfig::Group(t) => &t.segment,
        }
    }
}

/// Trigger without category-specific settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicTriggerConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segment: SegmentConfig,
}

impl BasicTriggerConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            segment: Vec::new(),
        }
    }

    pub fn with_segment(mut self, segment: SegmentConfig) -> Self {
        self.segment = segment;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomTriggerConfig {
    pub id: String,
    /// Only events with this name fire the trigger
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segment: SegmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormTriggerConfig {
    pub id: String,
    /// Longest time (ms) the native submission may wait for tags
    #[serde(default)]
    pub wait_tags: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segment: SegmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityTriggerConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub once_per_element: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segment: SegmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollTriggerConfig {
    pub id: String,
    #[serde(default = "default_orientation")]
    pub orientation: ScrollOrientation,
    #[serde(default = "default_units")]
    pub units: ScrollUnits,
    pub thresholds: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segment: SegmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerTriggerConfig {
    pub id: String,
    pub interval_ms: u64,
    /// Maximum number of ticks
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segment: SegmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupTriggerConfig {
    pub id: String,
    /// Child trigger ids
    pub triggers: Vec<String>,
    /// Evaluated against the collected child events
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segment: SegmentConfig,
}

fn default_true() -> bool {
    true
}

fn default_orientation() -> ScrollOrientation {
    ScrollOrientation::Vertical
}

fn default_units() -> ScrollUnits {
    ScrollUnits::Percent
}

/// Emitted when a trigger's completion is resolved
#[derive(Debug, Clone)]
pub struct TriggerSignal {
    pub trigger_id: String,
    pub event: Event,
}

/// Pending completion of a trigger firing
#[derive(Debug, Clone)]
pub struct Completion {
    trigger_id: String,
    event: Event,
}

impl Completion {
    pub fn trigger_id(&self) -> &str {
        &self.trigger_id
    }

    /// The event the trigger fired with
    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn complete(self) -> TriggerSignal {
        debug!(trigger_id = %self.trigger_id, "Trigger completed");
        TriggerSignal {
            trigger_id: self.trigger_id,
            event: self.event,
        }
    }
}

/// Outcome of handing an event to a trigger
#[derive(Debug)]
pub struct FireResult {
    pub was_running: bool,
    pub completion: Option<Completion>,
}

impl FireResult {
    pub fn idle() -> Self {
        Self {
            was_running: false,
            completion: None,
        }
    }

    pub fn running(trigger_id: &str, event: Event) -> Self {
        Self {
            was_running: true,
            completion: Some(Completion {
                trigger_id: trigger_id.to_string(),
                event,
            }),
        }
    }
}

/// Category-specific trigger behaviour and state
#[derive(Debug)]
pub enum TriggerKind {
    Basic,
    Custom { event_name: Option<String> },
    Form { wait_tags: Option<Duration> },
    Visibility(VisibilityState),
    Scroll(ScrollState),
    Timer(TimerState),
    Group(GroupState),
}

/// A runtime trigger
#[derive(Debug)]
pub struct Trigger {
    id: String,
    category: EventCategory,
    segment: Option<Segment>,
    kind: TriggerKind,
}

impl Trigger {
    /// Build a trigger from its configuration
    pub fn from_config(
        config: &TriggerConfig,
        variables: Arc<dyn VariableLookup>,
    ) -> EngineResult<Self> {
        let kind = match config {
            TriggerConfig::Custom(t) => TriggerKind::Custom {
                event_name: t.event_name.clone(),
            },
            TriggerConfig::FormSubmit(t) => TriggerKind::Form {
                wait_tags: t.wait_tags.map(Duration::from_millis),
            },
            TriggerConfig::ElementVisible(t) => {
                TriggerKind::Visibility(VisibilityState::new(t.once_per_element))
            }
            TriggerConfig::ScrollDepth(t) => {
                if t.thresholds.is_empty() {
                    return Err(EngineError::InvalidConfig(format!(
                        "scroll trigger {} has no thresholds",
                        t.id
                    )));
                }
                TriggerKind::Scroll(ScrollState::new(t.orientation, t.units, &t.thresholds))
            }
            TriggerConfig::Timer(t) => {
                if t.interval_ms == 0 {
                    return Err(EngineError::InvalidConfig(format!(
                        "timer trigger {} needs a positive interval",
                        t.id
                    )));
                }
                TriggerKind::Timer(TimerState::new(
                    Duration::from_millis(t.interval_ms),
                    t.limit,
                ))
            }
            TriggerConfig::Group(t) => {
                if t.triggers.iter().any(|child| child == &t.id) {
                    return Err(EngineError::InvalidConfig(format!(
                        "group trigger {} contains itself",
                        t.id
                    )));
                }
                TriggerKind::Group(GroupState::new(&t.triggers))
            }
            _ => TriggerKind::Basic,
        };

        let segment = config.segment();
        Ok(Self {
            id: config.id().to_string(),
            category: config.category(),
            segment: (!segment.is_empty()).then(|| Segment::new(segment, variables)),
            kind,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category(&self) -> EventCategory {
        self.category
    }

    pub fn kind(&self) -> &TriggerKind {
        &self.kind
    }

    pub fn segment(&self) -> Option<&Segment> {
        self.segment.as_ref()
    }

    /// Hand an event to the trigger
    pub fn handle(&self, event: &Event) -> FireResult {
        if event.category != self.category {
            return FireResult::idle();
        }

        let fired_with = match &self.kind {
            TriggerKind::Custom {
                event_name: Some(name),
            } => match &event.payload {
                EventPayload::Custom(custom) if &custom.name == name => event.clone(),
                _ => return FireResult::idle(),
            },
            TriggerKind::Scroll(scroll) => match &event.payload {
                EventPayload::ScrollObservation(observation) => {
                    match scroll.observe(observation) {
                        Some(depth) => event
                            .derive(EventCategory::ScrollDepth, EventPayload::ScrollDepth(depth)),
                        None => return FireResult::idle(),
                    }
                }
                _ => return FireResult::idle(),
            },
            TriggerKind::Visibility(visibility) => {
                let EventPayload::Visibility(data) = &event.payload else {
                    return FireResult::idle();
                };
                if !self.segment_allows(event) || !visibility.claim(&data.element) {
                    return FireResult::idle();
                }
                return self.running(event.clone());
            }
            // Ticks only come from the trigger's own schedule
            TriggerKind::Timer(_) => return FireResult::idle(),
            TriggerKind::Group(_) => {
                // The segment was evaluated against the child events already
                return match &event.payload {
                    EventPayload::Group(group) if group.trigger_id == self.id => {
                        self.running(event.clone())
                    }
                    _ => FireResult::idle(),
                };
            }
            _ => event.clone(),
        };

        if !self.segment_allows(&fired_with) {
            return FireResult::idle();
        }
        self.running(fired_with)
    }

    /// Hand a tick produced by this trigger's own timer
    pub(crate) fn handle_tick(&self, event: &Event) -> FireResult {
        if self.timer().is_none() || event.category != self.category {
            return FireResult::idle();
        }
        if !self.segment_allows(event) {
            return FireResult::idle();
        }
        self.running(event.clone())
    }

    fn segment_allows(&self, event: &Event) -> bool {
        self.segment
            .as_ref()
            .map(|segment| segment.check_event(event))
            .unwrap_or(true)
    }

    fn running(&self, event: Event) -> FireResult {
        debug!(trigger_id = %self.id, category = %self.category, "Trigger running");
        FireResult::running(&self.id, event)
    }

    /// Feed a child completion to a group trigger
    ///
    /// Returns the group event once every child has completed and the
    /// group's segment accepts the collected events. Fires at most once
    /// until [`Trigger::reset`].
    pub fn on_child_complete(&self, signal: &TriggerSignal) -> Option<Event> {
        let TriggerKind::Group(group) = &self.kind else {
            return None;
        };

        let events = group.record(&signal.trigger_id, &signal.event)?;
        if let Some(segment) = &self.segment {
            if !segment.check_any(&events) {
                debug!(trigger_id = %self.id, "Group segment rejected child events");
                return None;
            }
        }
        if !group.mark_fired() {
            return None;
        }

        debug!(trigger_id = %self.id, children = events.len(), "Group trigger fired");
        Some(signal.event.derive(
            EventCategory::Group,
            EventPayload::Group(GroupData {
                trigger_id: self.id.clone(),
                events,
            }),
        ))
    }

    /// Longest submission delay, for form triggers
    pub fn wait_tags(&self) -> Option<Duration> {
        match &self.kind {
            TriggerKind::Form { wait_tags } => *wait_tags,
            _ => None,
        }
    }

    pub fn timer(&self) -> Option<&TimerState> {
        match &self.kind {
            TriggerKind::Timer(timer) => Some(timer),
            _ => None,
        }
    }

    /// Child ids, for group triggers
    pub fn group_children(&self) -> Vec<String> {
        match &self.kind {
            TriggerKind::Group(group) => group.children(),
            _ => Vec::new(),
        }
    }

    /// Arm a scroll-depth trigger
    pub fn registration(&self) {
        if let TriggerKind::Scroll(scroll) = &self.kind {
            scroll.registration();
        }
    }

    /// Re-arm without a full reset
    pub fn update(&self) {
        if let TriggerKind::Scroll(scroll) = &self.kind {
            scroll.update();
        }
    }

    /// Clear all per-page state
    pub fn reset(&self) {
        match &self.kind {
            TriggerKind::Group(group) => group.reset(),
            TriggerKind::Visibility(visibility) => visibility.reset(),
            TriggerKind::Scroll(scroll) => scroll.reset(),
            TriggerKind::Timer(timer) => timer.stop(),
            TriggerKind::Basic | TriggerKind::Custom { .. } | TriggerKind::Form { .. } => {}
        }
    }
}
