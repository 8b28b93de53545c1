//! Event records consumed by the dispatcher
//!
//! Events are produced by host adapters (click observers, scroll listeners,
//! history hooks, ...) and by the engine itself (timer ticks, scroll
//! checkpoints, group firings). They are immutable once constructed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{Context, Element};

/// Errors raised while building events from untyped data
#[derive(Debug, Error)]
pub enum EventError {
    #[error("unknown event category: {0}")]
    UnknownCategory(String),

    #[error("invalid {category} payload: {source}")]
    InvalidPayload {
        category: EventCategory,
        #[source]
        source: serde_json::Error,
    },
}

/// Event category; triggers are registered per category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Click,
    LinkClick,
    ViewPage,
    DomReady,
    WindowLoaded,
    Custom,
    Initialization,
    FormSubmit,
    HistoryChange,
    JsError,
    #[serde(rename = "dom_element_visible")]
    ElementVisible,
    ScrollDepth,
    Timer,
    Group,
}

impl EventCategory {
    /// All categories, in declaration order
    pub const ALL: [EventCategory; 14] = [
        EventCategory::Click,
        EventCategory::LinkClick,
        EventCategory::ViewPage,
        EventCategory::DomReady,
        EventCategory::WindowLoaded,
        EventCategory::Custom,
        EventCategory::Initialization,
        EventCategory::FormSubmit,
        EventCategory::HistoryChange,
        EventCategory::JsError,
        EventCategory::ElementVisible,
        EventCategory::ScrollDepth,
        EventCategory::Timer,
        EventCategory::Group,
    ];

    /// Wire name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Click => "click",
            EventCategory::LinkClick => "link_click",
            EventCategory::ViewPage => "view_page",
            EventCategory::DomReady => "dom_ready",
            EventCategory::WindowLoaded => "window_loaded",
            EventCategory::Custom => "custom",
            EventCategory::Initialization => "initialization",
            EventCategory::FormSubmit => "form_submit",
            EventCategory::HistoryChange => "history_change",
            EventCategory::JsError => "js_error",
            EventCategory::ElementVisible => "dom_element_visible",
            EventCategory::ScrollDepth => "scroll_depth",
            EventCategory::Timer => "timer",
            EventCategory::Group => "group",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| EventError::UnknownCategory(s.to_string()))
    }
}

/// Scroll axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollOrientation {
    Vertical,
    Horizontal,
}

impl ScrollOrientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollOrientation::Vertical => "vertical",
            ScrollOrientation::Horizontal => "horizontal",
        }
    }
}

/// Unit of a scroll checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollUnits {
    Percent,
    Pixels,
}

impl ScrollUnits {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollUnits::Percent => "percent",
            ScrollUnits::Pixels => "pixels",
        }
    }
}

/// Element visibility observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityData {
    pub element: Element,
    /// Share of the element inside the viewport, 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_visible: Option<f64>,
}

/// Raw scroll position reported by the host adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollObservation {
    #[serde(default)]
    pub scroll_left: f64,
    #[serde(default)]
    pub scroll_top: f64,
    pub scroll_width: f64,
    pub scroll_height: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
}

/// A passed scroll checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollDepthData {
    pub orientation: ScrollOrientation,
    pub threshold: f64,
    pub units: ScrollUnits,
}

/// Uncaught script error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Timer tick counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimerData {
    /// Tick number, starting at 1
    pub count: u64,
    pub interval_ms: u64,
    /// Time since the timer started
    pub elapsed_ms: u64,
    /// Time since the page view started
    pub total_ms: u64,
}

/// History API navigation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_url: Option<String>,
    pub new_url: String,
    /// push_state, replace_state, pop_state or hash_change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Host-emitted custom event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomData {
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Events collected by a group trigger, in child order
#[derive(Debug, Clone, Serialize)]
pub struct GroupData {
    pub trigger_id: String,
    pub events: Vec<Event>,
}

/// Category-specific event fields
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Empty,
    Element(Element),
    Visibility(VisibilityData),
    ScrollObservation(ScrollObservation),
    ScrollDepth(ScrollDepthData),
    Error(ErrorData),
    Timer(TimerData),
    History(HistoryData),
    Custom(CustomData),
    Group(GroupData),
}

impl EventPayload {
    /// Parse untyped data into the payload shape a category expects
    ///
    /// Click, link click and form submit carry an [`Element`]. A scroll depth
    /// event from a host adapter carries a raw [`ScrollObservation`].
    pub fn from_json(category: EventCategory, data: serde_json::Value) -> Result<Self, EventError> {
        let invalid = |source| EventError::InvalidPayload { category, source };
        let payload = match category {
            EventCategory::Click | EventCategory::LinkClick | EventCategory::FormSubmit => {
                EventPayload::Element(serde_json::from_value(data).map_err(invalid)?)
            }
            EventCategory::ElementVisible => {
                EventPayload::Visibility(serde_json::from_value(data).map_err(invalid)?)
            }
            EventCategory::ScrollDepth => {
                EventPayload::ScrollObservation(serde_json::from_value(data).map_err(invalid)?)
            }
            EventCategory::JsError => {
                EventPayload::Error(serde_json::from_value(data).map_err(invalid)?)
            }
            EventCategory::Timer => {
                EventPayload::Timer(serde_json::from_value(data).map_err(invalid)?)
            }
            EventCategory::HistoryChange => {
                EventPayload::History(serde_json::from_value(data).map_err(invalid)?)
            }
            EventCategory::Custom => {
                EventPayload::Custom(serde_json::from_value(data).map_err(invalid)?)
            }
            EventCategory::ViewPage
            | EventCategory::DomReady
            | EventCategory::WindowLoaded
            | EventCategory::Initialization
            | EventCategory::Group => EventPayload::Empty,
        };
        Ok(payload)
    }
}

/// An event delivered to the dispatcher
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Category the event is dispatched under
    pub category: EventCategory,

    /// Category-specific fields
    pub payload: EventPayload,

    /// When the event was produced
    pub time_fired: DateTime<Utc>,

    /// Correlation context
    pub context: Context,
}

impl Event {
    /// Create a new event with current timestamp and a fresh context
    pub fn new(category: EventCategory, payload: EventPayload) -> Self {
        Self {
            category,
            payload,
            time_fired: Utc::now(),
            context: Context::new(),
        }
    }

    /// Build an event from a category and untyped data
    pub fn from_json(category: EventCategory, data: serde_json::Value) -> Result<Self, EventError> {
        Ok(Self::new(category, EventPayload::from_json(category, data)?))
    }

    /// Replace the context
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// An event without fields
    pub fn empty(category: EventCategory) -> Self {
        Self::new(category, EventPayload::Empty)
    }

    pub fn click(element: Element) -> Self {
        Self::new(EventCategory::Click, EventPayload::Element(element))
    }

    pub fn link_click(element: Element) -> Self {
        Self::new(EventCategory::LinkClick, EventPayload::Element(element))
    }

    pub fn form_submit(form: Element) -> Self {
        Self::new(EventCategory::FormSubmit, EventPayload::Element(form))
    }

    pub fn element_visible(element: Element, percent_visible: Option<f64>) -> Self {
        Self::new(
            EventCategory::ElementVisible,
            EventPayload::Visibility(VisibilityData {
                element,
                percent_visible,
            }),
        )
    }

    pub fn scroll(observation: ScrollObservation) -> Self {
        Self::new(
            EventCategory::ScrollDepth,
            EventPayload::ScrollObservation(observation),
        )
    }

    pub fn js_error(message: impl Into<String>, url: Option<String>, line: Option<u32>) -> Self {
        Self::new(
            EventCategory::JsError,
            EventPayload::Error(ErrorData {
                message: message.into(),
                url,
                line,
            }),
        )
    }

    pub fn history_change(old_url: Option<String>, new_url: impl Into<String>) -> Self {
        Self::new(
            EventCategory::HistoryChange,
            EventPayload::History(HistoryData {
                old_url,
                new_url: new_url.into(),
                source: None,
            }),
        )
    }

    pub fn custom(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(
            EventCategory::Custom,
            EventPayload::Custom(CustomData {
                name: name.into(),
                data,
            }),
        )
    }

    /// Synthetic event a dispatcher emits on startup
    pub fn initialization() -> Self {
        Self::empty(EventCategory::Initialization)
    }

    /// Derive a synthetic event caused by this one
    pub fn derive(&self, category: EventCategory, payload: EventPayload) -> Self {
        Self::new(category, payload).with_context(self.context.child())
    }

    /// Child events collected by a group trigger (empty for other events)
    pub fn group_events(&self) -> &[Event] {
        match &self.payload {
            EventPayload::Group(g) => &g.events,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_round_trip_names() {
        for category in EventCategory::ALL {
            let parsed: EventCategory = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
            let json = serde_json::to_value(category).unwrap();
            assert_eq!(json, json!(category.as_str()));
        }
        assert!("scroll".parse::<EventCategory>().is_err());
    }

    #[test]
    fn test_payload_from_json_by_category() {
        let event = Event::from_json(
            EventCategory::Click,
            json!({"tag": "button", "id": "buy", "classes": ["btn"]}),
        )
        .unwrap();
        match event.payload {
            EventPayload::Element(el) => assert_eq!(el.id.as_deref(), Some("buy")),
            other => panic!("Expected element payload, got {:?}", other),
        }

        let event = Event::from_json(
            EventCategory::JsError,
            json!({"message": "boom", "line": 12}),
        )
        .unwrap();
        assert!(matches!(event.payload, EventPayload::Error(ErrorData { line: Some(12), .. })));

        let event = Event::from_json(EventCategory::ViewPage, json!({})).unwrap();
        assert!(matches!(event.payload, EventPayload::Empty));
    }

    #[test]
    fn test_invalid_payload() {
        let result = Event::from_json(EventCategory::JsError, json!({"line": "x"}));
        assert!(matches!(result, Err(EventError::InvalidPayload { .. })));
    }

    #[test]
    fn test_derived_event_links_context() {
        let click = Event::click(Element::new("a"));
        let derived = click.derive(EventCategory::Group, EventPayload::Empty);
        assert_eq!(derived.context.parent_id.as_deref(), Some(click.context.id.as_str()));
    }
}
