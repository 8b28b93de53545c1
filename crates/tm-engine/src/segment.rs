//! Segments: boolean predicates over event fields and variables
//!
//! A segment is an ordered list of queries. Against one event it is the AND
//! of its queries; against a list of events it is the OR of the per-event
//! results; without an event it only reads stored variables.

use std::fmt;
use std::sync::Arc;
use tm_core::{Element, Event, EventCategory, EventPayload, FieldValue};
use tm_variable_store::VariableLookup;
use tracing::trace;

use crate::query::{CompiledQuery, Query};

/// Configured form of a segment
pub type SegmentConfig = Vec<Query>;

/// A compiled segment bound to a variable lookup
pub struct Segment {
    queries: Vec<CompiledQuery>,
    variables: Arc<dyn VariableLookup>,
}

impl Segment {
    pub fn new(queries: &[Query], variables: Arc<dyn VariableLookup>) -> Self {
        Self {
            queries: queries.iter().map(Query::compile).collect(),
            variables,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Evaluate against an event, or against variables only when `None`
    pub fn check(&self, event: Option<&Event>) -> bool {
        match event {
            Some(event) => self.check_event(event),
            None => self
                .queries
                .iter()
                .all(|query| self.check_variable(query, None)),
        }
    }

    /// AND over every query, short-circuiting on the first false
    pub fn check_event(&self, event: &Event) -> bool {
        self.queries
            .iter()
            .all(|query| self.check_query(query, event))
    }

    /// OR over the events, short-circuiting on the first match
    pub fn check_any(&self, events: &[Event]) -> bool {
        events.iter().any(|event| self.check_event(event))
    }

    fn check_query(&self, query: &CompiledQuery, event: &Event) -> bool {
        match builtin_field(query.argument(), event) {
            Some(value) => query.matches(&value),
            None => self.check_variable(query, Some(event)),
        }
    }

    fn check_variable(&self, query: &CompiledQuery, event: Option<&Event>) -> bool {
        match self.variables.resolve(query.argument(), event) {
            Ok(value) => query.matches(&value),
            Err(e) => {
                trace!(argument = query.argument(), error = %e, "Unresolved variable in segment");
                false
            }
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("queries", &self.queries)
            .finish_non_exhaustive()
    }
}

/// Resolve a built-in event field
///
/// Returns `None` when the argument is not a built-in field or the event is
/// not of the kind that carries it, in which case the argument is read as a
/// variable.
pub fn builtin_field(argument: &str, event: &Event) -> Option<FieldValue> {
    let (kind, field) = argument.split_once('_')?;

    match (kind, event.category, &event.payload) {
        ("click", EventCategory::Click | EventCategory::LinkClick, EventPayload::Element(el)) => {
            element_field(field, el)
        }
        ("form", EventCategory::FormSubmit, EventPayload::Element(el)) => element_field(field, el),
        ("visible", EventCategory::ElementVisible, EventPayload::Visibility(v)) => match field {
            "percent" => Some(
                v.percent_visible
                    .map(FieldValue::Number)
                    .unwrap_or(FieldValue::Undefined),
            ),
            "element" | "id" | "classes" | "text" => element_field(field, &v.element),
            _ => None,
        },
        ("scroll", EventCategory::ScrollDepth, EventPayload::ScrollDepth(d)) => match field {
            "depth_threshold" => Some(FieldValue::Number(d.threshold)),
            "depth_units" => Some(FieldValue::from(d.units.as_str())),
            "direction" => Some(FieldValue::from(d.orientation.as_str())),
            _ => None,
        },
        ("error", EventCategory::JsError, EventPayload::Error(e)) => match field {
            "message" => Some(FieldValue::from(e.message.as_str())),
            "url" => Some(FieldValue::text_or_undefined(e.url.as_deref())),
            "line" => Some(
                e.line
                    .map(|l| FieldValue::Number(f64::from(l)))
                    .unwrap_or(FieldValue::Undefined),
            ),
            _ => None,
        },
        ("timer", EventCategory::Timer, EventPayload::Timer(t)) => {
            let n = match field {
                "count" => t.count,
                "interval" => t.interval_ms,
                "elapsed" => t.elapsed_ms,
                "total" => t.total_ms,
                _ => return None,
            };
            Some(FieldValue::Number(n as f64))
        }
        ("history", EventCategory::HistoryChange, EventPayload::History(h)) => match field {
            "old_url" => Some(FieldValue::text_or_undefined(h.old_url.as_deref())),
            "new_url" => Some(FieldValue::from(h.new_url.as_str())),
            "source" => Some(FieldValue::text_or_undefined(h.source.as_deref())),
            _ => None,
        },
        ("custom", EventCategory::Custom, EventPayload::Custom(c)) => match field {
            "event_name" => Some(FieldValue::from(c.name.as_str())),
            _ => None,
        },
        _ => None,
    }
}

fn element_field(field: &str, element: &Element) -> Option<FieldValue> {
    let value = match field {
        "element" => FieldValue::Element(Box::new(element.clone())),
        "id" => FieldValue::text_or_undefined(element.id.as_deref()),
        "classes" => FieldValue::Text(element.class_name()),
        "target" => FieldValue::text_or_undefined(element.target.as_deref()),
        "url" => FieldValue::text_or_undefined(element.url.as_deref()),
        "text" => FieldValue::text_or_undefined(element.text.as_deref()),
        _ => return None,
    };
    Some(value)
}
