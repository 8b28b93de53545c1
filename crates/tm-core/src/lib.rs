//! Core types for the tag manager
//!
//! This crate provides the fundamental types shared by the engine and its
//! collaborators: Event, EventCategory, the per-category payloads, the
//! Element snapshot, FieldValue and Context.

mod context;
mod element;
mod event;
mod value;

pub use context::Context;
pub use element::Element;
pub use event::{
    CustomData, ErrorData, Event, EventCategory, EventError, EventPayload, GroupData, HistoryData,
    ScrollDepthData, ScrollObservation, ScrollOrientation, ScrollUnits, TimerData, VisibilityData,
};
pub use value::{format_number, parse_number, FieldValue};
