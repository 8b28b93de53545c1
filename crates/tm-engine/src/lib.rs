//! Tag Manager Engine
//!
//! Decides which third-party tags run in response to page events.
//!
//! # Architecture
//!
//! ```text
//! EVENT → TRIGGERS (segment) → INSTRUCTIONS (priority, policy) → TAGS
//! ```
//!
//! - **Segments**: AND-combined queries over event fields and variables
//! - **Triggers**: Category-bound detectors, some with page-level state
//! - **Instructions**: Bind triggers to a tag and chain through before/after links
//! - **Dispatcher**: Runs one dispatch per event and emits an act record
//!
//! # Key Types
//!
//! - [`Query`] / [`Segment`] - Predicate evaluation
//! - [`Trigger`] - Event detector built from a [`TriggerConfig`]
//! - [`Instruction`] - Trigger-to-tag binding
//! - [`Dispatcher`] - Orchestrates a container

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod instruction;
pub mod query;
pub mod segment;
pub mod selector;
pub mod trigger;
pub mod walker;

pub use config::{EngineConfig, TagConfig};
pub use dispatcher::{ActRecord, DispatchOutcome, Dispatcher, TagFailure};
pub use error::{EngineError, EngineResult, WalkError};
pub use instruction::{
    ActiveWindow, FiringPolicy, Instruction, InstructionArena, InstructionConfig,
    InstructionIndex, RunOutcome,
};
pub use query::{CompiledQuery, Filter, Operator, Query};
pub use segment::{Segment, SegmentConfig};
pub use selector::{SelectorError, SelectorList};
pub use trigger::{
    BasicTriggerConfig, Completion, CustomTriggerConfig, FireResult, FormTriggerConfig,
    GroupTriggerConfig, ScrollTriggerConfig, TimerTriggerConfig, Trigger, TriggerConfig,
    TriggerKind, TriggerSignal, VisibilityTriggerConfig,
};
pub use walker::{Visitor, Walker};
