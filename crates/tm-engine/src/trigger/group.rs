//! Group trigger latches

use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tm_core::Event;

#[derive(Debug, Default)]
struct Latch {
    was_called: bool,
    event: Option<Event>,
}

/// Tracks which children of a group have completed
#[derive(Debug)]
pub struct GroupState {
    latches: Mutex<IndexMap<String, Latch>>,
    fired: AtomicBool,
}

impl GroupState {
    pub fn new(children: &[String]) -> Self {
        let latches = children
            .iter()
            .map(|id| (id.clone(), Latch::default()))
            .collect();
        Self {
            latches: Mutex::new(latches),
            fired: AtomicBool::new(false),
        }
    }

    /// Child trigger ids, in configured order
    pub fn children(&self) -> Vec<String> {
        self.latches
            .lock()
            .map(|latches| latches.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Record a child completion
    ///
    /// Only the first completion of each child is kept. Once every child has
    /// completed and the group has not fired yet, the collected child events
    /// are returned in child order.
    pub fn record(&self, child_id: &str, event: &Event) -> Option<Vec<Event>> {
        let mut latches = self.latches.lock().ok()?;
        let latch = latches.get_mut(child_id)?;
        if !latch.was_called {
            latch.was_called = true;
            latch.event = Some(event.clone());
        }

        if self.fired.load(Ordering::SeqCst) || !latches.values().all(|l| l.was_called) {
            return None;
        }
        Some(latches.values().filter_map(|l| l.event.clone()).collect())
    }

    /// Mark the group fired; false if it already was
    pub fn mark_fired(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        if let Ok(mut latches) = self.latches.lock() {
            for latch in latches.values_mut() {
                *latch = Latch::default();
            }
        }
        self.fired.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_core::EventCategory;

    #[test]
    fn test_waits_for_every_child() {
        let group = GroupState::new(&["a".to_string(), "b".to_string()]);
        let event = Event::empty(EventCategory::ViewPage);

        assert!(group.record("a", &event).is_none());
        assert!(group.record("a", &event).is_none());
        assert!(group.record("other", &event).is_none());

        let events = group.record("b", &event).unwrap();
        assert_eq!(events.len(), 2);
        assert!(group.mark_fired());

        assert!(group.record("a", &event).is_none());
        assert!(!group.mark_fired());
    }

    #[test]
    fn test_keeps_first_child_event_in_child_order() {
        let group = GroupState::new(&["a".to_string(), "b".to_string()]);
        let first = Event::custom("first", serde_json::Value::Null);
        let second = Event::custom("second", serde_json::Value::Null);

        group.record("b", &Event::initialization());
        group.record("a", &first);
        group.record("a", &second);
        let events = group.record("b", &second).unwrap();

        assert_eq!(events[0].context.id, first.context.id);
        assert_eq!(events[1].category, EventCategory::Initialization);
    }

    #[test]
    fn test_reset_clears_latches() {
        let group = GroupState::new(&["a".to_string()]);
        let event = Event::initialization();
        assert!(group.record("a", &event).is_some());
        assert!(group.mark_fired());

        group.reset();
        assert!(!group.has_fired());
        assert_eq!(group.children(), vec!["a".to_string()]);
        assert!(group.record("a", &event).is_some());
    }
}
