//! Element-visible trigger state

use std::collections::HashSet;
use std::sync::Mutex;
use tm_core::Element;

/// Elements an element-visible trigger has already fired for
#[derive(Debug)]
pub struct VisibilityState {
    once_per_element: bool,
    seen: Mutex<HashSet<String>>,
}

impl VisibilityState {
    pub fn new(once_per_element: bool) -> Self {
        Self {
            once_per_element,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Claim a firing for the element; false if it already fired
    pub fn claim(&self, element: &Element) -> bool {
        if !self.once_per_element {
            return true;
        }
        self.seen
            .lock()
            .map(|mut seen| seen.insert(element.identity_key()))
            .unwrap_or(false)
    }

    pub fn reset(&self) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.clear();
        }
    }
}
