//! Scroll-depth trigger state
//!
//! Percent checkpoints compare against how much of the document has been
//! seen (`(offset + viewport) / size`); pixel checkpoints compare against the
//! scroll offset.

use std::sync::Mutex;
use tm_core::{ScrollDepthData, ScrollObservation, ScrollOrientation, ScrollUnits};
use tracing::trace;

#[derive(Debug, Default)]
struct Progress {
    armed: bool,
    max_offset: f64,
    max_percent: f64,
    passed: Vec<bool>,
}

/// Per-axis maxima and passed checkpoints of a scroll-depth trigger
#[derive(Debug)]
pub struct ScrollState {
    orientation: ScrollOrientation,
    units: ScrollUnits,
    /// Ascending, deduplicated
    thresholds: Vec<f64>,
    progress: Mutex<Progress>,
}

impl ScrollState {
    pub fn new(orientation: ScrollOrientation, units: ScrollUnits, thresholds: &[f64]) -> Self {
        let mut thresholds: Vec<f64> = thresholds.iter().copied().filter(|t| t.is_finite()).collect();
        thresholds.sort_by(|a, b| a.total_cmp(b));
        thresholds.dedup();

        let progress = Progress {
            passed: vec![false; thresholds.len()],
            ..Default::default()
        };
        Self {
            orientation,
            units,
            thresholds,
            progress: Mutex::new(progress),
        }
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// Start processing observations
    pub fn registration(&self) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.armed = true;
        }
    }

    /// Re-arm after the document size may have changed
    ///
    /// Tracked maxima restart from zero; passed checkpoints stay passed.
    pub fn update(&self) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.armed = true;
            progress.max_offset = 0.0;
            progress.max_percent = 0.0;
        }
    }

    /// Forget all progress and stop processing observations
    pub fn reset(&self) {
        if let Ok(mut progress) = self.progress.lock() {
            *progress = Progress {
                passed: vec![false; self.thresholds.len()],
                ..Default::default()
            };
        }
    }

    pub fn is_armed(&self) -> bool {
        self.progress.lock().map(|p| p.armed).unwrap_or(false)
    }

    /// Process an observation
    ///
    /// Marks every newly passed checkpoint and returns the deepest of them.
    pub fn observe(&self, observation: &ScrollObservation) -> Option<ScrollDepthData> {
        let mut progress = self.progress.lock().ok()?;
        if !progress.armed {
            return None;
        }

        let (offset, viewport, size) = match self.orientation {
            ScrollOrientation::Vertical => (
                observation.scroll_top,
                observation.viewport_height,
                observation.scroll_height,
            ),
            ScrollOrientation::Horizontal => (
                observation.scroll_left,
                observation.viewport_width,
                observation.scroll_width,
            ),
        };

        progress.max_offset = progress.max_offset.max(offset.max(0.0));
        if size > 0.0 {
            let percent = ((progress.max_offset + viewport) / size * 100.0).min(100.0);
            progress.max_percent = progress.max_percent.max(percent);
        }

        let depth = match self.units {
            ScrollUnits::Percent => progress.max_percent,
            ScrollUnits::Pixels => progress.max_offset,
        };

        let mut deepest = None;
        for (i, threshold) in self.thresholds.iter().enumerate() {
            if !progress.passed[i] && depth >= *threshold {
                progress.passed[i] = true;
                deepest = Some(*threshold);
            }
        }

        trace!(depth, ?deepest, "Observed scroll position");
        deepest.map(|threshold| ScrollDepthData {
            orientation: self.orientation,
            threshold,
            units: self.units,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(scroll_top: f64) -> ScrollObservation {
        ScrollObservation {
            scroll_top,
            scroll_height: 4000.0,
            viewport_height: 1000.0,
            scroll_width: 1200.0,
            viewport_width: 1200.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_ignores_observations_until_registered() {
        let state = ScrollState::new(ScrollOrientation::Vertical, ScrollUnits::Percent, &[25.0]);
        assert!(state.observe(&at(3000.0)).is_none());

        state.registration();
        assert_eq!(state.observe(&at(3000.0)).unwrap().threshold, 25.0);
    }

    #[test]
    fn test_fires_deepest_new_checkpoint_once() {
        let state = ScrollState::new(
            ScrollOrientation::Vertical,
            ScrollUnits::Percent,
            &[75.0, 25.0, 50.0, 50.0],
        );
        assert_eq!(state.thresholds(), &[25.0, 50.0, 75.0]);
        state.registration();

        // 1000 + 1000 of 4000 seen = 50%
        assert_eq!(state.observe(&at(1000.0)).unwrap().threshold, 50.0);
        assert!(state.observe(&at(1200.0)).is_none());
        // Scrolling back up does not lower the maximum
        assert!(state.observe(&at(0.0)).is_none());
        assert_eq!(state.observe(&at(2000.0)).unwrap().threshold, 75.0);
    }

    #[test]
    fn test_pixel_checkpoints() {
        let state = ScrollState::new(ScrollOrientation::Vertical, ScrollUnits::Pixels, &[500.0]);
        state.registration();
        assert!(state.observe(&at(499.0)).is_none());
        let data = state.observe(&at(500.0)).unwrap();
        assert_eq!(data.units, ScrollUnits::Pixels);
    }

    #[test]
    fn test_update_keeps_passed_checkpoints_and_reset_clears() {
        let state = ScrollState::new(ScrollOrientation::Vertical, ScrollUnits::Percent, &[50.0]);
        state.registration();
        assert!(state.observe(&at(1000.0)).is_some());

        state.update();
        assert!(state.observe(&at(1000.0)).is_none());

        state.reset();
        assert!(!state.is_armed());
        state.registration();
        assert!(state.observe(&at(1000.0)).is_some());
    }
}
