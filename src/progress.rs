//! Progress-observer trait for per-unit pipeline events.
//!
//! Pass an [`Arc<dyn ProgressObserver>`] to the `describe` or `synthesize`
//! stage to receive an event for every image or narration unit. The stage
//! loops know nothing about how progress is presented: the CLI forwards the
//! events to a terminal progress bar, a host application could forward them
//! to a channel or a database record.
//!
//! # Example
//!
//! ```rust
//! use pdf2audio::{ProgressObserver, Stage};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ProgressObserver for Counter {
//!     fn on_unit_complete(&self, _stage: Stage, index: usize, total: usize) {
//!         let done = self.0.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}/{total} (unit {index})");
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which stage is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Placeholder resolution; units are images.
    Describe,
    /// Speech synthesis; units are sentences or paragraphs.
    Synthesize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Describe => write!(f, "describe"),
            Stage::Synthesize => write!(f, "synthesize"),
        }
    }
}

/// Called by the pipeline as it processes each unit of work.
///
/// Units are processed one at a time, so events for one stage never overlap.
/// The trait is still `Send + Sync` so an observer can be shared with other
/// threads of the host application. All methods default to no-ops.
pub trait ProgressObserver: Send + Sync {
    /// Called once before the first unit.
    ///
    /// # Arguments
    /// * `total` — number of units the stage will attempt
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let _ = (stage, total);
    }

    /// Called just before the external call for a unit.
    ///
    /// `index` is 1-based for images (the image number) and 0-based for
    /// narration units (the sequence index).
    fn on_unit_start(&self, stage: Stage, index: usize, total: usize) {
        let _ = (stage, index, total);
    }

    /// Called when a unit succeeds.
    fn on_unit_complete(&self, stage: Stage, index: usize, total: usize) {
        let _ = (stage, index, total);
    }

    /// Called when a unit is skipped after a failure.
    ///
    /// # Arguments
    /// * `error` — human-readable error description
    fn on_unit_error(&self, stage: Stage, index: usize, total: usize, error: &str) {
        let _ = (stage, index, total, error);
    }

    /// Called once after every unit has been attempted.
    fn on_stage_complete(&self, stage: Stage, total: usize, success_count: usize) {
        let _ = (stage, total, success_count);
    }
}

/// Observer that ignores every event. Used when none is configured.
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {}

/// Convenience alias for a shared observer.
pub type SharedObserver = Arc<dyn ProgressObserver>;

/// The observer to use when the caller passed none.
pub(crate) fn or_noop(observer: Option<&SharedObserver>) -> SharedObserver {
    observer
        .cloned()
        .unwrap_or_else(|| Arc::new(NoopProgress) as SharedObserver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        success: AtomicUsize,
    }

    impl ProgressObserver for Tracking {
        fn on_unit_start(&self, _stage: Stage, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unit_complete(&self, _stage: Stage, _index: usize, _total: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unit_error(&self, _stage: Stage, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, _stage: Stage, _total: usize, success_count: usize) {
            self.success.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopProgress;
        o.on_stage_start(Stage::Synthesize, 3);
        o.on_unit_start(Stage::Synthesize, 0, 3);
        o.on_unit_error(Stage::Synthesize, 0, 3, "engine crashed");
        o.on_stage_complete(Stage::Synthesize, 3, 2);
    }

    #[test]
    fn tracking_observer_receives_events() {
        let t = Tracking::default();
        t.on_unit_start(Stage::Describe, 1, 2);
        t.on_unit_complete(Stage::Describe, 1, 2);
        t.on_unit_start(Stage::Describe, 2, 2);
        t.on_unit_error(Stage::Describe, 2, 2, "timeout");
        t.on_stage_complete(Stage::Describe, 2, 1);

        assert_eq!(t.starts.load(Ordering::SeqCst), 2);
        assert_eq!(t.completes.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
        assert_eq!(t.success.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn or_noop_falls_back() {
        let o = or_noop(None);
        o.on_stage_start(Stage::Describe, 0);
        assert_eq!(Stage::Synthesize.to_string(), "synthesize");
    }
}
