//! Timer-deferral primitives for auto-save and render scheduling
//!
//! Deferral is modeled as plain state plus caller-supplied instants so the
//! behavior is deterministic under test; async callers drive it with a
//! tokio sleep until [`Debounce::deadline`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Where an edit originated.
///
/// Scripted updates flush immediately instead of arming the debounce
/// window; the mode is threaded through the call rather than kept as an
/// ambient "is programmatically updating" flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    User,
    Scripted,
}

/// Debounce state machine: at most one pending item, whose deadline
/// restarts on every submission. The final item of a burst is always
/// flushed, either when its window elapses or by [`Debounce::flush`].
#[derive(Debug)]
pub struct Debounce<T> {
    window: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Debounce<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            deadline: None,
        }
    }

    /// Submit an item, superseding any pending one and restarting the window
    pub fn submit(&mut self, item: T, now: Instant) {
        self.pending = Some(item);
        self.deadline = Some(now + self.window);
    }

    /// Submit with an origin. User edits are deferred; scripted edits
    /// cancel any pending deferral and are returned for an immediate flush.
    pub fn submit_from(&mut self, item: T, origin: EditOrigin, now: Instant) -> Option<T> {
        match origin {
            EditOrigin::User => {
                self.submit(item, now);
                None
            }
            EditOrigin::Scripted => {
                self.pending = None;
                self.deadline = None;
                Some(item)
            }
        }
    }

    /// The instant at which the pending item becomes due
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Take the pending item once its window has elapsed
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            self.deadline = None;
            self.pending.take()
        } else {
            None
        }
    }

    /// Take the pending item regardless of the window (shutdown flush)
    pub fn flush(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }
}

/// Monotonic render-request identifiers.
///
/// A resolution in flight is never cancelled; a result computed for an
/// older request than the current one is stale and must be discarded by
/// the presenter instead of overwriting newer display state.
#[derive(Debug, Default)]
pub struct RequestTracker {
    current: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(u64);

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, superseding all earlier ones
    pub fn begin(&self) -> RequestId {
        RequestId(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether a result tagged with this id may still be displayed
    pub fn is_current(&self, id: RequestId) -> bool {
        self.current.load(Ordering::SeqCst) == id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    #[test]
    fn test_item_is_due_after_window() {
        let mut debounce = Debounce::new(WINDOW);
        let t0 = Instant::now();

        debounce.submit("edit", t0);
        assert_eq!(debounce.take_due(t0 + WINDOW / 2), None);
        assert_eq!(debounce.take_due(t0 + WINDOW), Some("edit"));
        assert!(debounce.is_idle());
    }

    #[test]
    fn test_new_edit_restarts_window_and_supersedes() {
        let mut debounce = Debounce::new(WINDOW);
        let t0 = Instant::now();

        debounce.submit("first", t0);
        // Just before the first deadline, another edit arrives
        let t1 = t0 + WINDOW - Duration::from_millis(1);
        debounce.submit("second", t1);

        // The original deadline passes without a flush
        assert_eq!(debounce.take_due(t0 + WINDOW), None);
        // The restarted window elapses with only the newest item
        assert_eq!(debounce.take_due(t1 + WINDOW), Some("second"));
        assert_eq!(debounce.take_due(t1 + WINDOW * 2), None);
    }

    #[test]
    fn test_final_edit_is_never_dropped() {
        let mut debounce = Debounce::new(WINDOW);
        let t0 = Instant::now();

        debounce.submit("last keystroke", t0);
        // Shutdown before the window elapses still flushes
        assert_eq!(debounce.flush(), Some("last keystroke"));
        assert!(debounce.is_idle());
    }

    #[test]
    fn test_scripted_edit_bypasses_window() {
        let mut debounce = Debounce::new(WINDOW);
        let t0 = Instant::now();

        assert_eq!(debounce.submit_from("typed", EditOrigin::User, t0), None);
        // A scripted update supersedes the pending user edit and flushes now
        assert_eq!(
            debounce.submit_from("scripted", EditOrigin::Scripted, t0),
            Some("scripted")
        );
        assert!(debounce.is_idle());
        assert_eq!(debounce.take_due(t0 + WINDOW), None);
    }

    #[test]
    fn test_stale_render_results_are_discarded() {
        let tracker = RequestTracker::new();

        let first = tracker.begin();
        assert!(tracker.is_current(first));

        let second = tracker.begin();
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
    }
}
