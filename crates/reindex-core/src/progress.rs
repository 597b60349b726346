//! Progress accounting and delivery.
//!
//! Each pass owns a slice of the global 0–100 scale ([`PhaseRange`]) and maps
//! its local completion ratio into it with [`map_progress`]. Events reach the
//! caller through a [`ProgressCallback`]; implementations must not block, the
//! orchestrator calls them inline.

use tokio::sync::mpsc;
use tracing::{debug, info};

use reindex_types::ProgressEvent;

/// A slice of the global progress scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseRange {
    pub start: u8,
    pub end: u8,
}

impl PhaseRange {
    /// First copy pass.
    pub const COPY: PhaseRange = PhaseRange { start: 0, end: 90 };
    /// Catch-up pass after the alias cutover.
    pub const CATCH_UP: PhaseRange = PhaseRange { start: 90, end: 98 };

    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }
}

/// Map `completed / total` into `[start, end]`.
///
/// A pass with no documents is complete by definition and maps to `end`.
pub fn map_progress(total: u64, completed: u64, start: u8, end: u8) -> u8 {
    if total == 0 {
        return end;
    }
    let completed = completed.min(total);
    let span = f64::from(end.saturating_sub(start));
    let offset = ((completed as f64 / total as f64) * span).round() as u8;
    start.saturating_add(offset).min(end.max(start))
}

/// Per-pass tracker that never moves backwards.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    range: PhaseRange,
    last: Option<u8>,
}

impl ProgressTracker {
    pub fn new(range: PhaseRange) -> Self {
        Self { range, last: None }
    }

    /// Record new totals and return the percentage to report.
    pub fn update(&mut self, total: u64, completed: u64) -> u8 {
        let mapped = map_progress(total, completed, self.range.start, self.range.end);
        let percent = self.last.map_or(mapped, |last| last.max(mapped));
        self.last = Some(percent);
        percent
    }

    /// Last reported percentage.
    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

/// Receives progress events.
pub trait ProgressCallback: Send + Sync {
    /// Called for every event, in order. Must return promptly.
    fn on_progress(&self, event: &ProgressEvent);
}

/// A no-op progress callback for when progress reporting isn't needed.
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// A callback that logs progress at info level.
pub struct LoggingProgressCallback;

impl ProgressCallback for LoggingProgressCallback {
    fn on_progress(&self, event: &ProgressEvent) {
        info!(
            percent = event.percent,
            message = event.message.as_deref().unwrap_or(""),
            "Migration progress"
        );
    }
}

/// Forwards events into an unbounded channel.
///
/// Sending never waits on the consumer; a dropped receiver silently
/// discards further events.
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    /// Create a callback and the receiving end of its stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressCallback for ChannelProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!(percent = event.percent, "Progress receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_progress_linear() {
        assert_eq!(map_progress(100, 0, 0, 90), 0);
        assert_eq!(map_progress(100, 50, 0, 90), 45);
        assert_eq!(map_progress(100, 100, 0, 90), 90);
        assert_eq!(map_progress(150, 100, 0, 90), 60);
    }

    #[test]
    fn test_map_progress_rounds() {
        // 1/3 * 8 = 2.67
        assert_eq!(map_progress(3, 1, 90, 98), 93);
        // 1/6 * 90 = 15.0
        assert_eq!(map_progress(6, 1, 0, 90), 15);
    }

    #[test]
    fn test_map_progress_zero_total_is_end() {
        assert_eq!(map_progress(0, 0, 0, 90), 90);
        assert_eq!(map_progress(0, 0, 90, 98), 98);
    }

    #[test]
    fn test_map_progress_clamps_overshoot() {
        assert_eq!(map_progress(10, 25, 0, 90), 90);
    }

    #[test]
    fn test_tracker_is_monotonic() {
        let mut tracker = ProgressTracker::new(PhaseRange::COPY);
        assert_eq!(tracker.update(100, 50), 45);
        // a smaller total reported later must not pull progress back
        assert_eq!(tracker.update(200, 50), 45);
        assert_eq!(tracker.update(100, 100), 90);
        assert_eq!(tracker.last(), Some(90));
    }

    #[test]
    fn test_channel_progress_delivers_in_order() {
        let (callback, mut rx) = ChannelProgress::channel();
        callback.on_progress(&ProgressEvent::percent(0));
        callback.on_progress(&ProgressEvent::new(50, "half"));

        assert_eq!(rx.try_recv().unwrap(), ProgressEvent::percent(0));
        assert_eq!(rx.try_recv().unwrap().message.as_deref(), Some("half"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_progress_survives_dropped_receiver() {
        let (callback, rx) = ChannelProgress::channel();
        drop(rx);
        callback.on_progress(&ProgressEvent::percent(10));
    }

    #[test]
    fn test_no_op_progress_callback() {
        NoOpProgressCallback.on_progress(&ProgressEvent::percent(1));
        LoggingProgressCallback.on_progress(&ProgressEvent::new(2, "logged"));
    }
}
