//! Progress reporting for long-running pipeline runs.
//!
//! A run reports on two decoupled signals: an integer percentage (0–100,
//! never decreasing within one run) and a free-text status line. Inject an
//! [`Arc<dyn ProgressSink>`] via
//! [`crate::config::MergeConfigBuilder::progress_callback`] or
//! [`crate::config::GenerationConfigBuilder::progress_callback`].
//!
//! # Why callbacks instead of channels?
//!
//! The pipelines are synchronous and usually run on a worker thread. A
//! callback is the least-invasive seam: the host can forward events to a
//! terminal progress bar, a GUI event loop, or (via [`ChannelProgress`]) an
//! async task, without the library knowing how the host communicates. There
//! is no back-pressure: a sink call returns as soon as the sink returns.
//!
//! # Example
//!
//! ```rust
//! use officeconv::{MergeConfig, ProgressSink};
//! use std::sync::{Arc, atomic::{AtomicU8, Ordering}};
//!
//! struct LastPercent(AtomicU8);
//!
//! impl ProgressSink for LastPercent {
//!     fn on_progress(&self, percent: u8) {
//!         self.0.store(percent, Ordering::SeqCst);
//!     }
//! }
//!
//! let sink = Arc::new(LastPercent(AtomicU8::new(0)));
//! let config = MergeConfig::builder()
//!     .progress_callback(sink as Arc<dyn ProgressSink>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Receives progress from a pipeline run.
///
/// Both methods default to no-ops so implementors only override what they
/// display.
pub trait ProgressSink: Send + Sync {
    /// Overall completion, 0–100. Monotonic within one run; the last call of
    /// a successful run is always `100`.
    fn on_progress(&self, percent: u8) {
        let _ = percent;
    }

    /// Human-readable description of the current step.
    fn on_status(&self, message: &str) {
        let _ = message;
    }
}

/// Discards every event. Used when no callback is configured.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}

/// Convenience alias matching the type stored in the config structs.
pub type ProgressCallback = Arc<dyn ProgressSink>;

// ── Channel adapter ───────────────────────────────────────────────────────

/// One progress signal, as delivered by [`ChannelProgress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Percent(u8),
    Status(String),
}

/// Forwards progress into an unbounded Tokio channel.
///
/// Sending never blocks the pipeline; if the receiver has been dropped the
/// events are silently discarded.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    /// Create a sink and the receiver that observes it.
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn on_progress(&self, percent: u8) {
        let _ = self.tx.send(ProgressEvent::Percent(percent));
    }

    fn on_status(&self, message: &str) {
        let _ = self.tx.send(ProgressEvent::Status(message.to_string()));
    }
}

// ── Internal reporter ─────────────────────────────────────────────────────

/// Percentage of `done` out of `total`, rounded down. `0` when `total` is 0.
pub(crate) fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done.min(total) * 100) / total) as u8
}

/// Wraps an optional sink and clamps percentages so they never go backwards.
pub(crate) struct Reporter<'a> {
    sink: Option<&'a dyn ProgressSink>,
    last: u8,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(sink: Option<&'a ProgressCallback>) -> Self {
        Self {
            sink: sink.map(|cb| cb.as_ref()),
            last: 0,
        }
    }

    /// Report `percent` (raised to the previous value if lower), then the
    /// status line.
    pub(crate) fn step(&mut self, percent: u8, status: &str) {
        self.last = self.last.max(percent.min(100));
        if let Some(sink) = self.sink {
            sink.on_progress(self.last);
            sink.on_status(status);
        }
    }
}
