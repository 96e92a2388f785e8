//! Async entry points: run a pipeline off the executor and observe it.
//!
//! ## Why spawn_blocking?
//!
//! Both pipelines are synchronous and CPU/IO heavy (font rasterisation,
//! pdfium rendering, TIFF encoding). Running them on a Tokio worker would
//! stall every other task on that worker for seconds at a time.
//! `tokio::task::spawn_blocking` moves each run onto the blocking pool, and
//! the caller just awaits the report.
//!
//! ## Why a stream of events?
//!
//! A UI or server usually wants progress *and* the final outcome through one
//! channel. [`merge_events`] and [`generate_events`] return a `Stream` that
//! yields every progress signal in order and ends with exactly one terminal
//! event ([`JobEvent::MergeFinished`], [`JobEvent::CardsFinished`] or
//! [`JobEvent::Failed`]).

use crate::cards::{generate, GenerationReport};
use crate::config::{GenerationConfig, MergeConfig};
use crate::error::OfficeConvError;
use crate::merge::{merge, MergeReport};
use crate::progress::{ProgressCallback, ProgressSink};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;

/// One observation of a running job.
#[derive(Debug)]
pub enum JobEvent {
    Progress(u8),
    Status(String),
    MergeFinished(MergeReport),
    CardsFinished(GenerationReport),
    Failed(OfficeConvError),
}

impl JobEvent {
    /// Whether this is the last event of its stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::MergeFinished(_) | JobEvent::CardsFinished(_) | JobEvent::Failed(_)
        )
    }
}

/// A boxed stream of job events.
pub type JobStream = Pin<Box<dyn Stream<Item = JobEvent> + Send>>;

/// Generate cards on the blocking pool.
///
/// See [`crate::cards::generate`] for semantics and errors.
pub async fn generate_cards(
    excel_path: impl Into<PathBuf>,
    sheet: impl Into<String>,
    output_dir: impl Into<PathBuf>,
    config: GenerationConfig,
) -> Result<GenerationReport, OfficeConvError> {
    let excel_path = excel_path.into();
    let sheet = sheet.into();
    let output_dir = output_dir.into();
    tokio::task::spawn_blocking(move || generate(&excel_path, &sheet, &output_dir, &config))
        .await
        .map_err(|e| OfficeConvError::Internal(format!("Card generation task panicked: {e}")))?
}

/// Merge to TIFF on the blocking pool.
///
/// See [`crate::merge::merge`] for semantics and errors.
pub async fn merge_to_tiff(
    inputs: Vec<PathBuf>,
    output: impl Into<PathBuf>,
    config: MergeConfig,
) -> Result<MergeReport, OfficeConvError> {
    let output = output.into();
    tokio::task::spawn_blocking(move || merge(&inputs, &output, &config))
        .await
        .map_err(|e| OfficeConvError::Internal(format!("Merge task panicked: {e}")))?
}

/// Start a merge and return its event stream.
///
/// Must be called from within a Tokio runtime. A progress callback already
/// present in `config` keeps receiving events as well.
pub fn merge_events(inputs: Vec<PathBuf>, output: impl Into<PathBuf>, config: MergeConfig) -> JobStream {
    let output = output.into();
    let (tx, rx) = unbounded_channel();
    let mut config = config;
    config.progress_callback = Some(forwarding_sink(&tx, config.progress_callback.take()));

    tokio::task::spawn_blocking(move || {
        let terminal = match merge(&inputs, &output, &config) {
            Ok(report) => JobEvent::MergeFinished(report),
            Err(e) => JobEvent::Failed(e),
        };
        let _ = tx.send(terminal);
    });

    Box::pin(UnboundedReceiverStream::new(rx))
}

/// Start a card generation run and return its event stream.
///
/// Same contract as [`merge_events`].
pub fn generate_events(
    excel_path: impl Into<PathBuf>,
    sheet: impl Into<String>,
    output_dir: impl Into<PathBuf>,
    config: GenerationConfig,
) -> JobStream {
    let excel_path = excel_path.into();
    let sheet = sheet.into();
    let output_dir = output_dir.into();
    let (tx, rx) = unbounded_channel();
    let mut config = config;
    config.progress_callback = Some(forwarding_sink(&tx, config.progress_callback.take()));

    tokio::task::spawn_blocking(move || {
        let terminal = match generate(&excel_path, &sheet, &output_dir, &config) {
            Ok(report) => JobEvent::CardsFinished(report),
            Err(e) => JobEvent::Failed(e),
        };
        let _ = tx.send(terminal);
    });

    Box::pin(UnboundedReceiverStream::new(rx))
}

// ── Internal helpers ─────────────────────────────────────────────────────

struct EventSink {
    tx: UnboundedSender<JobEvent>,
    inner: Option<ProgressCallback>,
}

impl ProgressSink for EventSink {
    fn on_progress(&self, percent: u8) {
        let _ = self.tx.send(JobEvent::Progress(percent));
        if let Some(inner) = &self.inner {
            inner.on_progress(percent);
        }
    }

    fn on_status(&self, message: &str) {
        let _ = self.tx.send(JobEvent::Status(message.to_string()));
        if let Some(inner) = &self.inner {
            inner.on_status(message);
        }
    }
}

fn forwarding_sink(
    tx: &UnboundedSender<JobEvent>,
    inner: Option<ProgressCallback>,
) -> ProgressCallback {
    Arc::new(EventSink {
        tx: tx.clone(),
        inner,
    })
}
