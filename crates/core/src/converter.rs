//! Contract between the worker and the external conversion routine.
//!
//! A [`Converter`] receives a [`JobSpec`] and a [`ProgressSink`]. It runs
//! on a blocking thread, reports zero or more [`ProgressReport`]s through
//! the sink, and finally returns a [`ConversionResult`] or a
//! [`ConversionError`]. Reports travel over a channel; the converter never
//! touches shared task state directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::job::JobSpec;

// ---------------------------------------------------------------------------
// Stages and reports
// ---------------------------------------------------------------------------

/// Phase a conversion is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversionStage {
    Starting,
    Fetching,
    Symbol,
    Footprint,
    Model,
    Completed,
    Failed,
}

impl ConversionStage {
    /// `Completed` and `Failed` end a conversion.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One progress event emitted by a converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub stage: ConversionStage,
    /// Already clamped to `0..=100`.
    pub percent: u8,
    pub message: Option<String>,
}

impl ProgressReport {
    pub fn new(stage: ConversionStage, percent: i64, message: Option<String>) -> Self {
        Self {
            stage,
            percent: clamp_percent(percent),
            message,
        }
    }
}

/// Clamp an arbitrary percentage into `0..=100`.
pub fn clamp_percent(percent: i64) -> u8 {
    percent.clamp(0, 100) as u8
}

/// Read half of the progress channel, drained by the worker.
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressReport>;

/// Write half of the progress channel handed to a converter.
///
/// Reporting never fails: if the worker has stopped listening the report
/// is dropped.
#[derive(Debug)]
pub struct ProgressSink {
    sender: mpsc::UnboundedSender<ProgressReport>,
}

impl ProgressSink {
    pub fn new(sender: mpsc::UnboundedSender<ProgressReport>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiver the worker drains.
    pub fn channel() -> (Self, ProgressReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    /// Report progress with a human-readable message.
    pub fn report(&self, stage: ConversionStage, percent: i64, message: impl Into<String>) {
        self.send(ProgressReport::new(stage, percent, Some(message.into())));
    }

    /// Report progress without a message.
    pub fn report_stage(&self, stage: ConversionStage, percent: i64) {
        self.send(ProgressReport::new(stage, percent, None));
    }

    fn send(&self, report: ProgressReport) {
        let _ = self.sender.send(report);
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Artifacts produced by a successful conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub symbol_path: Option<String>,
    pub footprint_path: Option<String>,
    /// Model kind (e.g. `"wrl"`, `"step"`) to file path.
    pub model_paths: BTreeMap<String, String>,
    pub messages: Vec<String>,
}

/// Abnormal termination of a conversion. The display text becomes the
/// task's error.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("{0}")]
    Failed(String),

    #[error("Converter program '{program}' could not be started: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Converter exited with status {code}: {detail}")]
    Exit { code: i32, detail: String },

    #[error("I/O error during conversion: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Converter trait
// ---------------------------------------------------------------------------

/// A blocking conversion routine.
///
/// Implementations may take a long time and are always invoked on a
/// blocking thread, never on the async executor.
pub trait Converter: Send + Sync + 'static {
    fn convert(
        &self,
        spec: &JobSpec,
        progress: &ProgressSink,
    ) -> Result<ConversionResult, ConversionError>;
}

impl<F> Converter for F
where
    F: Fn(&JobSpec, &ProgressSink) -> Result<ConversionResult, ConversionError>
        + Send
        + Sync
        + 'static,
{
    fn convert(
        &self,
        spec: &JobSpec,
        progress: &ProgressSink,
    ) -> Result<ConversionResult, ConversionError> {
        self(spec, progress)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
