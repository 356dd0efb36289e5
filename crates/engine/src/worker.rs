//! The single conversion worker.
//!
//! [`Worker::run`] claims pending tasks one at a time and drives each
//! through the [`Converter`] on a blocking thread. Progress reports are
//! applied while the converter runs; the outcome of the call decides the
//! terminal state.

use std::any::Any;
use std::sync::Arc;

use partbridge_core::converter::{ConversionStage, Converter, ProgressReport, ProgressSink};
use partbridge_core::task::TaskUpdate;
use partbridge_core::types::TaskId;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::context::{ClaimedJob, TaskContext};

pub struct Worker {
    ctx: Arc<TaskContext>,
    converter: Arc<dyn Converter>,
}

impl Worker {
    pub fn new(ctx: Arc<TaskContext>, converter: Arc<dyn Converter>) -> Self {
        Self { ctx, converter }
    }

    /// Process tasks until `cancel` fires.
    ///
    /// Cancellation is only observed between tasks; a claimed task always
    /// runs to a terminal state.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("Conversion worker started");

        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = self.ctx.next_job() => job,
            };
            self.process(job).await;
            self.ctx.job_finished();
        }

        tracing::info!("Conversion worker stopped");
    }

    /// Run one claimed task to completion or failure.
    pub async fn process(&self, job: ClaimedJob) {
        let ClaimedJob { id, spec } = job;
        tracing::info!(task_id = %id, lcsc_id = %spec.lcsc_id, "Conversion started");

        let (sink, mut reports) = ProgressSink::channel();
        let converter = Arc::clone(&self.converter);
        let mut handle = tokio::task::spawn_blocking(move || converter.convert(&spec, &sink));

        let mut completion = None;
        let joined = loop {
            tokio::select! {
                biased;
                Some(report) = reports.recv() => {
                    self.forward(&id, report, &mut completion).await;
                }
                joined = &mut handle => break joined,
            }
        };
        // The sink was dropped with the closure; flush what it left behind.
        while let Ok(report) = reports.try_recv() {
            self.forward(&id, report, &mut completion).await;
        }

        let update = match joined {
            Ok(Ok(result)) => TaskUpdate::Complete {
                report: completion,
                result,
            },
            Ok(Err(e)) => {
                tracing::error!(task_id = %id, error = %e, "Conversion failed");
                TaskUpdate::Fail {
                    message: e.to_string(),
                }
            }
            Err(e) => {
                let message = join_failure_message(e);
                tracing::error!(task_id = %id, error = %message, "Converter aborted");
                TaskUpdate::Fail { message }
            }
        };

        let completed = matches!(update, TaskUpdate::Complete { .. });
        if self.ctx.apply(&id, update).await && completed {
            tracing::info!(task_id = %id, "Conversion completed");
        }
    }

    /// Apply one report. A `Completed` report is held back and applied
    /// together with the converter's result.
    async fn forward(
        &self,
        id: &TaskId,
        report: ProgressReport,
        completion: &mut Option<ProgressReport>,
    ) {
        if report.stage == ConversionStage::Completed {
            *completion = Some(report);
            return;
        }
        tracing::debug!(
            task_id = %id,
            stage = ?report.stage,
            percent = report.percent,
            "Conversion progress",
        );
        self.ctx.apply(id, TaskUpdate::Progress(report)).await;
    }
}

fn join_failure_message(error: JoinError) -> String {
    if error.is_cancelled() {
        return "Conversion was cancelled.".to_string();
    }
    match error.try_into_panic() {
        Ok(payload) => format!("Converter panicked: {}", panic_text(&*payload)),
        Err(error) => error.to_string(),
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text
    } else {
        "unknown panic"
    }
}
