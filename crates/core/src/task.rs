//! Task record and its state machine.
//!
//! A [`TaskRecord`] only changes through [`TaskRecord::apply`], which
//! enforces the lifecycle `Queued -> Running -> {Completed | Failed}`:
//! terminal records never change again, progress never decreases, and the
//! event log is append-only. Timestamps are stamped from the `now`
//! argument, never by callers.

use serde::{Deserialize, Serialize};

use crate::converter::{ConversionResult, ConversionStage, ProgressReport};
use crate::job::JobSpec;
use crate::types::{TaskId, Timestamp};

/// Message recorded when a converter returns without a final message.
pub const DEFAULT_COMPLETED_MESSAGE: &str = "Conversion finished.";

/// Error text recorded when a failure carries no description.
pub const DEFAULT_FAILED_MESSAGE: &str = "Conversion failed.";

/// Message logged when the worker picks a task up.
pub const STARTED_MESSAGE: &str = "Conversion started.";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One entry of a task's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: Timestamp,
    pub stage: ConversionStage,
    pub message: Option<String>,
    /// Task progress right after this entry was applied.
    pub progress: u8,
}

/// Mutable tracked state of one submitted job.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub spec: JobSpec,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub updated_at: Timestamp,
    pub log: Vec<LogEntry>,
    pub result: Option<ConversionResult>,
}

/// A state change requested for a task.
#[derive(Debug, Clone)]
pub enum TaskUpdate {
    /// The worker picked the task up.
    Start,
    /// A non-final converter report. A `Failed` stage fails the task.
    Progress(ProgressReport),
    /// The converter returned successfully. `report` is the `Completed`
    /// report it emitted, if any.
    Complete {
        report: Option<ProgressReport>,
        result: ConversionResult,
    },
    /// The converter terminated abnormally.
    Fail { message: String },
}

impl TaskRecord {
    /// Create a fresh `Queued` record.
    pub fn new(id: TaskId, spec: JobSpec, now: Timestamp) -> Self {
        Self {
            id,
            spec,
            status: TaskStatus::Queued,
            progress: 0,
            message: None,
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
            log: Vec::new(),
            result: None,
        }
    }

    /// Apply `update` at time `now`.
    ///
    /// Returns `false` (leaving the record untouched) when the update is not
    /// valid from the current status.
    pub fn apply(&mut self, update: TaskUpdate, now: Timestamp) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        match update {
            TaskUpdate::Start => {
                if self.status != TaskStatus::Queued {
                    return false;
                }
                self.status = TaskStatus::Running;
                self.started_at = Some(now);
                self.message = Some(STARTED_MESSAGE.to_string());
                self.append_log(now, ConversionStage::Starting, self.message.clone());
            }
            TaskUpdate::Progress(report) => {
                if self.status != TaskStatus::Running {
                    return false;
                }
                self.raise_progress(report.percent);
                if report.stage == ConversionStage::Failed {
                    let error = report
                        .message
                        .unwrap_or_else(|| DEFAULT_FAILED_MESSAGE.to_string());
                    self.fail(error, now);
                } else {
                    if report.message.is_some() {
                        self.message = report.message.clone();
                    }
                    self.append_log(now, report.stage, report.message);
                }
            }
            TaskUpdate::Complete { report, result } => {
                if self.status != TaskStatus::Running {
                    return false;
                }
                self.progress = 100;
                self.message = Some(
                    report
                        .and_then(|r| r.message)
                        .unwrap_or_else(|| DEFAULT_COMPLETED_MESSAGE.to_string()),
                );
                self.result = Some(result);
                self.status = TaskStatus::Completed;
                self.finished_at = Some(now);
                self.append_log(now, ConversionStage::Completed, self.message.clone());
            }
            TaskUpdate::Fail { message } => {
                if self.status != TaskStatus::Running {
                    return false;
                }
                let message = if message.trim().is_empty() {
                    DEFAULT_FAILED_MESSAGE.to_string()
                } else {
                    message
                };
                self.fail(message, now);
            }
        }

        self.updated_at = now;
        true
    }

    /// Snapshot this record. The queue position comes from the pending
    /// queue, which the record knows nothing about.
    pub fn summary(&self, queue_position: Option<usize>) -> TaskSummary {
        TaskSummary {
            id: self.id,
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            queue_position,
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            result: self.result.clone(),
        }
    }

    pub fn detail(&self, queue_position: Option<usize>) -> TaskDetail {
        TaskDetail {
            summary: self.summary(queue_position),
            log: self.log.clone(),
        }
    }

    fn raise_progress(&mut self, percent: u8) {
        self.progress = self.progress.max(percent.min(100));
    }

    fn fail(&mut self, error: String, now: Timestamp) {
        self.status = TaskStatus::Failed;
        self.message = Some(error.clone());
        self.error = Some(error.clone());
        self.finished_at = Some(now);
        self.append_log(now, ConversionStage::Failed, Some(error));
    }

    fn append_log(&mut self, now: Timestamp, stage: ConversionStage, message: Option<String>) {
        self.log.push(LogEntry {
            timestamp: now,
            stage,
            message,
            progress: self.progress,
        });
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Point-in-time view of a task, as returned by the API and pushed to
/// observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: Option<String>,
    /// 1-based rank in the pending queue, `None` once dequeued.
    pub queue_position: Option<usize>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub result: Option<ConversionResult>,
}

/// Summary plus the ordered event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub summary: TaskSummary,
    pub log: Vec<LogEntry>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::job::{KicadVersion, OutputKinds};

    fn spec() -> JobSpec {
        JobSpec {
            lcsc_id: "C1234".to_string(),
            output_prefix: "/tmp/lib".to_string(),
            outputs: OutputKinds {
                symbol: true,
                ..Default::default()
            },
            overwrite: Default::default(),
            kicad_version: KicadVersion::V6,
            project_relative: false,
            project_relative_path: None,
        }
    }

    fn running_record() -> TaskRecord {
        let mut record = TaskRecord::new(TaskId::now_v7(), spec(), Utc::now());
        assert!(record.apply(TaskUpdate::Start, Utc::now()));
        record
    }

    fn progress(stage: ConversionStage, percent: i64, message: &str) -> TaskUpdate {
        TaskUpdate::Progress(ProgressReport::new(stage, percent, Some(message.to_string())))
    }

    #[test]
    fn new_record_is_queued_with_zero_progress() {
        let now = Utc::now();
        let record = TaskRecord::new(TaskId::now_v7(), spec(), now);
        assert_eq!(record.status, TaskStatus::Queued);
        assert_eq!(record.progress, 0);
        assert_eq!(record.created_at, now);
        assert!(record.log.is_empty());
    }

    #[test]
    fn start_stamps_started_at_and_logs() {
        let record = running_record();
        assert_eq!(record.status, TaskStatus::Running);
        assert!(record.started_at.is_some());
        assert_eq!(record.log.len(), 1);
        assert_eq!(record.log[0].stage, ConversionStage::Starting);
    }

    #[test]
    fn progress_before_start_is_ignored() {
        let mut record = TaskRecord::new(TaskId::now_v7(), spec(), Utc::now());
        assert!(!record.apply(progress(ConversionStage::Fetching, 20, "early"), Utc::now()));
        assert_eq!(record.status, TaskStatus::Queued);
        assert_eq!(record.progress, 0);
    }

    #[test]
    fn fail_before_start_is_ignored() {
        let mut record = TaskRecord::new(TaskId::now_v7(), spec(), Utc::now());
        let update = TaskUpdate::Fail {
            message: "converter missing".into(),
        };
        assert!(!record.apply(update, Utc::now()));
        assert_eq!(record.status, TaskStatus::Queued);
        assert!(record.error.is_none());
        assert!(record.finished_at.is_none());
        assert!(record.log.is_empty());
    }

    #[test]
    fn silent_progress_logs_no_message() {
        let mut record = running_record();
        record.apply(progress(ConversionStage::Fetching, 10, "Fetching"), Utc::now());
        let silent = TaskUpdate::Progress(ProgressReport::new(ConversionStage::Symbol, 40, None));
        assert!(record.apply(silent, Utc::now()));

        let entry = record.log.last().unwrap();
        assert_eq!(entry.stage, ConversionStage::Symbol);
        assert_eq!(entry.message, None);
        assert_eq!(entry.progress, 40);
        assert_eq!(record.message.as_deref(), Some("Fetching"));
    }

    #[test]
    fn progress_never_decreases() {
        let mut record = running_record();
        record.apply(progress(ConversionStage::Fetching, 60, "a"), Utc::now());
        record.apply(progress(ConversionStage::Symbol, 30, "b"), Utc::now());
        assert_eq!(record.progress, 60);
        assert_eq!(record.message.as_deref(), Some("b"));

        let logged: Vec<u8> = record.log.iter().map(|e| e.progress).collect();
        assert!(logged.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn failed_stage_report_fails_the_task() {
        let mut record = running_record();
        record.apply(progress(ConversionStage::Failed, 40, "no such part"), Utc::now());
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("no such part"));
        assert_eq!(record.progress, 40);
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn complete_sets_result_and_full_progress() {
        let mut record = running_record();
        record.apply(progress(ConversionStage::Fetching, 50, "Fetching"), Utc::now());
        let result = ConversionResult {
            symbol_path: Some("/tmp/lib.kicad_sym".to_string()),
            ..Default::default()
        };
        assert!(record.apply(
            TaskUpdate::Complete {
                report: None,
                result: result.clone(),
            },
            Utc::now(),
        ));
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.message.as_deref(), Some(DEFAULT_COMPLETED_MESSAGE));
        assert_eq!(record.result, Some(result));
        assert_eq!(record.log.last().unwrap().stage, ConversionStage::Completed);
    }

    #[test]
    fn complete_uses_reported_message() {
        let mut record = running_record();
        let report = ProgressReport::new(ConversionStage::Completed, 100, Some("Done".into()));
        record.apply(
            TaskUpdate::Complete {
                report: Some(report),
                result: ConversionResult::default(),
            },
            Utc::now(),
        );
        assert_eq!(record.message.as_deref(), Some("Done"));
    }

    #[test]
    fn abnormal_failure_keeps_last_progress() {
        let mut record = running_record();
        record.apply(progress(ConversionStage::Fetching, 50, "Fetching"), Utc::now());
        record.apply(
            TaskUpdate::Fail {
                message: "connection reset".to_string(),
            },
            Utc::now(),
        );
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.progress, 50);
        assert_eq!(record.error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn empty_failure_message_gets_default() {
        let mut record = running_record();
        record.apply(TaskUpdate::Fail { message: " ".into() }, Utc::now());
        assert_eq!(record.error.as_deref(), Some(DEFAULT_FAILED_MESSAGE));
    }

    #[test]
    fn terminal_records_are_frozen() {
        let mut record = running_record();
        record.apply(TaskUpdate::Fail { message: "boom".into() }, Utc::now());
        let finished_at = record.finished_at;
        let log_len = record.log.len();
        let later = Utc::now() + Duration::seconds(5);

        assert!(!record.apply(progress(ConversionStage::Model, 90, "late"), later));
        assert!(!record.apply(
            TaskUpdate::Complete {
                report: None,
                result: ConversionResult::default(),
            },
            later,
        ));
        assert!(!record.apply(TaskUpdate::Start, later));

        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.progress, 0);
        assert_eq!(record.result, None);
        assert_eq!(record.finished_at, finished_at);
        assert_eq!(record.log.len(), log_len);
    }

    #[test]
    fn detail_flattens_summary_fields() {
        let record = running_record();
        let json = serde_json::to_value(record.detail(None)).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["queue_position"], serde_json::Value::Null);
        assert_eq!(json["log"][0]["stage"], "STARTING");
    }
}
