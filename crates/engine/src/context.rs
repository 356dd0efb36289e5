//! Shared per-service task state.
//!
//! [`TaskContext`] is constructed once per running service and handed (as
//! `Arc<TaskContext>`) to the API, the worker and the broadcaster. Every
//! change to the registry, the pending queue or the observer table happens
//! under one mutex, held only for in-memory work. Change notifications go
//! out on the [`EventBus`] after the guard is released.

use std::sync::Arc;

use chrono::Utc;
use partbridge_core::error::CoreResult;
use partbridge_core::job::JobSpec;
use partbridge_core::task::{TaskDetail, TaskStatus, TaskSummary, TaskUpdate};
use partbridge_core::types::TaskId;
use partbridge_events::{EventBus, TaskEvent, TaskEventKind};
use tokio::sync::{watch, Mutex, MutexGuard, Notify};

use crate::broadcaster::SubscriberTable;
use crate::queue::PendingQueue;
use crate::registry::TaskRegistry;

/// Everything guarded by the context mutex.
#[derive(Default)]
pub(crate) struct SharedState {
    pub(crate) registry: TaskRegistry,
    pub(crate) queue: PendingQueue,
    pub(crate) subscribers: SubscriberTable,
}

impl SharedState {
    /// Snapshot of `id` including its current queue position.
    pub(crate) fn summary(&self, id: &TaskId) -> CoreResult<TaskSummary> {
        let record = self.registry.get(id)?;
        Ok(record.summary(self.queue.position(id)))
    }
}

/// A task the worker has claimed: already `Running`, no longer pending.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: TaskId,
    pub spec: JobSpec,
}

pub struct TaskContext {
    state: Mutex<SharedState>,
    /// Signalled on every enqueue; the worker waits on it when idle.
    work_ready: Notify,
    /// Submitted tasks that have not yet been processed to a terminal state.
    outstanding: watch::Sender<usize>,
    events: Arc<EventBus>,
}

impl TaskContext {
    pub fn new(events: Arc<EventBus>) -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            state: Mutex::new(SharedState::default()),
            work_ready: Notify::new(),
            outstanding,
            events,
        }
    }

    /// The change feed this context publishes to.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().await
    }

    // ---- submission and lookup ----

    /// Register a new task and append it to the pending queue.
    ///
    /// Both happen under the same guard, so submission order is
    /// processing order.
    pub async fn submit(&self, spec: JobSpec) -> TaskSummary {
        let lcsc_id = spec.lcsc_id.clone();
        let summary = {
            let mut state = self.lock().await;
            let mut summary = state.registry.create(spec, Utc::now()).summary(None);
            state.queue.enqueue(summary.id);
            summary.queue_position = state.queue.position(&summary.id);
            self.outstanding.send_modify(|n| *n += 1);
            summary
        };

        self.work_ready.notify_one();
        self.events
            .publish(TaskEvent::new(summary.id, TaskEventKind::Created));

        tracing::info!(
            task_id = %summary.id,
            lcsc_id = %lcsc_id,
            queue_position = ?summary.queue_position,
            "Task queued",
        );
        summary
    }

    pub async fn summary(&self, id: &TaskId) -> CoreResult<TaskSummary> {
        self.lock().await.summary(id)
    }

    pub async fn detail(&self, id: &TaskId) -> CoreResult<TaskDetail> {
        let state = self.lock().await;
        let record = state.registry.get(id)?;
        Ok(record.detail(state.queue.position(id)))
    }

    /// Summaries of all tasks in submission order.
    pub async fn list(&self) -> Vec<TaskSummary> {
        let state = self.lock().await;
        state
            .registry
            .list()
            .map(|record| record.summary(state.queue.position(&record.id)))
            .collect()
    }

    /// 1-based rank of `id` in the pending queue.
    pub async fn position(&self, id: &TaskId) -> Option<usize> {
        self.lock().await.queue.position(id)
    }

    pub async fn pending_len(&self) -> usize {
        self.lock().await.queue.len()
    }

    pub async fn task_count(&self) -> usize {
        self.lock().await.registry.len()
    }

    pub async fn running_count(&self) -> usize {
        self.lock().await.registry.running_count()
    }

    // ---- worker side ----

    /// Wait for the next pending task and claim it.
    ///
    /// Dequeuing and the `Queued -> Running` transition happen atomically,
    /// so a task is never observable as both pending and running. Intended
    /// for a single consumer.
    pub async fn next_job(&self) -> ClaimedJob {
        loop {
            let claimed = {
                let mut state = self.lock().await;
                let mut claimed = None;
                while let Some(id) = state.queue.dequeue() {
                    match state.registry.start(&id, Utc::now()) {
                        Some(spec) => {
                            let still_pending: Vec<TaskId> = state.queue.iter().copied().collect();
                            claimed = Some((ClaimedJob { id, spec }, still_pending));
                            break;
                        }
                        None => {
                            tracing::warn!(task_id = %id, "Skipping pending task that cannot start");
                            self.job_finished();
                        }
                    }
                }
                claimed
            };

            if let Some((job, still_pending)) = claimed {
                self.events
                    .publish(TaskEvent::new(job.id, TaskEventKind::Started));
                for id in still_pending {
                    self.events
                        .publish(TaskEvent::new(id, TaskEventKind::QueueAdvanced));
                }
                return job;
            }

            self.work_ready.notified().await;
        }
    }

    /// Apply `update` to task `id` and announce the change.
    ///
    /// Unknown ids and updates rejected by the record's state machine are
    /// silent no-ops; returns whether anything changed.
    pub async fn apply(&self, id: &TaskId, update: TaskUpdate) -> bool {
        let kind = match &update {
            TaskUpdate::Start => TaskEventKind::Started,
            TaskUpdate::Progress(_) => TaskEventKind::Progress,
            TaskUpdate::Complete { .. } => TaskEventKind::Completed,
            TaskUpdate::Fail { .. } => TaskEventKind::Failed,
        };

        let status = self.lock().await.registry.mutate(id, update, Utc::now());
        let Some(status) = status else {
            tracing::debug!(task_id = %id, ?kind, "Ignored update for finished or unknown task");
            return false;
        };

        let kind = match status {
            TaskStatus::Failed => TaskEventKind::Failed,
            _ => kind,
        };
        self.events.publish(TaskEvent::new(*id, kind));
        true
    }

    /// Mark one claimed task as processed.
    pub(crate) fn job_finished(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Number of submitted tasks not yet processed to a terminal state.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolve once every submitted task has been processed.
    pub async fn wait_idle(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use partbridge_core::converter::{ConversionResult, ConversionStage, ProgressReport};
    use partbridge_core::job::{KicadVersion, OutputKinds};

    use super::*;

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

    #[tokio::test]
    async fn submit_queues_and_announces() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let ctx = TaskContext::new(bus);

        let first = ctx.submit(spec()).await;
        let second = ctx.submit(spec()).await;

        assert_eq!(first.status, TaskStatus::Queued);
        assert_eq!(first.queue_position, Some(1));
        assert_eq!(second.queue_position, Some(2));
        assert_eq!(ctx.outstanding(), 2);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.task_id, first.id);
        assert_eq!(event.kind, TaskEventKind::Created);
    }

    #[tokio::test]
    async fn next_job_claims_head_and_advances_others() {
        let bus = Arc::new(EventBus::default());
        let ctx = TaskContext::new(Arc::clone(&bus));
        let first = ctx.submit(spec()).await;
        let second = ctx.submit(spec()).await;
        let mut rx = bus.subscribe();

        let job = ctx.next_job().await;
        assert_eq!(job.id, first.id);
        assert_eq!(ctx.summary(&first.id).await.unwrap().status, TaskStatus::Running);
        assert_eq!(ctx.position(&first.id).await, None);
        assert_eq!(ctx.position(&second.id).await, Some(1));

        let started = rx.recv().await.unwrap();
        assert_eq!((started.task_id, started.kind), (first.id, TaskEventKind::Started));
        let advanced = rx.recv().await.unwrap();
        assert_eq!(
            (advanced.task_id, advanced.kind),
            (second.id, TaskEventKind::QueueAdvanced)
        );
    }

    #[tokio::test]
    async fn next_job_waits_for_submission() {
        let ctx = Arc::new(TaskContext::new(Arc::new(EventBus::default())));
        let waiter = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.next_job().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        let submitted = ctx.submit(spec()).await;
        let job = waiter.await.unwrap();
        assert_eq!(job.id, submitted.id);
    }

    #[tokio::test]
    async fn apply_reports_failed_kind_for_failure_stage() {
        let bus = Arc::new(EventBus::default());
        let ctx = TaskContext::new(Arc::clone(&bus));
        let task = ctx.submit(spec()).await;
        ctx.next_job().await;
        let mut rx = bus.subscribe();

        let report = ProgressReport::new(ConversionStage::Failed, 30, Some("nope".into()));
        assert!(ctx.apply(&task.id, TaskUpdate::Progress(report)).await);
        assert_eq!(rx.recv().await.unwrap().kind, TaskEventKind::Failed);

        let late = TaskUpdate::Complete {
            report: None,
            result: ConversionResult::default(),
        };
        assert!(!ctx.apply(&task.id, late).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn apply_to_unknown_task_is_noop() {
        let ctx = TaskContext::new(Arc::new(EventBus::default()));
        let applied = ctx
            .apply(&TaskId::now_v7(), TaskUpdate::Fail { message: "x".into() })
            .await;
        assert!(!applied);
        assert_eq!(ctx.task_count().await, 0);
    }

    #[tokio::test]
    async fn failing_a_queued_task_is_noop() {
        let ctx = TaskContext::new(Arc::new(EventBus::default()));
        let task = ctx.submit(spec()).await;

        let applied = ctx
            .apply(&task.id, TaskUpdate::Fail { message: "x".into() })
            .await;
        assert!(!applied);

        let summary = ctx.summary(&task.id).await.unwrap();
        assert_eq!(summary.status, TaskStatus::Queued);
        assert_eq!(summary.queue_position, Some(1));
        assert!(summary.started_at.is_none());
        assert!(summary.error.is_none());
    }

    #[tokio::test]
    async fn wait_idle_resolves_after_jobs_finish() {
        let ctx = Arc::new(TaskContext::new(Arc::new(EventBus::default())));
        ctx.submit(spec()).await;

        let idle = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.wait_idle().await })
        };
        tokio::task::yield_now().await;
        assert!(!idle.is_finished());

        ctx.next_job().await;
        ctx.job_finished();
        idle.await.unwrap();
        assert_eq!(ctx.outstanding(), 0);
    }
}
