//! Task registry: the single owner of every [`TaskRecord`].
//!
//! Like [`PendingQueue`](crate::PendingQueue) this type is not
//! synchronized; [`TaskContext`](crate::TaskContext) holds it under the
//! shared guard and publishes a change event after each successful
//! [`mutate`](TaskRegistry::mutate).

use indexmap::IndexMap;
use partbridge_core::error::{CoreError, CoreResult};
use partbridge_core::job::JobSpec;
use partbridge_core::task::{TaskRecord, TaskStatus, TaskUpdate};
use partbridge_core::types::{TaskId, Timestamp};

/// Entity name used in not-found errors.
pub const TASK_ENTITY: &str = "Task";

/// Insertion-ordered map of task records.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: IndexMap<TaskId, TaskRecord>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new `Queued` record for `spec`.
    pub fn create(&mut self, spec: JobSpec, now: Timestamp) -> &TaskRecord {
        let mut id = TaskId::now_v7();
        while self.tasks.contains_key(&id) {
            id = TaskId::now_v7();
        }
        self.tasks
            .entry(id)
            .or_insert_with(|| TaskRecord::new(id, spec, now))
    }

    pub fn get(&self, id: &TaskId) -> CoreResult<&TaskRecord> {
        self.tasks.get(id).ok_or_else(|| CoreError::NotFound {
            entity: TASK_ENTITY,
            id: id.to_string(),
        })
    }

    /// All records in insertion order.
    pub fn list(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values()
    }

    /// Apply `update` to the record `id`.
    ///
    /// Returns the record's status after the update, or `None` when nothing
    /// changed: the id is unknown or the update is invalid from the current
    /// status (e.g. the record is already terminal).
    pub fn mutate(&mut self, id: &TaskId, update: TaskUpdate, now: Timestamp) -> Option<TaskStatus> {
        let record = self.tasks.get_mut(id)?;
        record.apply(update, now).then_some(record.status)
    }

    /// Move a `Queued` record to `Running` and return its job specification.
    ///
    /// `None` if the id is unknown or the record is not queued.
    pub fn start(&mut self, id: &TaskId, now: Timestamp) -> Option<JobSpec> {
        let record = self.tasks.get_mut(id)?;
        record
            .apply(TaskUpdate::Start, now)
            .then(|| record.spec.clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of records currently `Running`.
    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|r| r.status == TaskStatus::Running)
            .count()
    }
}
