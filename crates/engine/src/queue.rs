//! FIFO of task identifiers awaiting execution.
//!
//! The queue holds identifiers only; records stay in the registry. It is
//! not synchronized itself: it lives inside the shared state guarded by
//! [`TaskContext`](crate::TaskContext), whose `next_job` adds the blocking
//! dequeue on top.

use std::collections::VecDeque;

use partbridge_core::types::TaskId;

#[derive(Debug, Default)]
pub struct PendingQueue {
    ids: VecDeque<TaskId>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, id: TaskId) {
        self.ids.push_back(id);
    }

    /// Remove and return the head of the queue.
    pub fn dequeue(&mut self) -> Option<TaskId> {
        self.ids.pop_front()
    }

    /// 1-based rank of `id`, or `None` if it is not pending.
    pub fn position(&self, id: &TaskId) -> Option<usize> {
        self.ids.iter().position(|pending| pending == id).map(|i| i + 1)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Pending identifiers, head first.
    pub fn iter(&self) -> impl Iterator<Item = &TaskId> {
        self.ids.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeue_follows_enqueue_order() {
        let mut queue = PendingQueue::new();
        let ids: Vec<TaskId> = (0..3).map(|_| TaskId::now_v7()).collect();
        for id in &ids {
            queue.enqueue(*id);
        }

        assert_eq!(queue.dequeue(), Some(ids[0]));
        assert_eq!(queue.dequeue(), Some(ids[1]));
        assert_eq!(queue.dequeue(), Some(ids[2]));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn positions_shift_by_one_after_dequeue() {
        let mut queue = PendingQueue::new();
        let a = TaskId::now_v7();
        let b = TaskId::now_v7();
        queue.enqueue(a);
        queue.enqueue(b);

        assert_eq!(queue.position(&a), Some(1));
        assert_eq!(queue.position(&b), Some(2));

        queue.dequeue();
        assert_eq!(queue.position(&a), None);
        assert_eq!(queue.position(&b), Some(1));
    }

    #[test]
    fn unknown_id_has_no_position() {
        let queue = PendingQueue::new();
        assert_eq!(queue.position(&TaskId::now_v7()), None);
        assert!(queue.is_empty());
    }
}
