//! Fan-out of task snapshots to per-task observers.
//!
//! Observers register for one task id and receive [`TaskSummary`]
//! snapshots over an unbounded channel: first the state at registration
//! time, then one snapshot after every change announced on the
//! [`EventBus`](partbridge_events::EventBus). A slow observer never holds
//! up the worker; its channel simply grows.

use std::collections::HashMap;
use std::sync::Arc;

use partbridge_core::error::CoreResult;
use partbridge_core::task::TaskSummary;
use partbridge_core::types::TaskId;
use partbridge_events::TaskEvent;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::TaskContext;

/// Identifier of one registered observer, unique per service.
pub type SubscriberId = u64;

/// Channel sender half for pushing snapshots to one observer.
pub type SnapshotSender = mpsc::UnboundedSender<TaskSummary>;

// ---------------------------------------------------------------------------
// Subscriber table
// ---------------------------------------------------------------------------

/// Observers grouped by the task they watch.
///
/// Lives inside the context's shared state so that registering an
/// observer and reading the task's snapshot happen under one guard.
#[derive(Default)]
pub(crate) struct SubscriberTable {
    next_id: SubscriberId,
    by_task: HashMap<TaskId, HashMap<SubscriberId, SnapshotSender>>,
}

impl SubscriberTable {
    pub(crate) fn insert(&mut self, task_id: TaskId, sender: SnapshotSender) -> SubscriberId {
        self.next_id += 1;
        let id = self.next_id;
        self.by_task.entry(task_id).or_default().insert(id, sender);
        id
    }

    /// Remove one observer. Returns `false` if it was not registered.
    pub(crate) fn remove(&mut self, task_id: &TaskId, subscriber_id: SubscriberId) -> bool {
        let Some(subscribers) = self.by_task.get_mut(task_id) else {
            return false;
        };
        let removed = subscribers.remove(&subscriber_id).is_some();
        if subscribers.is_empty() {
            self.by_task.remove(task_id);
        }
        removed
    }

    pub(crate) fn senders(&self, task_id: &TaskId) -> Vec<(SubscriberId, SnapshotSender)> {
        self.by_task
            .get(task_id)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .map(|(id, sender)| (*id, sender.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn subscribed_tasks(&self) -> Vec<TaskId> {
        self.by_task.keys().copied().collect()
    }

    pub(crate) fn count(&self) -> usize {
        self.by_task.values().map(HashMap::len).sum()
    }

    /// Drop every sender, closing all observer channels.
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.count();
        self.by_task.clear();
        count
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A registered observer of one task.
///
/// The receiver yields `None` once the broadcaster closes all observers
/// during shutdown.
#[derive(Debug)]
pub struct Subscription {
    pub task_id: TaskId,
    pub subscriber_id: SubscriberId,
    pub receiver: mpsc::UnboundedReceiver<TaskSummary>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<TaskSummary> {
        self.receiver.recv().await
    }
}

// ---------------------------------------------------------------------------
// Broadcaster
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Broadcaster {
    ctx: Arc<TaskContext>,
}

impl Broadcaster {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }

    /// Register an observer for `task_id`.
    ///
    /// The current snapshot is queued on the new channel before the
    /// observer becomes visible to [`publish`](Self::publish), so the first
    /// message is always the state at registration time.
    pub async fn subscribe(&self, task_id: TaskId) -> CoreResult<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscriber_id = {
            let mut state = self.ctx.lock().await;
            let snapshot = state.summary(&task_id)?;
            let _ = sender.send(snapshot);
            state.subscribers.insert(task_id, sender)
        };

        tracing::debug!(task_id = %task_id, subscriber_id, "Observer subscribed");
        Ok(Subscription {
            task_id,
            subscriber_id,
            receiver,
        })
    }

    /// Remove an observer. Unknown or already removed ids are ignored.
    pub async fn unsubscribe(&self, task_id: &TaskId, subscriber_id: SubscriberId) {
        let removed = self
            .ctx
            .lock()
            .await
            .subscribers
            .remove(task_id, subscriber_id);
        if removed {
            tracing::debug!(task_id = %task_id, subscriber_id, "Observer unsubscribed");
        }
    }

    /// Send the current snapshot of `task_id` to each of its observers.
    ///
    /// Observers whose receiving side is gone are pruned. Returns the number
    /// of observers that received the snapshot.
    pub async fn publish(&self, task_id: &TaskId) -> usize {
        let (snapshot, senders) = {
            let state = self.ctx.lock().await;
            let senders = state.subscribers.senders(task_id);
            if senders.is_empty() {
                return 0;
            }
            match state.summary(task_id) {
                Ok(snapshot) => (snapshot, senders),
                Err(_) => return 0,
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (subscriber_id, sender) in senders {
            if sender.send(snapshot.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(subscriber_id);
            }
        }

        if !closed.is_empty() {
            let mut state = self.ctx.lock().await;
            for subscriber_id in &closed {
                state.subscribers.remove(task_id, *subscriber_id);
            }
            tracing::debug!(task_id = %task_id, pruned = closed.len(), "Pruned closed observers");
        }

        delivered
    }

    /// Re-send the snapshot of every task that has observers.
    pub async fn publish_all_subscribed(&self) {
        let tasks = self.ctx.lock().await.subscribers.subscribed_tasks();
        for task_id in tasks {
            self.publish(&task_id).await;
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.ctx.lock().await.subscribers.count()
    }

    /// Close every observer channel. Used once during shutdown.
    pub async fn close_all(&self) -> usize {
        let count = self.ctx.lock().await.subscribers.clear();
        tracing::info!(count, "Closed all task observers");
        count
    }

    /// Start forwarding change events until `cancel` fires.
    ///
    /// The bus receiver is created before this returns, so no event
    /// published after `spawn` is missed.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let receiver = self.ctx.events().subscribe();
        tokio::spawn(async move { self.run(receiver, cancel).await })
    }

    /// Forwarding loop.
    ///
    /// On cancellation the events already buffered are still forwarded
    /// before the loop exits.
    pub async fn run(&self, mut receiver: broadcast::Receiver<TaskEvent>, cancel: CancellationToken) {
        tracing::info!("Task broadcaster started");
        loop {
            tokio::select! {
                biased;
                result = receiver.recv() => match result {
                    Ok(event) => {
                        self.publish(&event.task_id).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Task broadcaster lagged, resending all snapshots");
                        self.publish_all_subscribed().await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Event bus closed, task broadcaster shutting down");
                        return;
                    }
                },
                _ = cancel.cancelled() => break,
            }
        }

        loop {
            match receiver.try_recv() {
                Ok(event) => {
                    self.publish(&event.task_id).await;
                }
                Err(TryRecvError::Lagged(_)) => self.publish_all_subscribed().await,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        tracing::info!("Task broadcaster stopped");
    }
}
