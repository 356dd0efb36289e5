//! Service assembly: wires the engine together and tears it down in order.

use std::sync::Arc;

use partbridge_core::converter::Converter;
use partbridge_engine::{Broadcaster, TaskContext, WorkerController};
use partbridge_events::EventBus;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Running engine services behind one [`AppState`].
pub struct Services {
    pub state: AppState,
    broadcaster_cancel: CancellationToken,
    broadcaster_handle: JoinHandle<()>,
}

impl Services {
    /// Create the task context, start the broadcaster and the worker.
    pub async fn start(config: ServerConfig, converter: Arc<dyn Converter>) -> Self {
        let events = Arc::new(EventBus::new(config.event_bus_capacity));
        let tasks = Arc::new(TaskContext::new(events));

        let broadcaster = Broadcaster::new(Arc::clone(&tasks));
        let broadcaster_cancel = CancellationToken::new();
        let broadcaster_handle = broadcaster.clone().spawn(broadcaster_cancel.clone());

        let workers = Arc::new(WorkerController::new(Arc::clone(&tasks), converter));
        workers.start().await;
        tracing::info!("Task engine started");

        Self {
            state: AppState {
                config: Arc::new(config),
                tasks,
                broadcaster,
                workers,
            },
            broadcaster_cancel,
            broadcaster_handle,
        }
    }

    /// Drain and stop everything.
    ///
    /// Runs after the HTTP server has stopped accepting requests: the
    /// worker finishes every pending task, the broadcaster forwards the
    /// remaining changes, then all observers are closed.
    pub async fn shutdown(self) {
        let pending = self.state.tasks.outstanding();
        tracing::info!(pending, "Stopping conversion worker");
        self.state.workers.stop().await;
        tracing::info!("Conversion worker stopped");

        self.broadcaster_cancel.cancel();
        if let Err(e) = self.broadcaster_handle.await {
            tracing::error!(error = %e, "Task broadcaster terminated abnormally");
        }

        let observers = self.state.broadcaster.close_all().await;
        tracing::info!(observers, "Task observers closed");
    }
}
