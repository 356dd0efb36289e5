//! Start/stop control for the conversion worker.

use std::sync::Arc;

use partbridge_core::converter::Converter;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::TaskContext;
use crate::worker::Worker;

struct RunningWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the lifetime of the single [`Worker`].
///
/// `start` and `stop` are idempotent. `stop` is graceful: it returns only
/// after every submitted task, including ones submitted while stopping,
/// has reached a terminal state.
pub struct WorkerController {
    ctx: Arc<TaskContext>,
    converter: Arc<dyn Converter>,
    running: Mutex<Option<RunningWorker>>,
}

impl WorkerController {
    pub fn new(ctx: Arc<TaskContext>, converter: Arc<dyn Converter>) -> Self {
        Self {
            ctx,
            converter,
            running: Mutex::new(None),
        }
    }

    /// Spawn the worker. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let worker = Worker::new(Arc::clone(&self.ctx), Arc::clone(&self.converter));
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.run(cancel).await })
        };
        *running = Some(RunningWorker { cancel, handle });
        true
    }

    /// Drain the pending queue, then stop the worker.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(worker) = running.take() else {
            return;
        };

        let outstanding = self.ctx.outstanding();
        if outstanding > 0 {
            tracing::info!(outstanding, "Waiting for queued conversions to finish");
        }
        self.ctx.wait_idle().await;

        worker.cancel.cancel();
        if let Err(e) = worker.handle.await {
            tracing::error!(error = %e, "Conversion worker terminated abnormally");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}
