use std::sync::Arc;

use partbridge_engine::{Broadcaster, TaskContext, WorkerController};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc` or is a handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Task registry and pending queue.
    pub tasks: Arc<TaskContext>,
    /// Pushes task snapshots to WebSocket observers.
    pub broadcaster: Broadcaster,
    /// Controls the conversion worker.
    pub workers: Arc<WorkerController>,
}
