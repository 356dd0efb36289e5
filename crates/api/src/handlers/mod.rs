pub mod filesystem;
pub mod libraries;
pub mod tasks;

use crate::error::{AppError, AppResult};

/// Run blocking filesystem work off the async executor.
pub(crate) async fn run_blocking<T, F>(work: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::InternalError(format!("Blocking task failed: {e}")))?
}
