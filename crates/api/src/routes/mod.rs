pub mod filesystem;
pub mod health;
pub mod libraries;
pub mod tasks;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /tasks                      list, create
/// /tasks/{id}                 detail
/// /ws/tasks/{id}              WebSocket snapshots for one task
///
/// /fs/roots                   filesystem shortcuts
/// /fs/list?path=              directory listing
/// /fs/check                   path check (POST)
///
/// /libraries/scaffold         create library skeleton (POST)
/// /libraries/validate         inspect library (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/tasks", tasks::router())
        .route("/ws/tasks/{id}", get(ws::task_updates_handler))
        .nest("/fs", filesystem::router())
        .nest("/libraries", libraries::router())
}
