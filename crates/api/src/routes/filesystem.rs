use axum::routing::{get, post};
use axum::Router;

use crate::handlers::filesystem;
use crate::state::AppState;

/// Routes mounted at `/fs`.
///
/// ```text
/// GET    /roots           -> list_roots
/// GET    /list?path=      -> list_directory
/// POST   /check           -> check_path
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/roots", get(filesystem::list_roots))
        .route("/list", get(filesystem::list_directory))
        .route("/check", post(filesystem::check_path))
}
