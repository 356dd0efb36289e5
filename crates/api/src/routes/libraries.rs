use axum::routing::post;
use axum::Router;

use crate::handlers::libraries;
use crate::state::AppState;

/// Routes mounted at `/libraries`.
///
/// ```text
/// POST   /scaffold        -> scaffold_library
/// POST   /validate        -> validate_library
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scaffold", post(libraries::scaffold_library))
        .route("/validate", post(libraries::validate_library))
}
