//! Handlers for KiCad library scaffolding and inspection.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use partbridge_core::library::{self, ScaffoldRequest};
use serde::Deserialize;

use crate::error::AppResult;
use crate::handlers::run_blocking;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub path: String,
}

/// POST /api/v1/libraries/scaffold
///
/// Create the library directory and the selected empty assets. Returns 201.
pub async fn scaffold_library(
    payload: Result<Json<ScaffoldRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = payload?;
    let outcome = run_blocking(move || Ok(library::scaffold_library(&request)?)).await?;

    tracing::info!(
        prefix = %outcome.resolved_library_prefix,
        created = ?outcome.created,
        "Library scaffolded",
    );
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /api/v1/libraries/validate
pub async fn validate_library(
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(ValidateRequest { path }) = payload?;
    let report = run_blocking(move || Ok(library::inspect_library(&path)?)).await?;
    Ok(Json(report))
}
