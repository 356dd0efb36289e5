//! Handlers for the directory picker (`/fs`).

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::response::IntoResponse;
use axum::Json;
use partbridge_core::fs_browse;
use serde::Deserialize;

use crate::error::AppResult;
use crate::handlers::run_blocking;

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct PathRequest {
    pub path: String,
}

/// GET /api/v1/fs/roots
pub async fn list_roots() -> AppResult<impl IntoResponse> {
    let roots = run_blocking(|| Ok(fs_browse::roots())).await?;
    Ok(Json(roots))
}

/// GET /api/v1/fs/list?path=
///
/// 404 if the path does not exist, 400 if it is not a directory, 403 if
/// it cannot be read.
pub async fn list_directory(
    query: Result<Query<PathQuery>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let Query(PathQuery { path }) = query?;
    let listing = run_blocking(move || Ok(fs_browse::list_directory(&path)?)).await?;
    Ok(Json(listing))
}

/// POST /api/v1/fs/check
pub async fn check_path(
    payload: Result<Json<PathRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(PathRequest { path }) = payload?;
    let check = run_blocking(move || Ok(fs_browse::check_path(&path))).await?;
    Ok(Json(check))
}
