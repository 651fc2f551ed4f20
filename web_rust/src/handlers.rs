use anyhow::Context;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde_json::{value::RawValue, Value};
use std::sync::Arc;
use tokio::fs;

use crate::models::AppState;
use crate::upload::{self, UploadError};
use crate::worker::DispatchError;

/// Body sent for every rejected upload
pub const INVALID_UPLOAD_MESSAGE: &str = "No file uploaded or invalid file";

/// Serve the landing page from the static directory
pub async fn root(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    let path = state.static_dir.join("index.html");
    let page = fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Html(page))
}

/// Accept one image, run the OCR worker on it and relay the worker's JSON
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Box<RawValue>>, AppError> {
    let mut multipart =
        multipart.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let stored = upload::receive_image(&mut multipart, &state.uploads_dir).await?;

    // Dispatch and cleanup run on their own task so a dropped request still
    // waits for the worker and then removes the file.
    let dispatch = tokio::spawn(async move {
        tracing::info!(
            original = %stored.original_name,
            mime = %stored.mime_type,
            size = stored.size,
            "Dispatching upload to OCR worker"
        );
        let result = state
            .worker
            .dispatch(
                &stored.path,
                &state.hyperbolic_api_key,
                &state.openrouter_api_key,
            )
            .await;

        // Fire and forget; the response does not wait on the unlink.
        stored.discard();
        result
    });

    let result = dispatch.await.context("OCR dispatch task failed")?;
    translate(result)
}

/// Map a dispatch outcome to the response; the exit status and an `error` key both count as failure
pub fn translate(
    result: Result<Box<RawValue>, DispatchError>,
) -> Result<Json<Box<RawValue>>, AppError> {
    let raw = result?;

    let value: Value = serde_json::from_str(raw.get()).map_err(DispatchError::from)?;
    if let Some(reported) = value.get("error") {
        let message = match reported {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return Err(AppError::WorkerReported(message));
    }

    Ok(Json(raw))
}

/// 404 for any path with a dot-prefixed segment, so `.env` is never served
pub async fn reject_hidden(request: Request, next: Next) -> Response {
    let hidden = request.uri().path().split('/').any(|segment| {
        segment.starts_with('.')
            || segment
                .get(..3)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("%2e"))
    });

    if hidden {
        tracing::debug!(path = %request.uri().path(), "Refused hidden path");
        return StatusCode::NOT_FOUND.into_response();
    }

    next.run(request).await
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// Upload rejected; the reason is logged, the client gets a fixed message
    BadRequest(String),
    /// The worker exited 0 but its JSON carried an `error` field
    WorkerReported(String),
    Dispatch(DispatchError),
    InternalError(anyhow::Error),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalError(err)
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        if err.is_client_error() {
            AppError::BadRequest(err.to_string())
        } else {
            AppError::InternalError(err.into())
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        AppError::Dispatch(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(reason) => {
                tracing::info!(reason = %reason, "Rejected upload");
                (StatusCode::BAD_REQUEST, INVALID_UPLOAD_MESSAGE.to_string())
            }
            AppError::WorkerReported(message) => {
                tracing::error!(error = %message, "OCR worker reported an error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
            AppError::Dispatch(err) => {
                match &err {
                    DispatchError::Launch(e) => {
                        tracing::error!(error = %e, "Could not start OCR worker")
                    }
                    DispatchError::Failed { code, stderr } => {
                        tracing::error!(?code, stderr = %stderr, "OCR worker failed")
                    }
                    DispatchError::MalformedOutput(e) => {
                        tracing::error!(error = %e, "OCR worker printed invalid JSON")
                    }
                }
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            AppError::InternalError(err) => {
                tracing::error!("Internal error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
            }
        };

        (status, message).into_response()
    }
}
