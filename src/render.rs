//! Body renderers.
//!
//! Thin helpers that turn data into a typed [`Response`]. Templating is out of
//! scope: `html` takes markup you have already produced.

use http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::error::HttpError;
use crate::response::{ContentType, Response};

/// Serializes `data` as a JSON body with the given status.
///
/// A value that cannot be serialized is a server bug, reported as a `500`.
///
/// ```rust
/// use hypergon::{render, HttpError, Request, Response, StatusCode};
///
/// async fn health(_req: Request) -> Result<Response, HttpError> {
///     render::json(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
/// }
/// ```
pub fn json<T: Serialize + ?Sized>(status: StatusCode, data: &T) -> Result<Response, HttpError> {
    let body = serde_json::to_vec(data).map_err(|e| {
        error!("json render failed: {e}");
        HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    })?;
    Ok(Response::builder().status(status).json(body))
}

/// Wraps ready-made markup as an HTML body with the given status.
pub fn html(status: StatusCode, markup: impl Into<String>) -> Response {
    Response::builder()
        .status(status)
        .bytes(ContentType::Html, markup.into().into_bytes())
}
