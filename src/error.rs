//! Error types.
//!
//! Two kinds of failure live here and they never mix:
//!
//! - [`HttpError`] is a request failure. Handlers and middleware return it to
//!   stop the chain; the dispatch boundary renders it once as a status line and
//!   a plain-text body.
//! - [`Error`] is an infrastructure failure: binding a port, or misusing the
//!   server lifecycle. It goes back to whoever called `start` / `shutdown`.

use std::fmt;

use http::StatusCode;

use crate::response::{IntoResponse, Response};

// ── HttpError ────────────────────────────────────────────────────────────────

/// A request-level failure carrying the status code the client should see.
///
/// Stages never write an error response themselves. They return an
/// `HttpError` and the boundary ([`serve_request`](crate::serve_request))
/// renders it, so each failed request gets exactly one response.
///
/// ```rust
/// use hypergon::{HttpError, StatusCode};
///
/// let err = HttpError::new(StatusCode::NOT_FOUND, "no such user");
/// assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
/// assert_eq!(err.to_string(), "Status: 404, Message: no such user");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    headers: Vec<(String, String)>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), headers: Vec::new() }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Attaches a header to the rendered error response.
    ///
    /// Used when a stage has already committed to response metadata (CSRF
    /// cookies, `allow`, `location`) before the request failed.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    /// Like [`with_header`](HttpError::with_header), but replaces any value
    /// already attached under `name`.
    pub fn set_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.with_header(name, value)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status: {}, Message: {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for HttpError {}

/// Renders the error as `status` + the bare message as a `text/plain` body.
impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut builder = Response::builder()
            .status(self.status)
            .header("x-content-type-options", "nosniff");
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        builder.text(self.message)
    }
}

// ── Error ────────────────────────────────────────────────────────────────────

/// The error type returned by hypergon's fallible server operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// `shutdown` was called on a router that is not serving.
    #[error("server not running")]
    NotRunning,

    /// `start` / `serve` was called on a router that is not stopped.
    #[error("server already running")]
    AlreadyRunning,

    /// The shutdown deadline resolved before in-flight connections drained.
    #[error("shutdown deadline elapsed before connections drained")]
    ShutdownTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_message_as_body() {
        let res = HttpError::new(StatusCode::FORBIDDEN, "Invalid CSRF Token")
            .with_header("set-cookie", "a=b")
            .into_response();

        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.body(), b"Invalid CSRF Token");
        assert_eq!(res.header("set-cookie"), Some("a=b"));
        assert_eq!(res.header("x-content-type-options"), Some("nosniff"));
    }

    #[test]
    fn display_combines_status_and_message() {
        let err = HttpError::new(StatusCode::IM_A_TEAPOT, "short and stout");
        assert_eq!(err.to_string(), "Status: 418, Message: short and stout");
        assert_eq!(err.message(), "short and stout");
    }

    #[test]
    fn lifecycle_errors_are_readable() {
        assert_eq!(Error::NotRunning.to_string(), "server not running");
        assert_eq!(Error::AlreadyRunning.to_string(), "server already running");
    }
}
