//! Handler trait, type erasure, and the error-rendering boundary.
//!
//! # The handler contract
//!
//! A handler takes a [`Request`] and returns `Result<impl IntoResponse, HttpError>`.
//! `Err` is the only way a stage signals failure: nothing in the pipeline
//! writes an error response directly. [`serve_request`] is the one place that
//! turns an `HttpError` into bytes.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of different concrete types in one tree, so each
//! is erased behind `dyn ErasedHandler`:
//!
//! ```text
//! async fn hello(req: Request) -> Result<Response, HttpError> { … }
//!        ↓ router.action("/", hello)
//! hello.into_boxed_handler()                  ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                  ← stored as BoxedHandler
//!        ↓ middleware.wrap(next)              ← one layer per middleware
//! handler.call(req) at request time           ← one vtable dispatch per layer
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::HttpError;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Erased types ──────────────────────────────────────────────────────────────

/// What every stage of the pipeline produces.
pub type HandlerResult = Result<Response, HttpError>;

/// A heap-allocated, type-erased future resolving to a [`HandlerResult`].
///
/// `Send + 'static` so tokio can move it across worker threads.
pub type BoxFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// Future returned by handlers converted with [`into_plain`].
pub type PlainFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Object-safe dispatch interface shared by route handlers and middleware
/// layers.
///
/// Implement this when writing a middleware layer by hand; see
/// [`Middleware`](crate::middleware::Middleware).
pub trait ErasedHandler: Send + Sync {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// Automatically satisfied by any `async fn` (or closure returning a future)
/// with the signature:
///
/// ```text
/// async fn name(req: Request) -> Result<impl IntoResponse, HttpError>
/// ```
///
/// Sealed: only the blanket impl below can satisfy it. Handlers that never
/// fail go through [`plain`].
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HttpError>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HttpError>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype bridging a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, HttpError>> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.map(IntoResponse::into_response) })
    }
}

// ── Boundary ──────────────────────────────────────────────────────────────────

/// Runs `handler` and produces the final response.
///
/// An `Err` is rendered as its status code with the message as a plain-text
/// body. There are no retries: a failed handler is final for this request.
pub async fn serve_request(handler: &BoxedHandler, req: Request) -> Response {
    match handler.call(req).await {
        Ok(res) => res,
        Err(err) => err.into_response(),
    }
}

// ── Adapters ──────────────────────────────────────────────────────────────────

/// Lifts a plain handler, one that cannot fail, into the handler contract.
///
/// ```rust
/// use hypergon::{Request, Response, Router, handler};
///
/// async fn liveness(_req: Request) -> Response {
///     Response::text("ok")
/// }
///
/// let mut app = Router::new();
/// app.action("GET /healthz", handler::plain(liveness));
/// ```
pub fn plain<F, Fut, R>(f: F) -> impl Handler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    move |req: Request| {
        let fut = f(req);
        async move { Ok::<R, HttpError>(fut.await) }
    }
}

/// Lowers a contract handler into a plain `Request -> Response` function,
/// rendering any error with its own status code.
pub fn into_plain(handler: impl Handler) -> impl Fn(Request) -> PlainFuture + Send + Sync + 'static {
    let handler = handler.into_boxed_handler();
    move |req: Request| -> PlainFuture {
        let fut = handler.call(req);
        Box::pin(async move { fut.await.unwrap_or_else(IntoResponse::into_response) })
    }
}
