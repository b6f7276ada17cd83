//! Middleware layer.
//!
//! A middleware turns one handler into another. It is handed the next stage
//! as a [`BoxedHandler`] when a route is registered and returns the wrapped
//! stage. Per request it may:
//!
//! - pass the request on, possibly after stashing state in its extensions,
//! - post-process the response on the way back,
//! - short-circuit by returning an [`HttpError`](crate::HttpError) without
//!   calling `next` at all.
//!
//! Layers run in registration order: the first one passed to
//! [`Router::with`](crate::Router::with) sees the request first.
//!
//! Built-in middleware:
//! - [`csrf`]: double-submit CSRF protection
//! - [`sanitize`]: HTML-escapes and trims query and form values

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, HandlerResult};
use crate::request::Request;

pub mod csrf;
pub mod sanitize;

pub use csrf::{Csrf, CsrfToken};
pub use sanitize::sanitize;

/// Wraps a handler to add cross-cutting behaviour.
///
/// Implementations hold configuration only. Anything that belongs to one
/// request goes in that request's extensions.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

/// Shared middleware is middleware, which is how a router hands its list to
/// groups without cloning the layers themselves.
impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        (**self).wrap(next)
    }
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

// ── Next ──────────────────────────────────────────────────────────────────────

/// The remainder of the chain, as seen from a [`from_fn`] middleware.
pub struct Next(BoxedHandler);

impl Next {
    pub async fn run(self, req: Request) -> HandlerResult {
        self.0.call(req).await
    }
}

// ── from_fn ───────────────────────────────────────────────────────────────────

/// Builds a middleware from an async function of the request and the rest of
/// the chain.
///
/// ```rust
/// use hypergon::{HttpError, Request, Router, StatusCode, middleware::{self, Next}};
///
/// let mut app = Router::new();
/// app.with(middleware::from_fn(|req: Request, next: Next| async move {
///     if req.header("authorization").is_none() {
///         return Err(HttpError::new(StatusCode::UNAUTHORIZED, "login required"));
///     }
///     next.run(req).await
/// }));
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FromFn(Arc::new(f))
}

/// Middleware returned by [`from_fn`].
pub struct FromFn<F>(Arc<F>);

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(FromFnLayer { f: Arc::clone(&self.0), next })
    }
}

struct FromFnLayer<F> {
    f: Arc<F>,
    next: BoxedHandler,
}

impl<F, Fut> ErasedHandler for FromFnLayer<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        Box::pin((self.f)(req, Next(Arc::clone(&self.next))))
    }
}

// ── wrap_fn ───────────────────────────────────────────────────────────────────

/// Builds a middleware from a plain `handler -> handler` function.
pub fn wrap_fn<F>(f: F) -> WrapFn<F>
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    WrapFn(f)
}

/// Middleware returned by [`wrap_fn`].
pub struct WrapFn<F>(F);

impl<F> Middleware for WrapFn<F>
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        (self.0)(next)
    }
}
