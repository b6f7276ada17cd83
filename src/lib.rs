//! # hypergon
//!
//! A small HTTP request pipeline for Rust services: error-returning handlers,
//! ordered middleware, route groups, and CSRF protection. Nothing more.
//!
//! ## The contract
//!
//! A handler returns `Result<impl IntoResponse, HttpError>`. Middleware wraps
//! handlers and can stop the chain by returning an `HttpError` of its own.
//! Nothing writes an error response except the dispatch boundary, so every
//! request gets exactly one response.
//!
//! What's here:
//!
//! - Radix-tree routing via [`matchit`], with `"METHOD /path"` patterns
//! - Middleware that runs in the order it was registered
//! - Groups: sub-routers at a path prefix, inheriting a snapshot of the
//!   parent's middleware
//! - Double-submit CSRF tokens ([`middleware::csrf`])
//! - Graceful shutdown, from code or on SIGTERM / Ctrl-C
//!
//! What's not: templating, sessions, dependency injection.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hypergon::{HttpError, Request, Response, Router, StatusCode};
//! use hypergon::middleware::{Csrf, CsrfToken};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = Router::new();
//!     app.with(Csrf::new())
//!         .action("GET /users/{id}", get_user)
//!         .action("POST /users", create_user);
//!
//!     Arc::new(app).start("0.0.0.0:3000").await.unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Result<Response, HttpError> {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Ok(Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes()))
//! }
//!
//! async fn create_user(req: Request) -> Result<Response, HttpError> {
//!     let name = req.form_value("name")
//!         .ok_or_else(|| HttpError::new(StatusCode::BAD_REQUEST, "name is required"))?;
//!     Ok(Response::builder()
//!         .status(StatusCode::CREATED)
//!         .header("location", "/users/99")
//!         .text(name.to_owned()))
//! }
//! ```

mod error;
mod request;
mod response;
mod router;
mod server;

pub mod handler;
pub mod middleware;
pub mod render;

pub use error::{Error, HttpError};
pub use handler::{serve_request, BoxedHandler, ErasedHandler, Handler, HandlerResult};
pub use http::{Method, StatusCode};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
