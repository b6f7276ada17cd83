//! Double-submit CSRF protection.
//!
//! The first response to a browser without a token carries two cookies with
//! the same random value:
//!
//! | Cookie | Flags | Read by |
//! |---|---|---|
//! | `csrf_token` | HttpOnly, Secure, SameSite=Strict | the server only |
//! | `csrf_token_js` | Secure, SameSite=Strict | page scripts |
//!
//! Every request that is not `GET` or `HEAD` must echo the value back, either
//! as a form field named after the configured key or in an `X-CSRF-Token`
//! header. A cross-site form can make the browser send the cookie but cannot
//! read it, so it cannot echo it. No server-side session store is involved.
//!
//! Handlers find the current token in the request extensions:
//!
//! ```rust
//! use hypergon::{HttpError, Request, Response};
//! use hypergon::middleware::CsrfToken;
//!
//! async fn form(req: Request) -> Result<Response, HttpError> {
//!     let token = req.extension::<CsrfToken>().map(CsrfToken::value).unwrap_or_default();
//!     Ok(Response::text(format!(r#"<input type="hidden" name="csrf_token" value="{token}">"#)))
//! }
//! ```

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use cookie::{Cookie, SameSite};
use http::{Method, StatusCode};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use crate::error::HttpError;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;

/// Cookie holding the authoritative token.
pub const COOKIE_NAME: &str = "csrf_token";
/// Script-readable copy of the token.
pub const JS_COOKIE_NAME: &str = "csrf_token_js";
/// Header a client may use instead of a form field.
pub const HEADER_NAME: &str = "x-csrf-token";
/// Default request key and form field name.
pub const DEFAULT_KEY: &str = "csrf_token";

const CACHE_CONTROL: &str = "no-store, no-cache, must-revalidate, max-age=0";
const REJECTION: &str = "Invalid CSRF Token";
const TOKEN_BYTES: usize = 32;

// ── Configuration ─────────────────────────────────────────────────────────────

/// CSRF middleware. Install with [`Router::with`](crate::Router::with).
#[derive(Clone, Debug)]
pub struct Csrf {
    key: Arc<str>,
}

impl Csrf {
    /// Uses `csrf_token` as the form field name.
    pub fn new() -> Self {
        Self::with_key(DEFAULT_KEY)
    }

    /// Uses `key` as the form field name the token is read from.
    pub fn with_key(key: impl Into<String>) -> Self {
        Self { key: Arc::from(key.into()) }
    }

    pub fn key(&self) -> &str { &self.key }
}

impl Default for Csrf {
    fn default() -> Self { Self::new() }
}

impl Middleware for Csrf {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(CsrfLayer { key: Arc::clone(&self.key), next })
    }
}

// ── Request-scoped token ──────────────────────────────────────────────────────

/// The token bound to the current request, stored in its extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsrfToken {
    key: Arc<str>,
    value: String,
}

impl CsrfToken {
    /// The token itself.
    pub fn value(&self) -> &str { &self.value }

    /// Form field name the middleware reads the token from.
    pub fn field(&self) -> &str { &self.key }
}

// ── Layer ─────────────────────────────────────────────────────────────────────

struct CsrfLayer {
    key: Arc<str>,
    next: BoxedHandler,
}

impl ErasedHandler for CsrfLayer {
    fn call(&self, mut req: Request) -> BoxFuture {
        let (token, issued) = match req.cookie(COOKIE_NAME).filter(|v| !v.is_empty()) {
            Some(existing) => (existing, false),
            None => (generate_token(), true),
        };

        let rejected = !is_safe(req.method()) && !submitted_matches(&req, &self.key, &token);
        if rejected {
            debug!(method = %req.method(), path = %req.path(), "csrf token mismatch");
        }

        req.extensions_mut().insert(CsrfToken { key: Arc::clone(&self.key), value: token.clone() });
        let next = Arc::clone(&self.next);

        Box::pin(async move {
            let outcome = if rejected {
                Err(HttpError::new(StatusCode::FORBIDDEN, REJECTION))
            } else {
                next.call(req).await
            };

            if !issued {
                return outcome;
            }
            debug!("issued csrf token");
            match outcome {
                Ok(mut res) => {
                    attach(&mut res, &token);
                    Ok(res)
                }
                Err(err) => Err(token_cookies(&token)
                    .into_iter()
                    .fold(err.set_header("cache-control", CACHE_CONTROL), |err, cookie| {
                        err.with_header("set-cookie", cookie)
                    })),
            }
        })
    }
}

fn is_safe(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

fn submitted_matches(req: &Request, key: &str, token: &str) -> bool {
    req.form_value(key) == Some(token) || req.header(HEADER_NAME) == Some(token)
}

/// The no-store directive replaces whatever caching the handler asked for.
fn attach(res: &mut Response, token: &str) {
    res.set_header("cache-control", CACHE_CONTROL);
    for cookie in token_cookies(token) {
        res.append_header("set-cookie", cookie);
    }
}

fn token_cookies(token: &str) -> [String; 2] {
    [
        token_cookie(COOKIE_NAME, token, true),
        token_cookie(JS_COOKIE_NAME, token, false),
    ]
}

fn token_cookie(name: &'static str, token: &str, http_only: bool) -> String {
    Cookie::build((name, token.to_owned()))
        .path("/")
        .http_only(http_only)
        .secure(true)
        .same_site(SameSite::Strict)
        .build()
        .to_string()
}

/// 256 bits from the OS generator, standard base64.
///
/// # Panics
///
/// Panics if the OS cannot supply randomness. A predictable token is worse
/// than no server.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    general_purpose::STANDARD.encode(bytes)
}
