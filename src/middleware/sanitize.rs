//! Input sanitization.
//!
//! Escapes HTML metacharacters and trims surrounding whitespace in every
//! query-string value and every urlencoded form value before the handler
//! reads them. Raw bytes in [`Request::body`] are left alone.

use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::Middleware;
use crate::request::Request;

/// Returns the sanitizing middleware.
pub fn sanitize() -> Sanitize {
    Sanitize
}

/// Middleware returned by [`sanitize`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Sanitize;

impl Middleware for Sanitize {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(SanitizeLayer(next))
    }
}

struct SanitizeLayer(BoxedHandler);

impl ErasedHandler for SanitizeLayer {
    fn call(&self, mut req: Request) -> BoxFuture {
        sanitize_values(&mut req.query);
        // Only POST / PUT / PATCH bodies are ever decoded into `form`.
        sanitize_values(&mut req.form);
        self.0.call(req)
    }
}

/// HTML-escapes then trims each value in place. Keys are untouched.
pub fn sanitize_values(values: &mut [(String, String)]) {
    for (_, value) in values.iter_mut() {
        *value = escape_html(value).trim().to_owned();
    }
}

/// Escapes `& < > ' "`, the characters that can open markup or break out of
/// an attribute.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&'  => out.push_str("&amp;"),
            '<'  => out.push_str("&lt;"),
            '>'  => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"'  => out.push_str("&#34;"),
            _    => out.push(c),
        }
    }
    out
}
