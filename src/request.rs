//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE};
use http::{Extensions, HeaderMap, Method, Uri};

/// An incoming HTTP request with its body fully read.
///
/// Besides the wire data, a request carries **request-scoped state** in
/// [`extensions`](Request::extensions): a type-keyed map that lives exactly as
/// long as this request. Middleware stores values there under its own types
/// (the CSRF layer stores a [`CsrfToken`](crate::middleware::csrf::CsrfToken)),
/// so two independently written layers cannot clobber each other's keys.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) form: Vec<(String, String)>,
    pub(crate) extensions: Extensions,
}

impl Request {
    /// Builds a request from its `http` form, decoding the query string and,
    /// for `POST` / `PUT` / `PATCH` with an urlencoded body, the form fields.
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();

        let query = parts.uri.query()
            .map(|q| parse_pairs(q.as_bytes()))
            .unwrap_or_default();
        let form = if carries_form(&parts.method, &parts.headers) {
            parse_pairs(&body)
        } else {
            Vec::new()
        };

        Self {
            path: parts.uri.path().to_owned(),
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            query,
            form,
            extensions: parts.extensions,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn query(&self) -> &[(String, String)] { &self.query }
    pub fn form(&self) -> &[(String, String)] { &self.form }

    /// The path as seen by the current router.
    ///
    /// Inside a group mounted at `/api`, a request for `/api/users` reports
    /// `/users`. The untouched path is still available via [`uri`](Request::uri).
    pub fn path(&self) -> &str { &self.path }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// First query-string value for `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        first(&self.query, key)
    }

    /// First value for `key`, looking at the urlencoded body before the query
    /// string. Multipart bodies are not decoded.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        first(&self.form, key).or_else(|| first(&self.query, key))
    }

    /// Value of the first cookie named `name` across all `cookie` headers.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers.get_all(COOKIE).iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(cookie::Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|c| c.name() == name)
            .map(|c| c.value().to_owned())
    }

    /// Request-scoped state.
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Shorthand for `req.extensions().get::<T>()`.
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }
}

fn first<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn parse_pairs(raw: &[u8]) -> Vec<(String, String)> {
    form_urlencoded::parse(raw).into_owned().collect()
}

fn carries_form(method: &Method, headers: &HeaderMap) -> bool {
    if !matches!(*method, Method::POST | Method::PUT | Method::PATCH) {
        return false;
    }
    headers.get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
}
