//! Radix-tree request router with middleware and route groups.
//!
//! One tree per HTTP method plus one for method-less patterns. O(path-length)
//! lookup. Middleware is folded around each handler once, at registration,
//! so the request path does no list walking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::error::HttpError;
use crate::handler::{serve_request, BoxedHandler, Handler};
use crate::middleware::{BoxedMiddleware, Middleware};
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::server::Lifecycle;

/// The application router.
///
/// Built with `&mut self` calls during setup, then shared behind an [`Arc`]
/// for serving. Each registration returns `&mut Self` so calls chain:
///
/// ```rust
/// use hypergon::{HttpError, Request, Response, Router};
/// use hypergon::middleware::Csrf;
///
/// async fn index(_req: Request) -> Result<Response, HttpError> {
///     Ok(Response::text("home"))
/// }
///
/// let mut app = Router::new();
/// app.with(Csrf::new())
///     .action("GET /", index)
///     .action("POST /users/{id}", index);
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Endpoint>>,
    any: MatchitRouter<Endpoint>,
    groups: Vec<Group>,
    middleware: Vec<BoxedMiddleware>,
    pub(crate) lifecycle: Mutex<Lifecycle>,
}

struct Group {
    prefix: String,
    router: Router,
}

impl Group {
    /// The remainder of `path` below this group, starting with `/`.
    fn strip<'p>(&self, path: &'p str) -> Option<&'p str> {
        path.strip_prefix(self.prefix.as_str()).filter(|rest| rest.starts_with('/'))
    }
}

/// A composed handler as stored in a tree.
struct Endpoint {
    handler: BoxedHandler,
    /// Length of the literal text before the first parameter, for patterns
    /// ending in a `{*name}` catch-all.
    catch_all: Option<usize>,
}

impl Endpoint {
    fn new(pattern: &str, handler: BoxedHandler) -> Self {
        let catch_all = pattern.find('{').filter(|_| pattern.contains("{*"));
        Self { handler, catch_all }
    }

    /// A catch-all gives way to a group mounted below its literal prefix,
    /// so `/{*rest}` never shadows `/api/`.
    fn yields_to(&self, group: &Group) -> bool {
        self.catch_all.is_some_and(|literal| literal <= group.prefix.len())
    }
}

/// A resolved route: the composed handler plus what it should see.
struct Route {
    handler: BoxedHandler,
    params: HashMap<String, String>,
    path: String,
}

/// Why nothing matched.
#[derive(Debug, PartialEq)]
enum Miss {
    NotFound,
    MethodNotAllowed(Vec<Method>),
    /// The path named a group prefix without its trailing slash.
    TrailingSlash,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            any: MatchitRouter::new(),
            groups: Vec::new(),
            middleware: Vec::new(),
            lifecycle: Mutex::new(Lifecycle::Stopped),
        }
    }

    // ── Middleware ────────────────────────────────────────────────────────────

    /// Adds a middleware to every route registered after this call.
    ///
    /// Layers execute in registration order: the first one added sees the
    /// request first and the response last. Routes registered earlier are
    /// not affected.
    pub fn with(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Adds several middleware, in order. Same as calling [`with`](Router::with)
    /// for each.
    ///
    /// Mix different middleware types by passing `Arc<dyn Middleware>` values.
    pub fn chain<M: Middleware>(&mut self, middleware: impl IntoIterator<Item = M>) -> &mut Self {
        for mw in middleware {
            self.with(mw);
        }
        self
    }

    // ── Routes ────────────────────────────────────────────────────────────────

    /// Registers `handler` under `pattern`, wrapped in the current middleware.
    ///
    /// `pattern` is either a path (`"/users/{id}"`), matching every method, or
    /// a method and a path (`"DELETE /users/{id}"`). `{name}` captures one
    /// segment, `{*name}` the rest of the path.
    ///
    /// # Panics
    ///
    /// Panics on an unparsable method, an invalid path, or a path that
    /// conflicts with one already registered for the same method. Routes are
    /// set up once at startup, so these are programming errors.
    pub fn action(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        match pattern.split_once(' ') {
            Some((method, path)) => {
                let method = Method::from_bytes(method.as_bytes())
                    .unwrap_or_else(|e| panic!("invalid method in route `{pattern}`: {e}"));
                self.on(method, path.trim_start(), handler)
            }
            None => {
                let endpoint = Endpoint::new(pattern, self.compose(handler));
                insert(&mut self.any, pattern, endpoint);
                self
            }
        }
    }

    /// Registers `handler` for one method + path pair.
    pub fn on(&mut self, method: Method, path: &str, handler: impl Handler) -> &mut Self {
        let endpoint = Endpoint::new(path, self.compose(handler));
        insert(self.routes.entry(method).or_default(), path, endpoint);
        self
    }

    fn compose(&self, handler: impl Handler) -> BoxedHandler {
        self.middleware.iter()
            .rev()
            .fold(handler.into_boxed_handler(), |next, mw| mw.wrap(next))
    }

    // ── Groups ────────────────────────────────────────────────────────────────

    /// Mounts a child router at `prefix` and returns it for registration.
    ///
    /// The child starts with a copy of this router's middleware as it stands
    /// now; later [`with`](Router::with) calls here do not reach it. Its routes
    /// see request paths with `prefix` removed, so `/api/users` is registered
    /// on the `/api` group as `/users`.
    ///
    /// Routes on this router still win under `prefix`, except catch-alls
    /// such as `/{*rest}` whose literal part stops above it.
    ///
    /// ```rust
    /// use hypergon::{HttpError, Request, Response, Router};
    /// # async fn list(_req: Request) -> Result<Response, HttpError> { Ok(Response::text("")) }
    ///
    /// let mut app = Router::new();
    /// let v1 = app.group("/api").group("/v1");
    /// v1.action("GET /users", list); // GET /api/v1/users
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `prefix` does not start with `/` or is already mounted.
    pub fn group(&mut self, prefix: &str) -> &mut Router {
        let prefix = prefix.trim_end_matches('/');
        assert!(
            prefix.starts_with('/'),
            "group prefix `{prefix}` must start with `/` and not be the root",
        );
        assert!(
            self.groups.iter().all(|g| g.prefix != prefix),
            "group prefix `{prefix}` is already mounted",
        );

        let mut child = Router::new();
        child.middleware = self.middleware.clone();

        let idx = self.groups.len();
        self.groups.push(Group { prefix: prefix.to_owned(), router: child });
        &mut self.groups[idx].router
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Routes one request and produces its response.
    ///
    /// This is what the server calls per request; it is public so a router
    /// can be exercised without a socket.
    pub async fn handle(&self, req: http::Request<Bytes>) -> Response {
        let mut req = Request::from_http(req);

        match self.resolve(req.method(), req.path()) {
            Ok(route) => {
                req.path = route.path;
                req.params = route.params;
                serve_request(&route.handler, req).await
            }
            Err(miss) => miss_error(miss, &req).into_response(),
        }
    }

    /// Own routes win over groups, except catch-alls mounted above the group.
    fn resolve(&self, method: &Method, path: &str) -> Result<Route, Miss> {
        let group = self.groups.iter()
            .filter_map(|g| g.strip(path).map(|rest| (g, rest)))
            .max_by_key(|(g, _)| g.prefix.len());

        match (self.lookup(method, path), group) {
            (Some((endpoint, _)), Some((group, rest))) if endpoint.yields_to(group) => {
                group.router.resolve(method, rest)
            }
            (Some((endpoint, params)), _) => Ok(Route {
                handler: Arc::clone(&endpoint.handler),
                params,
                path: path.to_owned(),
            }),
            (None, Some((group, rest))) => group.router.resolve(method, rest),
            (None, None) => Err(self.miss(path)),
        }
    }

    fn miss(&self, path: &str) -> Miss {
        if self.groups.iter().any(|g| g.prefix == path) {
            return Miss::TrailingSlash;
        }

        let allowed = self.allowed_methods(path);
        if allowed.is_empty() {
            Miss::NotFound
        } else {
            Miss::MethodNotAllowed(allowed)
        }
    }

    /// Method tree first, `GET` for `HEAD`, then method-less patterns.
    fn lookup(&self, method: &Method, path: &str) -> Option<(&Endpoint, HashMap<String, String>)> {
        let in_tree = |m: &Method| self.routes.get(m).and_then(|tree| tree.at(path).ok());

        let matched = in_tree(method)
            .or_else(|| (*method == Method::HEAD).then(|| in_tree(&Method::GET)).flatten())
            .or_else(|| self.any.at(path).ok())?;

        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value, params))
    }

    fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut allowed: Vec<Method> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.clone())
            .collect();
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        allowed
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn insert(tree: &mut MatchitRouter<Endpoint>, path: &str, endpoint: Endpoint) {
    tree.insert(path, endpoint)
        .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
}

/// Routing failures travel as `HttpError`s like every other failure.
fn miss_error(miss: Miss, req: &Request) -> HttpError {
    match miss {
        Miss::NotFound => HttpError::new(StatusCode::NOT_FOUND, "404 page not found"),
        Miss::MethodNotAllowed(allowed) => {
            let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
            HttpError::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
                .with_header("allow", allow)
        }
        Miss::TrailingSlash => {
            let mut location = format!("{}/", req.uri().path());
            if let Some(query) = req.uri().query() {
                location.push('?');
                location.push_str(query);
            }
            HttpError::new(StatusCode::MOVED_PERMANENTLY, "Moved Permanently")
                .with_header("location", location)
        }
    }
}
