//! Double-submit CSRF protection behind a real router.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use hypergon::middleware::{Csrf, CsrfToken};
use hypergon::{HttpError, Request, Response, Router, StatusCode};

const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// A router with one CSRF-protected route that counts its invocations and
/// echoes the token it was handed.
fn app() -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut app = Router::new();
    app.with(Csrf::new()).action("/form", move |req: Request| {
        counter.fetch_add(1, Ordering::SeqCst);
        let token = req.extension::<CsrfToken>().map(|t| t.value().to_owned());
        async move {
            let token = token.ok_or_else(|| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, "no token"))?;
            Ok::<_, HttpError>(Response::text(token))
        }
    });
    (app, calls)
}

/// `name=value` pairs from the response's `set-cookie` headers.
fn set_cookies(res: &Response) -> Vec<(String, String)> {
    res.header_values("set-cookie")
        .filter_map(|raw| raw.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect()
}

fn fresh_get() -> http::Request<Bytes> {
    http::Request::get("/form").body(Bytes::new()).unwrap()
}

#[tokio::test]
async fn first_visit_issues_matching_cookies() {
    let (app, calls) = app();
    let res = app.handle(fresh_get()).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.header("cache-control"), Some(NO_CACHE));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let cookies = set_cookies(&res);
    assert_eq!(cookies.len(), 2);
    assert_eq!(cookies[0].0, "csrf_token");
    assert_eq!(cookies[1].0, "csrf_token_js");
    assert_eq!(cookies[0].1, cookies[1].1);

    // The handler saw the same token the browser was given.
    assert_eq!(res.body(), cookies[0].1.as_bytes());

    let flags: Vec<_> = res.header_values("set-cookie").collect();
    assert!(flags[0].contains("HttpOnly") && flags[0].contains("SameSite=Strict"));
    assert!(!flags[1].contains("HttpOnly") && flags[1].contains("Secure"));
}

#[tokio::test]
async fn tokens_are_32_bytes_and_distinct_per_session() {
    let (app, _) = app();
    let mut seen = HashSet::new();

    for _ in 0..16 {
        let res = app.handle(fresh_get()).await;
        let token = String::from_utf8(res.body().to_vec()).unwrap();
        let raw = general_purpose::STANDARD.decode(&token).unwrap();
        assert_eq!(raw.len(), 32);
        seen.insert(token);
    }
    assert_eq!(seen.len(), 16);
}

#[tokio::test]
async fn existing_cookie_is_reused_without_reissuing() {
    let (app, _) = app();
    let req = http::Request::get("/form")
        .header("cookie", "csrf_token=kept-token")
        .body(Bytes::new())
        .unwrap();

    let res = app.handle(req).await;
    assert_eq!(res.body(), b"kept-token");
    assert_eq!(res.header("set-cookie"), None);
    assert_eq!(res.header("cache-control"), None);
}

#[tokio::test]
async fn post_with_matching_header_reaches_the_handler() {
    let (app, calls) = app();
    let req = http::Request::post("/form")
        .header("cookie", "csrf_token=abc123")
        .header("x-csrf-token", "abc123")
        .body(Bytes::new())
        .unwrap();

    let res = app.handle(req).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.header("set-cookie"), None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn post_with_matching_form_field_reaches_the_handler() {
    let (app, calls) = app();
    let req = http::Request::post("/form")
        .header("cookie", "csrf_token=abc123")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Bytes::from_static(b"title=hi&csrf_token=abc123"))
        .unwrap();

    assert_eq!(app.handle(req).await.status_code(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn post_with_wrong_form_field_is_rejected_before_the_handler() {
    let (app, calls) = app();
    let req = http::Request::post("/form")
        .header("cookie", "csrf_token=abc123")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Bytes::from_static(b"csrf_token=forged"))
        .unwrap();

    let res = app.handle(req).await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(res.body(), b"Invalid CSRF Token");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn every_unsafe_method_needs_a_token() {
    let (app, calls) = app();
    for method in ["POST", "PUT", "PATCH", "DELETE", "OPTIONS"] {
        let req = http::Request::builder()
            .method(method)
            .uri("/form")
            .header("cookie", "csrf_token=abc123")
            .body(Bytes::new())
            .unwrap();
        assert_eq!(app.handle(req).await.status_code(), StatusCode::FORBIDDEN, "{method}");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let head = http::Request::head("/form")
        .header("cookie", "csrf_token=abc123")
        .body(Bytes::new())
        .unwrap();
    assert_eq!(app.handle(head).await.status_code(), StatusCode::OK);
}
