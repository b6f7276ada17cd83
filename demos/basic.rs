//! Minimal hypergon example: a CSRF-protected form and a JSON API group.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -i -c jar http://localhost:3000/
//!   curl -i -b jar -X POST http://localhost:3000/notes -d 'text=hi'          # 403
//!   curl -i -b jar -X POST http://localhost:3000/notes \
//!        -H "x-csrf-token: $(awk '/csrf_token_js/ {print $7}' jar)" -d 'text=hi'
//!   curl http://localhost:3000/api/users/42

use std::sync::Arc;

use hypergon::middleware::{self, Csrf, CsrfToken};
use hypergon::{render, HttpError, Request, Response, Router, StatusCode};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut app = Router::new();
    app.with(middleware::sanitize());

    // JSON API: no CSRF, its clients send no cookies.
    app.group("/api").action("GET /users/{id}", get_user);

    app.with(Csrf::new())
        .action("GET /", form)
        .action("POST /notes", create_note);

    // Serves until Ctrl-C / SIGTERM, then drains in-flight requests.
    Arc::new(app)
        .start(":3000")
        .await
        .expect("server error");
}

// GET /  → a form carrying the token in a hidden field
async fn form(req: Request) -> Result<Response, HttpError> {
    let token = req.extension::<CsrfToken>()
        .ok_or_else(|| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, "csrf not installed"))?;

    Ok(render::html(StatusCode::OK, format!(
        r#"<form method="post" action="/notes">
  <input type="hidden" name="{}" value="{}">
  <input name="text"><button>save</button>
</form>"#,
        token.field(),
        token.value(),
    )))
}

// POST /notes  → only reached with a valid token
async fn create_note(req: Request) -> Result<Response, HttpError> {
    let text = req.form_value("text")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| HttpError::new(StatusCode::UNPROCESSABLE_ENTITY, "text is required"))?;

    render::json(StatusCode::CREATED, &serde_json::json!({ "text": text }))
}

// GET /api/users/{id}
async fn get_user(req: Request) -> Result<Response, HttpError> {
    let id = req.param("id").unwrap_or("unknown");
    render::json(StatusCode::OK, &serde_json::json!({ "id": id, "name": "alice" }))
}
