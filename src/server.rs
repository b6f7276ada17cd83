//! Server lifecycle and graceful shutdown.
//!
//! A [`Router`] serves itself. Setup happens through `&mut self`; serving
//! needs the router behind an [`Arc`] so connection tasks can share it:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use hypergon::Router;
//!
//! # async fn run() -> Result<(), hypergon::Error> {
//! let app = Arc::new(Router::new());
//! let server = tokio::spawn(Arc::clone(&app).start(":8000"));
//!
//! // later, from anywhere holding the Arc:
//! app.shutdown(tokio::time::sleep(Duration::from_secs(30))).await?;
//! # let _ = server.await;
//! # Ok(())
//! # }
//! ```
//!
//! # States
//!
//! ```text
//! Stopped ──start──▶ Starting ──bound──▶ Running ──shutdown──▶ Stopping ──drained──▶ Stopped
//! ```
//!
//! `start` on anything but `Stopped` fails with [`Error::AlreadyRunning`], so one
//! router never owns two listeners. `shutdown` on anything but `Running`
//! fails with [`Error::NotRunning`].
//!
//! # Draining
//!
//! On `shutdown`, SIGTERM, or Ctrl-C the server:
//! 1. stops calling `listener.accept()`,
//! 2. asks every open connection to finish its current request and close,
//! 3. returns from `start` once every connection task has ended.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

use crate::error::{Error, HttpError};
use crate::response::IntoResponse;
use crate::router::Router;

// ── Lifecycle ─────────────────────────────────────────────────────────────────

pub(crate) enum Lifecycle {
    Stopped,
    Starting,
    Running(Running),
    Stopping,
}

pub(crate) struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    drained: watch::Receiver<bool>,
}

/// Returns the lifecycle to `Stopped` when serving ends early: a failed bind,
/// an error before `Running`, or the `start` future being dropped.
///
/// A clean exit from the accept loop has already stored `Stopped` and may
/// have let a new `start` in, so it disarms the guard instead.
struct StoppedOnDrop<'a> {
    state: &'a Mutex<Lifecycle>,
    armed: bool,
}

impl<'a> StoppedOnDrop<'a> {
    fn new(state: &'a Mutex<Lifecycle>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StoppedOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            *lock(self.state) = Lifecycle::Stopped;
        }
    }
}

fn lock(state: &Mutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Router {
    /// Binds `addr` and serves until shut down.
    ///
    /// `addr` is `host:port`; a bare `:port` listens on every interface.
    pub async fn start(self: Arc<Self>, addr: &str) -> Result<(), Error> {
        self.begin()?;
        let guard = StoppedOnDrop::new(&self.lifecycle);

        let listener = TcpListener::bind(normalize(addr)).await?;
        Arc::clone(&self).accept_loop(listener).await?;
        guard.disarm();
        Ok(())
    }

    /// Serves on an already-bound listener until shut down.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), Error> {
        self.begin()?;
        let guard = StoppedOnDrop::new(&self.lifecycle);

        Arc::clone(&self).accept_loop(listener).await?;
        guard.disarm();
        Ok(())
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*lock(&self.lifecycle) {
            Lifecycle::Running(running) => Some(running.addr),
            _ => None,
        }
    }

    /// Stops a running server and waits for in-flight connections.
    ///
    /// Returns [`Error::NotRunning`] if the router is not serving, and
    /// [`Error::ShutdownTimeout`] if `deadline` resolves first. In the latter
    /// case draining carries on and `start` still returns once it completes.
    pub async fn shutdown(&self, deadline: impl Future<Output = ()>) -> Result<(), Error> {
        let running = {
            let mut state = lock(&self.lifecycle);
            match std::mem::replace(&mut *state, Lifecycle::Stopping) {
                Lifecycle::Running(running) => running,
                other => {
                    *state = other;
                    return Err(Error::NotRunning);
                }
            }
        };

        let Running { addr, stop, mut drained } = running;
        info!(%addr, "shutdown requested");
        // The accept loop may already be gone on a signal; then it drains alone.
        let _ = stop.send(());

        tokio::select! {
            // An error means the loop dropped its sender, which it only does
            // after draining.
            _ = drained.wait_for(|done| *done) => Ok(()),
            () = deadline => Err(Error::ShutdownTimeout),
        }
    }

    fn begin(&self) -> Result<(), Error> {
        let mut state = lock(&self.lifecycle);
        match *state {
            Lifecycle::Stopped => {
                *state = Lifecycle::Starting;
                Ok(())
            }
            _ => Err(Error::AlreadyRunning),
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) -> Result<(), Error> {
        let addr = listener.local_addr()?;
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let (drained_tx, drained_rx) = watch::channel(false);
        let (closing_tx, closing_rx) = watch::channel(false);

        *lock(&self.lifecycle) = Lifecycle::Running(Running { addr, stop: stop_tx, drained: drained_rx });
        info!(%addr, "hypergon listening");

        // JoinSet tracks every connection task so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        let signal = shutdown_signal();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check the stop arms first so no new connection is accepted
                // once shutdown has begun.
                biased;

                _ = &mut stop_rx => {
                    info!(in_flight = tasks.len(), "stopping, draining connections");
                    break;
                }

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    // A concurrent `shutdown` may race us here; whoever takes
                    // `Running` out first wins and the other sees `Stopping`.
                    let mut state = lock(&self.lifecycle);
                    if matches!(*state, Lifecycle::Running(_)) {
                        *state = Lifecycle::Stopping;
                    }
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&self);
                    let closing = closing_rx.clone();
                    tasks.spawn(serve_connection(router, stream, remote_addr, closing));
                }

                // Reap finished tasks so the JoinSet stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        let _ = closing_tx.send(true);
        while tasks.join_next().await.is_some() {}

        // Stopped before waking `shutdown`, so a restart right after it succeeds.
        // Nothing below may touch the lifecycle again: that restart owns it.
        *lock(&self.lifecycle) = Lifecycle::Stopped;
        let _ = drained_tx.send(true);
        info!(%addr, "hypergon stopped");
        Ok(())
    }
}

/// Host-less `:port` means every interface.
fn normalize(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_owned()
    }
}

// ── Connections ───────────────────────────────────────────────────────────────

async fn serve_connection(
    router: Arc<Router>,
    stream: tokio::net::TcpStream,
    remote_addr: SocketAddr,
    mut closing: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    // Called once per request on the connection.
    let svc = service_fn(move |req| {
        let router = Arc::clone(&router);
        async move { dispatch(router, req).await }
    });

    // `auto::Builder` speaks HTTP/1.1 or HTTP/2, whichever the client picks.
    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);

    let mut closing_requested = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    error!(peer = %remote_addr, "connection error: {e}");
                }
                break;
            }
            _ = closing.wait_for(|c| *c), if !closing_requested => {
                closing_requested = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads the body, routes, and logs one line per request.
///
/// Every failure becomes a response, so hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let (parts, body) = req.into_parts();
    let response = match body.collect().await {
        Ok(collected) => {
            let req = http::Request::from_parts(parts, collected.to_bytes());
            router.handle(req).await
        }
        Err(e) => {
            warn!(%method, %path, "unreadable request body: {e}");
            HttpError::new(StatusCode::BAD_REQUEST, "unreadable request body").into_response()
        }
    };

    info!(
        %method,
        %path,
        status = response.status_code().as_u16(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "request"
    );
    Ok(response.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C.
///
/// If a handler cannot be installed that arm never resolves; the server is
/// then only stoppable through [`Router::shutdown`].
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
