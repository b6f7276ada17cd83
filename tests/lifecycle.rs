//! Start / shutdown over a real socket.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hypergon::{Error, HttpError, Request, Response, Router};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tracing_subscriber::fmt::MakeWriter;

async fn ping(_req: Request) -> Result<Response, HttpError> {
    Ok(Response::text("pong"))
}

async fn slow(_req: Request) -> Result<Response, HttpError> {
    sleep(Duration::from_millis(200)).await;
    Ok(Response::text("done"))
}

fn app() -> Arc<Router> {
    let mut app = Router::new();
    app.action("GET /ping", ping).action("GET /slow", slow);
    Arc::new(app)
}

/// One HTTP/1.1 request on a fresh connection; returns the raw response.
async fn fetch(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nhost: test\r\nconnection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    raw
}

async fn wait_until_running(app: &Router) -> SocketAddr {
    for _ in 0..100 {
        if let Some(addr) = app.local_addr() {
            return addr;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("server never reached Running");
}

#[tokio::test]
async fn shutdown_without_start_fails_cleanly() {
    let app = app();
    let err = app.shutdown(sleep(Duration::from_secs(1))).await.unwrap_err();
    assert!(matches!(err, Error::NotRunning));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn start_serve_and_shut_down() {
    let app = app();
    let server = tokio::spawn(Arc::clone(&app).start("127.0.0.1:0"));
    let addr = wait_until_running(&app).await;

    let raw = fetch(addr, "/ping").await;
    assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");
    assert!(raw.ends_with("pong"), "{raw}");

    let raw = fetch(addr, "/missing").await;
    assert!(raw.starts_with("HTTP/1.1 404"), "{raw}");

    app.shutdown(sleep(Duration::from_secs(5))).await.unwrap();
    server.await.unwrap().unwrap();

    assert!(app.local_addr().is_none());
    assert!(matches!(app.shutdown(sleep(Duration::from_secs(1))).await, Err(Error::NotRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_running_router_refuses_a_second_start() {
    let app = app();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = tokio::spawn(Arc::clone(&app).serve(listener));
    wait_until_running(&app).await;

    let second = Arc::clone(&app).start("127.0.0.1:0").await;
    assert!(matches!(second, Err(Error::AlreadyRunning)));

    app.shutdown(sleep(Duration::from_secs(5))).await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_stopped_router_can_start_again() {
    let app = app();

    for _ in 0..2 {
        let server = tokio::spawn(Arc::clone(&app).start("127.0.0.1:0"));
        let addr = wait_until_running(&app).await;
        assert!(fetch(addr, "/ping").await.ends_with("pong"));

        app.shutdown(sleep(Duration::from_secs(5))).await.unwrap();
        server.await.unwrap().unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_waits_for_in_flight_requests() {
    let app = app();
    let server = tokio::spawn(Arc::clone(&app).start("127.0.0.1:0"));
    let addr = wait_until_running(&app).await;

    let in_flight = tokio::spawn(fetch(addr, "/slow"));
    sleep(Duration::from_millis(50)).await;

    app.shutdown(sleep(Duration::from_secs(5))).await.unwrap();
    let raw = timeout(Duration::from_secs(1), in_flight).await.unwrap().unwrap();
    assert!(raw.ends_with("done"), "{raw}");
    server.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_reports_an_elapsed_deadline() {
    let app = app();
    let server = tokio::spawn(Arc::clone(&app).start("127.0.0.1:0"));
    let addr = wait_until_running(&app).await;

    let in_flight = tokio::spawn(fetch(addr, "/slow"));
    sleep(Duration::from_millis(50)).await;

    let err = app.shutdown(std::future::ready(())).await.unwrap_err();
    assert!(matches!(err, Error::ShutdownTimeout));

    // Draining still finishes the request and stops the server.
    assert!(in_flight.await.unwrap().ends_with("done"));
    server.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restart_right_after_shutdown_stays_up() {
    let app = app();
    let mut server = tokio::spawn(Arc::clone(&app).start("127.0.0.1:0"));

    for _ in 0..50 {
        wait_until_running(&app).await;
        app.shutdown(sleep(Duration::from_secs(5))).await.unwrap();

        // Start again while the previous `start` call may still be returning.
        let next = tokio::spawn(Arc::clone(&app).start("127.0.0.1:0"));
        server.await.unwrap().unwrap();
        server = next;
    }

    let addr = wait_until_running(&app).await;
    assert!(fetch(addr, "/ping").await.ends_with("pong"));
    app.shutdown(sleep(Duration::from_secs(5))).await.unwrap();
    server.await.unwrap().unwrap();
}

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn lines_with(&self, needle: &str) -> Vec<String> {
        let raw = self.0.lock().unwrap();
        String::from_utf8_lossy(&raw)
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_owned)
            .collect()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// Current-thread runtime: the subscriber below is installed for this thread only.
#[tokio::test]
async fn every_request_gets_one_log_line() {
    let logs = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let app = app();
    let server = tokio::spawn(Arc::clone(&app).start("127.0.0.1:0"));
    let addr = wait_until_running(&app).await;

    fetch(addr, "/ping").await;
    fetch(addr, "/missing").await;
    app.shutdown(sleep(Duration::from_secs(5))).await.unwrap();
    server.await.unwrap().unwrap();

    let ping = logs.lines_with("path=/ping");
    assert_eq!(ping.len(), 1, "{ping:?}");
    assert!(ping[0].contains("method=GET"), "{}", ping[0]);
    assert!(ping[0].contains("status=200"), "{}", ping[0]);
    assert!(ping[0].contains("elapsed_us="), "{}", ping[0]);

    let missing = logs.lines_with("path=/missing");
    assert_eq!(missing.len(), 1, "{missing:?}");
    assert!(missing[0].contains("status=404"), "{}", missing[0]);
}
