//! Integration tests for `testboard serve`.
//!
//! Each test starts the server as a child process on a unique port with a
//! file-backed store in a temporary directory, connects over WebSocket,
//! and drives changes through the `testboard record` subcommand.

use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so separate test binaries don't
/// collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

const SCHEMA: &str = r#"{"TestCase": {"name": "String", "status": "String"}}"#;

/// Kills the server when the test ends, pass or fail.
struct Server {
    child: Child,
    port: u16,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Server {
    fn url(&self) -> String {
        format!("ws://127.0.0.1:{}/socket", self.port)
    }
}

fn testboard(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_testboard"));
    cmd.current_dir(dir);
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Helper: start the server in `dir` and wait for the port to open.
fn start_server(dir: &Path, extra_args: &[&str]) -> Server {
    let port = next_port();
    let mut cmd = testboard(dir);
    cmd.arg("serve")
        .arg("--port")
        .arg(port.to_string())
        .arg("--schema-poll-ms")
        .arg("50")
        .args(extra_args)
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let child = cmd.spawn().expect("failed to start testboard serve");
    let server = Server { child, port };
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            return server;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    server
}

fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("schemas.json"), SCHEMA).unwrap();
    dir
}

fn add_record(dir: &Path, data: &str) {
    let status = testboard(dir)
        .args(["record", "add", "--data", data])
        .stdout(Stdio::null())
        .status()
        .unwrap();
    assert!(status.success());
}

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Next snapshot payload (`data`) from the socket.
async fn next_snapshot(socket: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no frame within 5s")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            let frame: Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(frame["event"], "FromAPI");
            return frame["data"].clone();
        }
    }
}

/// Helper: make a simple HTTP GET request and return (status, body).
fn http_get(port: u16, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost:{}\r\nConnection: close\r\n\r\n",
        path, port
    );
    std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    let (head, body) = response.split_once("\r\n\r\n").unwrap_or((&response, ""));
    let status = head
        .lines()
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    (status, body.to_string())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[tokio::test]
async fn connect_receives_initial_snapshot_then_updates() {
    let dir = workspace();
    add_record(dir.path(), r#"{"name": "login", "status": "passed"}"#);
    let server = start_server(dir.path(), &[]);

    let (mut socket, _) = connect_async(server.url()).await.unwrap();
    let first = next_snapshot(&mut socket).await;
    assert_eq!(first["testCases"].as_array().unwrap().len(), 1);
    assert_eq!(first["testCases"][0]["status"], "passed");
    assert_eq!(first["schema"], serde_json::json!({"name": "String", "status": "String"}));

    add_record(dir.path(), r#"{"name": "logout", "status": "failed"}"#);
    let second = next_snapshot(&mut socket).await;
    assert_eq!(second["testCases"].as_array().unwrap().len(), 2);
    assert_eq!(second["testCases"][1]["name"], "logout");
}

#[tokio::test]
async fn root_path_also_serves_snapshots() {
    let dir = workspace();
    let server = start_server(dir.path(), &[]);
    let url = format!("ws://127.0.0.1:{}/", server.port);
    let (mut socket, _) = connect_async(url).await.unwrap();
    let first = next_snapshot(&mut socket).await;
    assert!(first["testCases"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn schema_edits_reach_the_next_snapshot() {
    let dir = workspace();
    let server = start_server(dir.path(), &[]);
    let (mut socket, _) = connect_async(server.url()).await.unwrap();
    next_snapshot(&mut socket).await;

    std::fs::write(
        dir.path().join("schemas.json"),
        r#"{"TestCase": {"name": "String", "status": "String", "owner": "String"}}"#,
    )
    .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    add_record(dir.path(), r#"{"name": "login", "owner": "qa"}"#);
    let snapshot = next_snapshot(&mut socket).await;
    assert_eq!(snapshot["testCases"][0]["owner"], "qa");
    assert!(snapshot["schema"].get("owner").is_some());
}

#[tokio::test]
async fn malformed_schema_edit_keeps_serving_old_schema() {
    let dir = workspace();
    let server = start_server(dir.path(), &[]);
    let (mut socket, _) = connect_async(server.url()).await.unwrap();
    next_snapshot(&mut socket).await;

    std::fs::write(dir.path().join("schemas.json"), "{ broken").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // The CLI cannot load the broken file, so write the store directly.
    std::fs::write(
        dir.path().join("records.json"),
        r#"{"TestCase": [{"_id": "a1", "name": "login", "status": "passed"}]}"#,
    )
    .unwrap();
    let snapshot = next_snapshot(&mut socket).await;
    assert_eq!(snapshot["testCases"][0]["_id"], "a1");
    assert_eq!(snapshot["schema"], serde_json::json!({"name": "String", "status": "String"}));
}

#[tokio::test]
async fn disallowed_origin_is_refused() {
    let dir = workspace();
    let server = start_server(dir.path(), &["--allowed-origins", "http://board.example"]);

    let mut request = server.url().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("http://evil.example"));
    match connect_async(request).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 403),
        other => panic!("expected 403, got {:?}", other.map(|_| ())),
    }

    let mut request = server.url().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("http://board.example"));
    let (mut socket, _) = connect_async(request).await.unwrap();
    next_snapshot(&mut socket).await;
}

#[tokio::test]
async fn unknown_path_is_json_404() {
    let dir = workspace();
    let server = start_server(dir.path(), &[]);
    let port = server.port;
    let (status, body) = tokio::task::spawn_blocking(move || http_get(port, "/health"))
        .await
        .unwrap();
    assert_eq!(status, 404);
    assert!(body.contains(r#""error":"not found""#), "{}", body);
}

#[tokio::test]
async fn watch_command_prints_the_first_snapshot() {
    let dir = workspace();
    add_record(dir.path(), r#"{"name": "login", "status": "failed"}"#);
    let server = start_server(dir.path(), &[]);
    let url = server.url();
    let cwd = dir.path().to_path_buf();

    let output = tokio::task::spawn_blocking(move || {
        testboard(&cwd)
            .args(["watch", "--url", &url, "--once", "--utc"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.starts_with("Loading....."), "{}", stdout);
    assert!(stdout.contains("New data has been added with 1 test cases."), "{}", stdout);
    assert!(stdout.contains("Total : 1  Passed : 0  Failed : 1  Skipped : 0"), "{}", stdout);
    assert!(stdout.contains("failed (red)"), "{}", stdout);
}
