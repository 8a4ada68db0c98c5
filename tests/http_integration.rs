//! Purpose: End-to-end tests for the book-count HTTP/JSON server.
//! Exports: None (integration test module).
//! Role: Drive every endpoint across TCP and check status codes and JSON bodies.
//! Invariants: Each test starts its own loopback server, so stores never leak between tests.
//! Invariants: Bounded waits avoid test flakiness; server processes are killed on drop.

use serde_json::{Value, json};
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

static SERVER_LOCK: Mutex<()> = Mutex::new(());

const ISBN: &str = "1234567890123";

struct TestServer {
    child: Child,
    base_url: String,
    _server_guard: MutexGuard<'static, ()>,
}

impl TestServer {
    fn start() -> TestResult<Self> {
        Self::start_with_args(&[])
    }

    fn start_with_args(extra: &[&str]) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let bind = format!("127.0.0.1:{port}");
            let base_url = format!("http://{bind}");

            let mut child = Command::new(env!("CARGO_BIN_EXE_genbog"))
                .arg("serve")
                .arg("--bind")
                .arg(&bind)
                .args(extra)
                .env("RUST_LOG", "warn")
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()?;

            match wait_for_server(&mut child, bind.parse()?) {
                Ok(()) => {
                    return Ok(Self {
                        child,
                        base_url,
                        _server_guard: guard,
                    });
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "server failed to start".into()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, path: &str) -> TestResult<(u16, Value)> {
        send(ureq::get(&self.url(path)), None)
    }

    fn post(&self, path: &str) -> TestResult<(u16, Value)> {
        send(ureq::post(&self.url(path)), None)
    }

    fn post_json(&self, path: &str, body: Value) -> TestResult<(u16, Value)> {
        send(ureq::post(&self.url(path)), Some(body))
    }

    fn delete(&self, path: &str) -> TestResult<(u16, Value)> {
        send(ureq::delete(&self.url(path)), None)
    }

    fn post_raw(&self, path: &str, content_type: &str, body: &str) -> TestResult<(u16, Value)> {
        let result = ureq::post(&self.url(path))
            .set("Content-Type", content_type)
            .send_string(body);
        read_response(result)
    }

    fn list(&self) -> TestResult<Vec<Value>> {
        let (status, body) = self.get("/books")?;
        assert_eq!(status, 200);
        Ok(body.as_array().cloned().ok_or("list is not an array")?)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn send(request: ureq::Request, body: Option<Value>) -> TestResult<(u16, Value)> {
    let result = match body {
        Some(body) => request.send_json(body),
        None => request.call(),
    };
    read_response(result)
}

fn read_response(result: Result<ureq::Response, ureq::Error>) -> TestResult<(u16, Value)> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(err) => return Err(err.into()),
    };
    let status = response.status();
    let content_type = response.content_type().to_string();
    if content_type != "application/json" {
        return Err(format!("unexpected content type {content_type} (status {status})").into());
    }
    let body: Value = response.into_json()?;
    Ok((status, body))
}

fn assert_book(body: &Value, isbn: &str, count: u64) {
    let object = body.as_object().expect("book object");
    assert_eq!(object.len(), 2, "unexpected keys in {body}");
    assert_eq!(body["isbn"], isbn);
    assert_eq!(body["count"], count);
}

fn has_entry(entries: &[Value], isbn: &str, count: u64) -> bool {
    entries
        .iter()
        .any(|entry| entry["isbn"] == isbn && entry["count"] == count)
}

#[test]
fn delete_is_idempotent_at_zero() -> TestResult<()> {
    let server = TestServer::start()?;
    let path = format!("/books/{ISBN}");

    for expected in 1..=3 {
        let (status, body) = server.post(&path)?;
        assert_eq!(status, 200);
        assert_book(&body, ISBN, expected);
    }

    for expected in [2, 1] {
        let (status, body) = server.delete(&path)?;
        assert_eq!(status, 200);
        assert_book(&body, ISBN, expected);
    }

    for _ in 0..100 {
        let (status, body) = server.delete(&path)?;
        assert_eq!(status, 200);
        assert_book(&body, ISBN, 0);
    }
    Ok(())
}

#[test]
fn invalid_path_isbn_is_400_for_every_method() -> TestResult<()> {
    let server = TestServer::start()?;
    for candidate in ["123", "abcdefghijkln", "12345678901234"] {
        let path = format!("/books/{candidate}");
        for (status, body) in [
            server.get(&path)?,
            server.post(&path)?,
            server.delete(&path)?,
        ] {
            assert_eq!(status, 400);
            assert_eq!(body["isbn"], candidate);
            assert_eq!(
                body["error"],
                format!("Value '{candidate}' is not a valid ISBN.")
            );
        }
    }
    assert!(server.list()?.is_empty());
    Ok(())
}

#[test]
fn get_untracked_isbn_is_zero() -> TestResult<()> {
    let server = TestServer::start()?;
    let (status, body) = server.get("/books/3210987654321")?;
    assert_eq!(status, 200);
    assert_book(&body, "3210987654321", 0);
    Ok(())
}

#[test]
fn get_matches_post() -> TestResult<()> {
    let server = TestServer::start()?;
    let path = format!("/books/{ISBN}");
    for expected in 1..30 {
        let (status, body) = server.post(&path)?;
        assert_eq!(status, 200);
        assert_book(&body, ISBN, expected);

        let (status, body) = server.get(&path)?;
        assert_eq!(status, 200);
        assert_book(&body, ISBN, expected);
    }
    Ok(())
}

#[test]
fn list_returns_all_posted() -> TestResult<()> {
    let server = TestServer::start()?;
    for _ in 0..4 {
        server.post("/books/1112223334444")?;
    }
    server.post("/books/2223334444111")?;
    server.post("/books/1231231231234")?;
    server.post("/books/1231231231234")?;

    let entries = server.list()?;
    assert_eq!(entries.len(), 3);
    assert!(has_entry(&entries, "1112223334444", 4));
    assert!(has_entry(&entries, "2223334444111", 1));
    assert!(has_entry(&entries, "1231231231234", 2));
    Ok(())
}

#[test]
fn list_omits_emptied_entries() -> TestResult<()> {
    let server = TestServer::start()?;
    for _ in 0..3 {
        server.post("/books/1112223334444")?;
    }
    for _ in 0..3 {
        server.delete("/books/1112223334444")?;
    }
    assert!(server.list()?.is_empty());
    Ok(())
}

#[test]
fn batch_with_invalid_isbn_is_400() -> TestResult<()> {
    let server = TestServer::start()?;
    for (payload, offender) in [
        (json!(["123"]), "123"),
        (json!(["1231231231234", "123"]), "123"),
        (json!(["123", "1231231231234"]), "123"),
    ] {
        let (status, body) = server.post_json("/books", payload)?;
        assert_eq!(status, 400);
        assert_eq!(body["isbn"], offender);
        assert!(body["error"].is_string());
    }
    Ok(())
}

#[test]
fn batch_with_invalid_isbn_changes_nothing() -> TestResult<()> {
    let server = TestServer::start()?;
    server.post("/books/1112223334444")?;
    let (_, before) = server.get("/books")?;

    let (status, _) = server.post_json(
        "/books",
        json!(["1231231231234", "123", "1112223334444"]),
    )?;
    assert_eq!(status, 400);

    let (_, after) = server.get("/books")?;
    assert_eq!(serde_json::to_string(&before)?, serde_json::to_string(&after)?);
    Ok(())
}

#[test]
fn batch_rejection_on_empty_store_leaves_it_empty() -> TestResult<()> {
    let server = TestServer::start()?;
    let (status, _) = server.post_json("/books", json!(["1231231231234", "123"]))?;
    assert_eq!(status, 400);
    let (status, body) = server.get("/books")?;
    assert_eq!(status, 200);
    assert_eq!(body, json!([]));
    Ok(())
}

#[test]
fn batch_returns_current_counts() -> TestResult<()> {
    let server = TestServer::start()?;
    server.post("/books/1231231231234")?;
    server.post("/books/1231231231234")?;

    let (status, body) = server.post_json("/books", json!(["1231231231234", "1112223334444"]))?;
    assert_eq!(status, 200);
    let entries = body.as_array().ok_or("batch response is not an array")?;
    assert_eq!(entries.len(), 2);
    assert_book(&entries[0], "1231231231234", 3);
    assert_book(&entries[1], "1112223334444", 1);
    Ok(())
}

#[test]
fn batch_of_duplicates_adds_each_occurrence() -> TestResult<()> {
    let server = TestServer::start()?;
    let (status, body) = server.post_json("/books", json!(["1231231231234", "1231231231234"]))?;
    assert_eq!(status, 200);
    let entries = body.as_array().ok_or("batch response is not an array")?;
    assert_eq!(entries.len(), 2);
    assert_book(&entries[0], "1231231231234", 1);
    assert_book(&entries[1], "1231231231234", 2);

    let listed = server.list()?;
    assert_eq!(listed.len(), 1);
    assert_book(&listed[0], "1231231231234", 2);
    Ok(())
}

#[test]
fn batch_body_must_be_array_of_strings() -> TestResult<()> {
    let server = TestServer::start()?;
    for payload in [
        json!({"isbn": "1231231231234"}),
        json!("1231231231234"),
        json!(["1231231231234", 42]),
    ] {
        let (status, body) = server.post_json("/books", payload)?;
        assert_eq!(status, 400);
        assert_eq!(body["code"], 400);
        assert_eq!(body["name"], "Bad Request");
        assert!(body["description"].is_string());
    }
    assert!(server.list()?.is_empty());
    Ok(())
}

#[test]
fn batch_body_must_be_json() -> TestResult<()> {
    let server = TestServer::start()?;

    let (status, body) = server.post_raw("/books", "application/json", "[\"1231231231234\"")?;
    assert_eq!(status, 400);
    assert_eq!(body["code"], 400);

    let (status, body) = server.post_raw("/books", "text/plain", "[\"1231231231234\"]")?;
    assert_eq!(status, 415);
    assert_eq!(body["code"], 415);
    assert_eq!(body["name"], "Unsupported Media Type");

    assert!(server.list()?.is_empty());
    Ok(())
}

#[test]
fn oversized_batch_is_rejected() -> TestResult<()> {
    let server = TestServer::start_with_args(&["--max-body-bytes", "64"])?;
    let payload = json!(vec!["1231231231234"; 16]);
    let (status, body) = server.post_json("/books", payload)?;
    assert_eq!(status, 413);
    assert_eq!(body["code"], 413);
    assert!(server.list()?.is_empty());
    Ok(())
}

#[test]
fn unknown_route_is_404_json() -> TestResult<()> {
    let server = TestServer::start()?;
    for path in ["/", "/nope", "/books/1234567890123/extra"] {
        let (status, body) = server.get(path)?;
        assert_eq!(status, 404);
        assert_eq!(body["code"], 404);
        assert_eq!(body["name"], "Not Found");
    }
    Ok(())
}

#[test]
fn unsupported_method_is_405_json() -> TestResult<()> {
    let server = TestServer::start()?;
    let (status, body) = send(ureq::delete(&server.url("/books")), None)?;
    assert_eq!(status, 405);
    assert_eq!(body["code"], 405);
    assert_eq!(body["name"], "Method Not Allowed");

    let (status, _) = send(ureq::put(&server.url(&format!("/books/{ISBN}"))), None)?;
    assert_eq!(status, 405);
    Ok(())
}

#[test]
fn healthz_reports_ok() -> TestResult<()> {
    let server = TestServer::start()?;
    let (status, body) = server.get("/healthz")?;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "ok": true }));
    Ok(())
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn wait_for_server(child: &mut Child, addr: SocketAddr) -> TestResult<()> {
    let url = format!("http://{addr}/healthz");
    let start = Instant::now();
    loop {
        if let Ok(resp) = ureq::get(&url).call() {
            if resp.status() == 200 {
                return Ok(());
            }
        }
        if let Some(status) = child.try_wait()? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let detail = stderr.trim();
            return Err(format!(
                "server exited before ready (status: {status}, stderr: {})",
                if detail.is_empty() { "<empty>" } else { detail }
            )
            .into());
        }
        if start.elapsed() > Duration::from_secs(8) {
            return Err("server did not start in time".into());
        }
        sleep(Duration::from_millis(20));
    }
}
