//! Integration tests for the `flaggraph serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests, and verifies the responses.

use std::io::Read;
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use serde_json::Value;

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

/// A running server, killed on drop.
struct Server {
    child: Child,
    port: u16,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

/// Start `flaggraph serve` on a fresh port and wait until it accepts connections.
fn start_server() -> Server {
    let port = next_port();
    let child = Command::new(env!("CARGO_BIN_EXE_flaggraph"))
        .arg("serve")
        .arg("--port")
        .arg(port.to_string())
        .env("RUST_LOG", "warn")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start flaggraph serve");

    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server { child, port }
}

impl Server {
    fn get(&self, path: &str) -> (u16, Value) {
        self.request("GET", path, None)
    }

    fn post(&self, path: &str, body: &str) -> (u16, Value) {
        self.request("POST", path, Some(body))
    }

    fn request(&self, method: &str, path: &str, body: Option<&str>) -> (u16, Value) {
        let mut stream =
            TcpStream::connect(format!("127.0.0.1:{}", self.port)).expect("failed to connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();

        let request = match body {
            Some(body) => format!(
                "{} {} HTTP/1.1\r\nHost: localhost:{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                method, path, self.port, body.len(), body
            ),
            None => format!(
                "{} {} HTTP/1.1\r\nHost: localhost:{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                method, path, self.port
            ),
        };
        std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

        let mut response = String::new();
        let _ = stream.read_to_string(&mut response);

        let (status, body) = parse_http_response(&response);
        let json = serde_json::from_str(&body)
            .unwrap_or_else(|e| panic!("invalid JSON body {:?}: {}", body, e));
        (status, json)
    }

    /// Create a flag and return its id.
    fn create(&self, name: &str, deps: &[i64]) -> i64 {
        let body = serde_json::json!({ "name": name, "dependencies": deps }).to_string();
        let (status, json) = self.post("/flags", &body);
        assert_eq!(status, 201, "create {}: {}", name, json);
        json["id"].as_i64().expect("id")
    }

    fn toggle(&self, id: i64) -> (u16, Value) {
        self.post(&format!("/flags/{}/toggle", id), "")
    }
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"").to_string();
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status = headers
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let body = if headers
        .to_ascii_lowercase()
        .contains("transfer-encoding: chunked")
    {
        decode_chunked(&body)
    } else {
        body
    };
    (status, body)
}

/// Decode chunked transfer encoding.
fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;

    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(s) => s,
            Err(_) => break,
        };
        if size == 0 {
            break;
        }
        let chunk_start = line_end + 2;
        let chunk_end = chunk_start + size;
        if chunk_end > remaining.len() {
            result.push_str(&remaining[chunk_start..]);
            break;
        }
        result.push_str(&remaining[chunk_start..chunk_end]);
        remaining = remaining.get(chunk_end + 2..).unwrap_or("");
    }

    result
}

#[test]
fn health_returns_200_with_version() {
    let server = start_server();
    let (status, json) = server.get("/health");
    assert_eq!(status, 200);
    assert_eq!(json["status"], "ok");
    assert!(json.get("version").is_some());
}

#[test]
fn unknown_route_is_json_404() {
    let server = start_server();
    let (status, json) = server.get("/nope");
    assert_eq!(status, 404);
    assert_eq!(json["error"], "not found");
}

#[test]
fn create_flag_without_dependencies() {
    let server = start_server();
    let (status, json) = server.post("/flags", r#"{"name": "flagA", "dependencies": []}"#);
    assert_eq!(status, 201);
    assert_eq!(json["name"], "flagA");
    assert_eq!(json["is_active"], false);
    assert_eq!(json["dependencies"], serde_json::json!([]));
}

#[test]
fn create_with_missing_dependency_rejected() {
    let server = start_server();
    let (status, json) = server.post("/flags", r#"{"name": "flagB", "dependencies": [999]}"#);
    assert_eq!(status, 400);
    let msg = json["error"].as_str().unwrap();
    assert!(msg.contains("one or more dependencies not found"), "{}", msg);

    let (_, list) = server.get("/flags");
    assert_eq!(list["flags"].as_array().unwrap().len(), 0);
}

#[test]
fn redundant_dependency_rejected() {
    let server = start_server();
    let a = server.create("flagA", &[]);
    let b = server.create("flagB", &[a]);
    let body = serde_json::json!({ "name": "flagC", "dependencies": [b, a] }).to_string();
    let (status, json) = server.post("/flags", &body);
    assert_eq!(status, 400);
    assert!(json["error"].as_str().unwrap().contains("redundant"));

    let (status, _) = server.get("/flags/by-name/flagC");
    assert_eq!(status, 404);
}

#[test]
fn activation_requires_active_dependencies() {
    let server = start_server();
    let dep1 = server.create("dep1", &[]);
    let flag3 = server.create("flag3", &[dep1]);

    let (status, json) = server.toggle(flag3);
    assert_eq!(status, 400);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("all dependencies must be active"));

    let (status, json) = server.toggle(dep1);
    assert_eq!(status, 200);
    assert_eq!(json["is_active"], true);

    let (status, json) = server.toggle(flag3);
    assert_eq!(status, 200);
    assert_eq!(json["is_active"], true);
}

#[test]
fn activate_deactivate_audit_trail() {
    let server = start_server();
    let flag5 = server.create("flag5", &[]);
    let (status, _) = server.post(&format!("/flags/{}/toggle", flag5), r#"{"actor": "alice"}"#);
    assert_eq!(status, 200);
    let (status, json) = server.toggle(flag5);
    assert_eq!(status, 200);
    assert_eq!(json["is_active"], false);

    let (status, json) = server.get(&format!("/flags/{}/audit", flag5));
    assert_eq!(status, 200);
    let entries = json["entries"].as_array().unwrap();
    let ops: Vec<&str> = entries
        .iter()
        .rev()
        .map(|e| e["operation"].as_str().unwrap())
        .collect();
    assert_eq!(ops, vec!["create", "activate", "deactivate"]);
    assert_eq!(entries[1]["actor"], "alice");
    assert!(entries[0]["timestamp"].as_str().is_some());
}

#[test]
fn deactivation_blocked_by_active_dependent() {
    let server = start_server();
    let x = server.create("flagX", &[]);
    server.toggle(x);
    let y = server.create("flagY", &[x]);
    server.toggle(y);

    let (status, json) = server.post(&format!("/flags/{}/disable", x), "");
    assert_eq!(status, 400);
    assert!(json["error"].as_str().unwrap().contains("flagY"));

    let (_, json) = server.get(&format!("/flags/{}", x));
    assert_eq!(json["is_active"], true);
}

#[test]
fn nested_projection_expands_dependencies() {
    let server = start_server();
    let a = server.create("a", &[]);
    let b = server.create("b", &[a]);

    let (_, flat) = server.get(&format!("/flags/{}", b));
    assert_eq!(flat["dependencies"], serde_json::json!([a]));

    let (status, nested) = server.get(&format!("/flags/{}?nested=true", b));
    assert_eq!(status, 200);
    assert_eq!(nested["dependencies"][0]["name"], "a");
    assert_eq!(nested["dependencies"][0]["id"], a);
}

#[test]
fn error_status_mapping() {
    let server = start_server();
    assert_eq!(server.get("/flags/12345").0, 404);
    assert_eq!(server.get("/flags/not-a-number").0, 400);
    assert_eq!(server.toggle(12345).0, 404);
    assert_eq!(server.post("/flags", r#"{"name": ""}"#).0, 422);
    assert_eq!(server.post("/flags", "not json").0, 400);

    server.create("dup", &[]);
    let (status, json) = server.post("/flags", r#"{"name": "dup"}"#);
    assert_eq!(status, 400);
    assert!(json["error"].as_str().unwrap().contains("dup"));
}

#[test]
fn audit_log_query_filters_and_paginates() {
    let server = start_server();
    let a = server.create("a", &[]);
    server.create("b", &[]);
    server.post(&format!("/flags/{}/enable", a), r#"{"actor": "ops"}"#);

    let (status, json) = server.get("/audit-logs?actor=ops");
    assert_eq!(status, 200);
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["flag_id"], a);

    let (_, json) = server.get("/audit-logs?operation=create&limit=1");
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["flag_name"], "b");

    let (_, json) = server.get(&format!("/audit-logs?flag_id={}&offset=1", a));
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["operation"], "create");

    assert_eq!(server.get("/audit-logs?operation=bogus").0, 400);
}
