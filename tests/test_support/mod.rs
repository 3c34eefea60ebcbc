#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_termworkd");
    let mut child = Command::new(exe)
        .env_remove("TERMWORKD_BACKEND_URL")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn termworkd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

pub fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

/// One class (year 2 of department d1) with a theory, a practical and two
/// OE subjects; s2 is a defaulter.
pub fn sample_roster() -> serde_json::Value {
    json!({
        "departments": [
            { "id": "d1", "name": "Computer Engineering" },
            { "id": "d2", "name": "Mechanical Engineering" }
        ],
        "classes": [
            { "id": "c1", "name": "SE-A", "year": 2, "departmentId": "d1" }
        ],
        "batches": [
            { "id": "b1", "classId": "c1", "name": "A1", "rollFrom": "01", "rollTo": "02" },
            { "id": "b2", "classId": "c1", "name": "A2", "rollFrom": "03", "rollTo": "04" }
        ],
        "subjects": [
            { "id": "dsa", "classId": "c1", "code": "CS201", "name": "Data Structures", "type": "theory",
              "faculty": [{ "id": "f1", "name": "Prof. Kulkarni" }] },
            { "id": "dsa-lab", "classId": "c1", "code": "CS201L", "name": "DS Lab", "type": "practical",
              "faculty": [{ "id": "f1", "name": "Prof. Kulkarni", "batchId": "b1" },
                          { "id": "f2", "name": "Prof. Shah", "batchId": "b2" }] },
            { "id": "oe-fin", "classId": "c1", "code": "OE301", "name": "Finance", "type": "oe",
              "faculty": [{ "id": "f3", "name": "Prof. Iyer" }] },
            { "id": "oe-ent", "classId": "c1", "code": "OE302", "name": "Entrepreneurship", "type": "oe",
              "faculty": [{ "id": "f4", "name": "Prof. Nair" }, { "id": "f5", "name": "Prof. Rao" }] }
        ],
        "students": [
            { "id": "s1", "classId": "c1", "batchId": "b1", "rollNo": "23CE01", "name": "Asha Patil" },
            { "id": "s2", "classId": "c1", "batchId": "b2", "rollNo": "23CE03", "name": "Rohan Desai", "defaulter": true }
        ]
    })
}

/// Open a workspace and import the sample roster.
pub fn seeded_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "seed-1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(stdin, reader, "seed-2", "roster.import", sample_roster());
    workspace
}

/// Minimal HTTP/1.1 server: answers every request with `status` and `body`
/// and records `METHOD path` plus the request body.
pub struct StubBackend {
    pub base_url: String,
    pub seen: Arc<Mutex<Vec<(String, String)>>>,
    _handle: JoinHandle<()>,
}

pub fn stub_backend(status: u16, body: &'static str) -> StubBackend {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let handle = std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                continue;
            }
            let mut content_length = 0_usize;
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).is_err() || header.trim().is_empty() {
                    break;
                }
                let lower = header.to_ascii_lowercase();
                if let Some(v) = lower.strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap_or(0);
                }
            }
            let mut buf = vec![0_u8; content_length];
            let _ = reader.read_exact(&mut buf);
            let mut parts = request_line.split_whitespace();
            let line = format!(
                "{} {}",
                parts.next().unwrap_or(""),
                parts.next().unwrap_or("")
            );
            log.lock()
                .expect("stub log")
                .push((line, String::from_utf8_lossy(&buf).to_string()));

            let reason = if status < 300 { "OK" } else { "Error" };
            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                reason,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
    });
    StubBackend {
        base_url: format!("http://{}", addr),
        seen,
        _handle: handle,
    }
}
