#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const TEACHER: &str = "teacher-1";
pub const OTHER_TEACHER: &str = "teacher-2";

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
    let exe = env!("CARGO_BIN_EXE_pollupd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn pollupd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn read_reply(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
}

/// Sends one request and returns the whole reply envelope.
pub fn request_as(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    caller: Option<&str>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let mut payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    if let Some(caller) = caller {
        payload["callerId"] = json!(caller);
    }
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let value = read_reply(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    request_as(stdin, reader, None, id, method, params)
}

pub fn request_ok_as(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    caller: Option<&str>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request_as(stdin, reader, caller, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    request_ok_as(stdin, reader, None, id, method, params)
}

/// Sends a request expected to fail and returns its error object.
pub fn request_err_as(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    caller: Option<&str>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request_as(stdin, reader, caller, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().expect("error object")
}

pub fn error_code(error: &serde_json::Value) -> &str {
    error
        .get("code")
        .and_then(|v| v.as_str())
        .expect("error code")
}

pub fn str_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, value))
        .to_string()
}

/// Opens a fresh workspace and creates one session owned by `TEACHER`.
/// Returns `(workspace, session_id, session_code)`.
pub fn open_with_session(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
    title: &str,
) -> (PathBuf, String, String) {
    let workspace = temp_dir(prefix);
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok_as(
        stdin,
        reader,
        Some(TEACHER),
        "session",
        "sessions.create",
        json!({ "title": title }),
    );
    (
        workspace,
        str_field(&created, "sessionId"),
        str_field(&created, "sessionCode"),
    )
}

pub fn create_element(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    session_id: &str,
    element: serde_json::Value,
) -> String {
    let mut params = element;
    params["sessionId"] = json!(session_id);
    let created = request_ok_as(stdin, reader, Some(TEACHER), id, "elements.create", params);
    str_field(&created, "elementId")
}

/// Element ids of a session in listed order with their stored orders.
pub fn listed_orders(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    session_id: &str,
) -> Vec<(String, i64)> {
    let listed = request_ok(
        stdin,
        reader,
        id,
        "elements.list",
        json!({ "sessionId": session_id }),
    );
    listed
        .as_array()
        .expect("element array")
        .iter()
        .map(|e| {
            (
                str_field(e, "id"),
                e.get("order").and_then(|v| v.as_i64()).expect("order"),
            )
        })
        .collect()
}
