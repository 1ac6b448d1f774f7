use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

/// Nothing listens on the discard port, so calls fail fast with a connect error.
const UNREACHABLE_API: &str = "http://127.0.0.1:9";

/// A live server process driven one request at a time. Killed on drop.
struct LiveServer {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl LiveServer {
    fn spawn() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_obsquery-mcp"))
            .env("RUST_LOG", "info")
            .env("LOG_FORMAT", "text")
            .env("OBSQUERY_API_URL", UNREACHABLE_API)
            .env_remove("OBSQUERY_API_KEY")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn obsquery-mcp");
        let stdin = child.stdin.take();
        let stdout = BufReader::new(child.stdout.take().expect("piped stdout"));
        Self {
            child,
            stdin,
            stdout,
        }
    }

    fn round_trip(&mut self, frame: &Value) -> Value {
        let stdin = self.stdin.as_mut().expect("stdin still open");
        writeln!(stdin, "{frame}").expect("write frame");
        stdin.flush().expect("flush frame");

        let mut line = String::new();
        self.stdout.read_line(&mut line).expect("read reply");
        serde_json::from_str(&line).unwrap_or_else(|e| panic!("reply is not JSON ({e}): {line}"))
    }

    /// Close stdin and wait up to five seconds for the process to exit.
    fn finish(&mut self) -> (ExitStatus, String) {
        self.stdin.take();
        let deadline = Instant::now() + Duration::from_secs(5);
        let status = loop {
            if let Some(status) = self.child.try_wait().expect("poll child") {
                break status;
            }
            assert!(Instant::now() < deadline, "server still running after stdin closed");
            std::thread::sleep(Duration::from_millis(10));
        };

        let mut stderr = String::new();
        if let Some(pipe) = self.child.stderr.as_mut() {
            pipe.read_to_string(&mut stderr).ok();
        }
        (status, stderr)
    }
}

impl Drop for LiveServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Feed `frames` to a fresh server, close stdin, and return every stdout line as JSON.
fn run_session(frames: &[Value], envs: &[(&str, &str)]) -> (Vec<Value>, String) {
    let input: String = frames.iter().map(|f| format!("{}\n", f)).collect();

    let mut cmd = cargo_bin_cmd!("obsquery-mcp");
    cmd.env("OBSQUERY_API_URL", UNREACHABLE_API)
        .env("OBSQUERY_TIMEOUT_SECS", "5")
        .env("LOG_FORMAT", "text")
        .env_remove("OBSQUERY_API_KEY");
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let assert = cmd
        .write_stdin(input)
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
    let output = assert.get_output();

    let stdout = String::from_utf8(output.stdout.clone()).expect("stdout is UTF-8");
    let responses = stdout
        .lines()
        .map(|line| {
            serde_json::from_str(line)
                .unwrap_or_else(|e| panic!("non-JSON line on stdout ({}): {}", e, line))
        })
        .collect();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    (responses, stderr)
}

fn call(id: i64, tool: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": tool, "arguments": arguments}
    })
}

#[test]
fn test_stdio_isolation_initialize() {
    let mut server = LiveServer::spawn();

    let response = server.round_trip(&json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {}
    }));

    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
    assert!(response["result"]["capabilities"].get("tools").is_some());

    let (status, stderr) = server.finish();
    assert!(status.success(), "server exited with {status:?}");
    assert!(stderr.contains("MCP server initialized"));
    assert!(stderr.contains("stdin closed, shutting down"));

    let reply = serde_json::to_string(&response).unwrap();
    assert!(!reply.contains("MCP server initialized"));
}

#[test]
fn test_tools_list() {
    let (responses, _) = run_session(
        &[json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list", "params": {}})],
        &[],
    );

    assert_eq!(responses.len(), 1);
    let tools = responses[0]["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert_eq!(
        names,
        vec![
            "query_logs",
            "submit_background_query",
            "get_background_query_status",
            "get_background_query_data",
            "cancel_background_query",
        ]
    );
}

#[test]
fn test_protocol_errors_do_not_stop_the_loop() {
    let (responses, _) = run_session(
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            Value::String("this frame is a bare string".to_string()),
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
        ],
        &[],
    );

    assert_eq!(responses.len(), 3, "the notification gets no response");
    assert_eq!(responses[0]["error"]["code"], -32601);
    assert_eq!(responses[1]["error"]["code"], -32600);
    assert_eq!(responses[2]["id"], 2);
    assert_eq!(responses[2]["result"], json!({}));
}

#[test]
fn test_missing_api_key_is_a_tool_error() {
    let (responses, _) = run_session(&[call(1, "query_logs", json!({"query": "error"}))], &[]);

    let result = &responses[0]["result"];
    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("OBSQUERY_API_KEY"));
}

#[test]
fn test_stdout_stays_clean_with_debug_logging() {
    let (responses, stderr) = run_session(
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            call(2, "query_logs", json!({"query": "source logs | limit 5"})),
            call(3, "get_background_query_status", json!({"job_id": "job-1"})),
            json!({"jsonrpc": "2.0", "id": 4, "method": "ping"}),
        ],
        &[("RUST_LOG", "debug"), ("OBSQUERY_API_KEY", "test-key")],
    );

    assert_eq!(responses.len(), 4);
    for response in &responses {
        assert_eq!(response["jsonrpc"], "2.0");
    }
    assert_eq!(responses[1]["result"]["isError"], true);
    assert_eq!(responses[2]["result"]["isError"], true);
    assert!(responses[1]["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("Could not reach the query service"));

    assert!(stderr.contains("DEBUG"), "debug diagnostics go to stderr");
    assert!(!stderr.contains("test-key"), "the API key is never logged");
}

#[test]
fn test_empty_stdin_exits_cleanly() {
    cargo_bin_cmd!("obsquery-mcp")
        .env("RUST_LOG", "info")
        .env("LOG_FORMAT", "text")
        .env_remove("OBSQUERY_API_KEY")
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Starting MCP server"))
        .stderr(predicate::str::contains("Shutdown complete"));
}

#[test]
fn test_non_utf8_frame_gets_parse_error_and_session_continues() {
    let mut input = Vec::new();
    input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n");
    input.extend_from_slice(b"{\"x\":\"\xff\xfe\"}\n");
    input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n");

    let output = cargo_bin_cmd!("obsquery-mcp")
        .env("LOG_FORMAT", "text")
        .env_remove("OBSQUERY_API_KEY")
        .write_stdin(input)
        .timeout(Duration::from_secs(30))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let replies: Vec<Value> = String::from_utf8(output)
        .expect("stdout is UTF-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("JSON reply"))
        .collect();
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[1]["error"]["code"], -32700);
    assert_eq!(replies[2]["id"], 2);
}

#[test]
fn test_json_log_format() {
    let (_, stderr) = run_session(&[], &[("RUST_LOG", "info"), ("LOG_FORMAT", "json")]);
    let first = stderr.lines().next().expect("at least one log line");
    let parsed: Value = serde_json::from_str(first).expect("log lines are JSON");
    assert!(parsed.get("level").is_some());
}

#[test]
fn test_invalid_log_level_fails_fast() {
    cargo_bin_cmd!("obsquery-mcp")
        .args(["--log-level", "obsquery=loudest"])
        .write_stdin("")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("diagnostics"));
}
