//! Common test utilities for jtrack integration tests.
//!
//! Provides `TestEnv` for isolated working directories and `FakeJira`, a
//! minimal in-process Jira REST server that records every request.

#![allow(dead_code)]

use assert_cmd::Command;
use std::collections::HashMap;
use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
pub use tempfile::TempDir;
use tiny_http::{Header, Request, Response, Server};

/// Credentials `FakeJira` accepts.
pub const JIRA_USER: &str = "bot";
pub const JIRA_PASSWORD: &str = "secret";
/// `Basic base64("bot:secret")`
const EXPECTED_AUTH: &str = "Basic Ym90OnNlY3JldA==";

/// Variables that would leak the developer's real setup into a test.
const ISOLATED_VARS: &[&str] = &[
    "JTRACK_JIRA_URL",
    "JTRACK_JIRA_USERNAME",
    "JTRACK_JIRA_PASSWORD",
    "JIRA_URL",
    "JIRA_USER",
    "JIRA_PASSWORD",
    "JTRACK_DB",
    "JTRACK_CONFIG",
    "JTRACK_LOG",
];

/// A test environment with an isolated working directory.
///
/// - `work_dir`: the process working directory (holds `jtrack.db`)
/// - `config_dir`: the system config directory (via `JTRACK_CONFIG_DIR`)
pub struct TestEnv {
    pub work_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            work_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the jtrack binary with no Jira settings.
    pub fn jtrack(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_jtrack"));
        cmd.current_dir(self.work_dir.path());
        for var in ISOLATED_VARS {
            cmd.env_remove(var);
        }
        cmd.env("JTRACK_CONFIG_DIR", self.config_dir.path());
        cmd
    }

    /// Get a Command for the jtrack binary pointed at `jira`.
    pub fn jtrack_with(&self, jira: &FakeJira) -> Command {
        let mut cmd = self.jtrack();
        cmd.env("JTRACK_JIRA_URL", jira.url());
        cmd.env("JTRACK_JIRA_USERNAME", JIRA_USER);
        cmd.env("JTRACK_JIRA_PASSWORD", JIRA_PASSWORD);
        cmd
    }

    pub fn path(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.work_dir.path().join("jtrack.db")
    }

    /// Write a file into the working directory and return its path.
    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.work_dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Write the system config file.
    pub fn write_system_config(&self, contents: &str) {
        std::fs::write(self.config_dir.path().join("config.kdl"), contents).unwrap();
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// One HTTP request seen by `FakeJira`.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path without the query string
    pub path: String,
    pub query: Option<String>,
    /// Header names are lowercased
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Default)]
struct JiraState {
    requests: Vec<RecordedRequest>,
    /// Ticket key -> status name
    issues: HashMap<String, String>,
    next_number: u32,
    /// Canned (status, body) returned for the next request
    fail_next: Option<(u16, String)>,
}

/// In-process Jira REST v2 server on a random loopback port, served by
/// `tiny_http`.
///
/// Supports issue creation, status lookup, attachments and field updates.
/// Created tickets start in the `Open` status. Requests without the
/// expected Basic credentials get 401. The server thread lives until the
/// test process exits.
pub struct FakeJira {
    addr: SocketAddr,
    state: Arc<Mutex<JiraState>>,
}

impl FakeJira {
    pub fn start() -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let state = Arc::new(Mutex::new(JiraState::default()));

        let server_state = Arc::clone(&state);
        thread::spawn(move || {
            for request in server.incoming_requests() {
                handle_request(request, &server_state);
            }
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Requests that change remote state (everything but GET).
    pub fn mutations(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method != "GET")
            .collect()
    }

    /// Requests matching `method` and exact `path`.
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }

    /// Create a ticket directly, bypassing the API.
    pub fn add_issue(&self, key: &str, status: &str) {
        self.state
            .lock()
            .unwrap()
            .issues
            .insert(key.to_string(), status.to_string());
    }

    pub fn set_status(&self, key: &str, status: &str) {
        self.add_issue(key, status);
    }

    /// Answer the next request with `status` and `body`, whatever it is.
    pub fn fail_next(&self, status: u16, body: &str) {
        self.state.lock().unwrap().fail_next = Some((status, body.to_string()));
    }
}

fn handle_request(mut request: Request, state: &Mutex<JiraState>) {
    let recorded = record(&mut request);

    let (status, body) = {
        let mut state = state.lock().unwrap();
        state.requests.push(recorded.clone());
        match state.fail_next.take() {
            Some(canned) => canned,
            None => route(&recorded, &mut state),
        }
    };

    let response = Response::from_string(body)
        .with_status_code(status)
        .with_header(Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap());
    if let Err(e) = request.respond(response) {
        eprintln!("FakeJira: failed to respond: {}", e);
    }
}

fn record(request: &mut Request) -> RecordedRequest {
    let (path, query) = match request.url().split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (request.url().to_string(), None),
    };
    let headers = request
        .headers()
        .iter()
        .map(|h| (h.field.to_string().to_lowercase(), h.value.to_string()))
        .collect();

    let mut body = Vec::new();
    request.as_reader().read_to_end(&mut body).unwrap();

    RecordedRequest {
        method: request.method().to_string(),
        path,
        query,
        headers,
        body,
    }
}

fn route(request: &RecordedRequest, state: &mut JiraState) -> (u16, String) {
    if request.header("authorization") != Some(EXPECTED_AUTH) {
        return (401, String::new());
    }

    let not_found = || {
        (
            404,
            r#"{"errorMessages":["Issue does not exist or you do not have permission to see it."],"errors":{}}"#
                .to_string(),
        )
    };

    let Some(rest) = request.path.strip_prefix("/rest/api/2/issue") else {
        return (404, String::new());
    };
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

    match (request.method.as_str(), segments.as_slice()) {
        ("POST", []) => {
            let body: serde_json::Value = match serde_json::from_slice(&request.body) {
                Ok(body) => body,
                Err(_) => return (400, r#"{"errorMessages":["Bad JSON"]}"#.to_string()),
            };
            let Some(project) = body["fields"]["project"]["key"].as_str() else {
                return (
                    400,
                    r#"{"errorMessages":[],"errors":{"project":"project is required"}}"#
                        .to_string(),
                );
            };
            state.next_number += 1;
            let key = format!("{}-{}", project, state.next_number);
            state.issues.insert(key.clone(), "Open".to_string());
            let id = 10000 + state.next_number;
            (
                201,
                format!(r#"{{"id":"{id}","key":"{key}","self":"/rest/api/2/issue/{id}"}}"#),
            )
        }
        ("GET", [key]) => match state.issues.get(*key) {
            Some(status) => (
                200,
                format!(r#"{{"key":"{key}","fields":{{"status":{{"name":"{status}"}}}}}}"#),
            ),
            None => not_found(),
        },
        ("PUT", [key]) if state.issues.contains_key(*key) => (204, String::new()),
        ("POST", [key, "attachments"]) if state.issues.contains_key(*key) => {
            (200, r#"[{"id":"1","filename":"upload"}]"#.to_string())
        }
        _ => not_found(),
    }
}
