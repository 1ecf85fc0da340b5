//! Jira REST API interactions.
//!
//! The upsert engine only depends on the [`TrackerClient`] trait:
//! - `create_issue`: Create a ticket and return its key
//! - `get_issue_status`: Current status name of a ticket
//! - `add_attachment`: Upload a local file to a ticket
//! - `update_issue_field`: Set a single field on a ticket
//!
//! [`JiraClient`] implements it against the Jira REST API v2 using blocking
//! `ureq` calls with HTTP Basic authentication. Calls are never retried.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// User-Agent header sent with every request
const USER_AGENT: &str = concat!("jtrack/", env!("CARGO_PKG_VERSION"));

/// Path prefix of the REST API, relative to the Jira base URL
const API_PREFIX: &str = "rest/api/2";

/// Errors returned by the remote tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Credentials were rejected (401 Unauthorized)
    #[error("Invalid credentials: Jira returned 401 Unauthorized")]
    Unauthorized,

    /// Authenticated user may not perform the request (403 Forbidden)
    #[error("Permission denied: Jira returned 403 Forbidden")]
    Forbidden,

    /// Ticket or endpoint does not exist (404 Not Found)
    #[error("Not found on Jira: {0}")]
    NotFound(String),

    /// Any other non-success HTTP status
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Network, DNS or TLS failure
    #[error("Could not reach Jira: {0}")]
    Transport(String),

    /// Response body did not have the expected shape
    #[error("Failed to parse Jira response: {0}")]
    Parse(String),

    /// Local file could not be read for upload
    #[error("Could not read attachment: {0}")]
    Io(#[from] std::io::Error),
}

/// Fields of a ticket to create.
#[derive(Debug, Clone, Copy)]
pub struct NewIssue<'a> {
    pub project_key: &'a str,
    pub issue_type: &'a str,
    pub summary: &'a str,
    pub labels: &'a BTreeSet<String>,
}

/// The capabilities of a remote issue tracker the upsert engine relies on.
pub trait TrackerClient {
    /// Create a ticket and return its key.
    fn create_issue(&self, issue: &NewIssue<'_>) -> Result<String, TrackerError>;

    /// Return the status name of a ticket (e.g., "Open", "Closed").
    fn get_issue_status(&self, ticket_key: &str) -> Result<String, TrackerError>;

    /// Upload `file_path` as an attachment of a ticket.
    fn add_attachment(&self, ticket_key: &str, file_path: &Path) -> Result<(), TrackerError>;

    /// Set a single field of a ticket.
    fn update_issue_field(
        &self,
        ticket_key: &str,
        field_name: &str,
        value: &str,
    ) -> Result<(), TrackerError>;
}

/// Connection parameters for a Jira instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JiraConnection {
    /// Base URL, e.g. "https://example.atlassian.net"
    pub base_url: String,
    pub username: String,
    /// Password or API token
    pub password: String,
    /// Per-request timeout; `None` waits forever
    pub timeout: Option<Duration>,
}

/// Blocking Jira REST client.
pub struct JiraClient {
    agent: ureq::Agent,
    base_url: String,
    authorization: String,
}

impl JiraClient {
    /// Create a client for the given connection. No request is made.
    pub fn new(connection: &JiraConnection) -> Self {
        let mut builder = ureq::AgentBuilder::new().user_agent(USER_AGENT);
        if let Some(timeout) = connection.timeout {
            builder = builder.timeout(timeout);
        }

        Self {
            agent: builder.build(),
            base_url: connection.base_url.trim_end_matches('/').to_string(),
            authorization: basic_auth(&connection.username, &connection.password),
        }
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_PREFIX, path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &self.api_url(path))
            .set("Authorization", &self.authorization)
            .set("Accept", "application/json")
    }
}

impl TrackerClient for JiraClient {
    fn create_issue(&self, issue: &NewIssue<'_>) -> Result<String, TrackerError> {
        let body = json!({
            "fields": {
                "project": { "key": issue.project_key },
                "issuetype": { "name": issue.issue_type },
                "summary": issue.summary,
                "labels": issue.labels,
            }
        });

        tracing::debug!(project = issue.project_key, "creating Jira issue");
        let response = self
            .request("POST", "issue")
            .send_json(body)
            .map_err(|e| map_error(e, issue.project_key))?;

        let created: CreatedIssue = response
            .into_json()
            .map_err(|e| TrackerError::Parse(e.to_string()))?;
        tracing::debug!(key = %created.key, id = %created.id, "created Jira issue");
        Ok(created.key)
    }

    fn get_issue_status(&self, ticket_key: &str) -> Result<String, TrackerError> {
        let response = self
            .request("GET", &format!("issue/{}", ticket_key))
            .query("fields", "status")
            .call()
            .map_err(|e| map_error(e, ticket_key))?;

        let issue: IssueStatusResponse = response
            .into_json()
            .map_err(|e| TrackerError::Parse(e.to_string()))?;
        Ok(issue.fields.status.name)
    }

    fn add_attachment(&self, ticket_key: &str, file_path: &Path) -> Result<(), TrackerError> {
        let contents = std::fs::read(file_path)?;
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "attachment".to_string());

        let boundary = format!("jtrack-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_body(&boundary, &file_name, &contents);

        tracing::debug!(key = ticket_key, file = %file_name, bytes = contents.len(), "uploading attachment");
        self.request("POST", &format!("issue/{}/attachments", ticket_key))
            .set("X-Atlassian-Token", "no-check")
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body)
            .map_err(|e| map_error(e, ticket_key))?;
        Ok(())
    }

    fn update_issue_field(
        &self,
        ticket_key: &str,
        field_name: &str,
        value: &str,
    ) -> Result<(), TrackerError> {
        let mut fields = serde_json::Map::new();
        fields.insert(field_name.to_string(), json!(value));

        self.request("PUT", &format!("issue/{}", ticket_key))
            .send_json(json!({ "fields": fields }))
            .map_err(|e| map_error(e, ticket_key))?;
        Ok(())
    }
}

/// Response from POST /issue (only fields we care about).
#[derive(Debug, Deserialize)]
struct CreatedIssue {
    id: String,
    key: String,
}

/// Response from GET /issue/{key}?fields=status.
#[derive(Debug, Deserialize)]
struct IssueStatusResponse {
    fields: StatusFields,
}

#[derive(Debug, Deserialize)]
struct StatusFields {
    status: NamedValue,
}

#[derive(Debug, Deserialize)]
struct NamedValue {
    name: String,
}

/// Error body Jira returns for rejected requests.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraErrorBody {
    #[serde(default)]
    error_messages: Vec<String>,
    #[serde(default)]
    errors: BTreeMap<String, String>,
}

/// Build the `Authorization` header value for HTTP Basic auth.
fn basic_auth(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    format!("Basic {}", STANDARD.encode(credentials.as_bytes()))
}

/// Encode a single file as a multipart/form-data body under the `file` field.
///
/// ureq 2 has no multipart support, and Jira's attachment endpoint only
/// needs this one part.
fn multipart_body(boundary: &str, file_name: &str, contents: &[u8]) -> Vec<u8> {
    let file_name = file_name.replace('"', "%22");
    let mut body = Vec::with_capacity(contents.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

/// Turn Jira's JSON error body into a one-line message, or return it raw.
fn describe_error_body(body: &str) -> String {
    let parsed: JiraErrorBody = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) => return body.trim().to_string(),
    };

    let mut parts = parsed.error_messages;
    parts.extend(
        parsed
            .errors
            .into_iter()
            .map(|(field, message)| format!("{}: {}", field, message)),
    );
    if parts.is_empty() {
        body.trim().to_string()
    } else {
        parts.join("; ")
    }
}

fn map_error(err: ureq::Error, subject: &str) -> TrackerError {
    match err {
        ureq::Error::Status(401, _) => TrackerError::Unauthorized,
        ureq::Error::Status(403, _) => TrackerError::Forbidden,
        ureq::Error::Status(404, _) => TrackerError::NotFound(subject.to_string()),
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            TrackerError::Http(format!("HTTP {}: {}", code, describe_error_body(&body)))
        }
        ureq::Error::Transport(transport) => TrackerError::Transport(transport.to_string()),
    }
}
