//! Data models for jtrack.
//!
//! This module defines the core data structures:
//! - `IdentifierRecord` - A stored identifier → Jira key mapping
//! - `UpsertRequest` - Everything the upsert engine needs for one run
//! - `UpsertReport` - What the upsert engine did

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Statuses that mark a ticket as closed unless the caller says otherwise.
pub const DEFAULT_CLOSED_STATUSES: [&str; 2] = ["Closed", "Resolved"];

/// Issue type used for new tickets unless the caller says otherwise.
pub const DEFAULT_ISSUE_TYPE: &str = "Task";

/// A stored mapping from an external identifier to a Jira ticket key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierRecord {
    /// Caller-supplied identifier (primary key)
    pub identifier: String,

    /// Jira key of the ticket tracking this identifier (e.g., "SEC-42")
    pub ticket_key: String,
}

impl IdentifierRecord {
    pub fn new(identifier: impl Into<String>, ticket_key: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ticket_key: ticket_key.into(),
        }
    }
}

/// Input for a single upsert run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRequest {
    /// External identifier the ticket belongs to
    pub identifier: String,

    /// Jira project key (e.g., "SEC")
    pub project: String,

    /// Summary for newly created tickets
    pub summary: String,

    /// Description set on newly created tickets
    pub description: Option<String>,

    /// File attached to the created or existing ticket
    pub attachment: Option<PathBuf>,

    /// Labels for newly created tickets
    pub labels: BTreeSet<String>,

    /// Status names (exact, case-sensitive) that count as closed
    pub closed_statuses: BTreeSet<String>,

    /// Issue type for newly created tickets
    pub issue_type: String,

    /// Leave an existing open ticket untouched
    pub skip_existing: bool,
}

impl UpsertRequest {
    /// Create a request with default labels, closed statuses and issue type.
    pub fn new(
        identifier: impl Into<String>,
        project: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            project: project.into(),
            summary: summary.into(),
            description: None,
            attachment: None,
            labels: BTreeSet::new(),
            closed_statuses: default_closed_statuses(),
            issue_type: DEFAULT_ISSUE_TYPE.to_string(),
            skip_existing: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment = Some(path.into());
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_closed_statuses<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.closed_statuses = statuses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_issue_type(mut self, issue_type: impl Into<String>) -> Self {
        self.issue_type = issue_type.into();
        self
    }

    pub fn with_skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    /// Whether a remote status counts as closed for this request.
    pub fn is_closed_status(&self, status: &str) -> bool {
        self.closed_statuses.contains(status)
    }
}

/// The default closed status set as owned strings.
pub fn default_closed_statuses() -> BTreeSet<String> {
    DEFAULT_CLOSED_STATUSES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Terminal state of an upsert run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Created,
    Updated,
    Skipped,
}

impl UpsertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertAction::Created => "created",
            UpsertAction::Updated => "updated",
            UpsertAction::Skipped => "skipped",
        }
    }
}

impl fmt::Display for UpsertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of an upsert run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    pub action: UpsertAction,

    pub identifier: String,

    /// Key of the ticket that was created, updated or skipped
    pub ticket_key: String,

    /// Whether the attachment was uploaded during this run
    pub attachment_added: bool,

    /// Whether the description field was set during this run
    pub description_set: bool,

    /// Closed ticket superseded by a newly created one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_ticket_key: Option<String>,

    /// Whether the identifier → key mapping was written to the local store.
    /// Only meaningful for `created`; false means the write failed and the
    /// next run will not find this ticket.
    pub persisted: bool,
}

impl UpsertReport {
    pub fn skipped(identifier: impl Into<String>, ticket_key: impl Into<String>) -> Self {
        Self {
            action: UpsertAction::Skipped,
            identifier: identifier.into(),
            ticket_key: ticket_key.into(),
            attachment_added: false,
            description_set: false,
            previous_ticket_key: None,
            persisted: true,
        }
    }

    pub fn updated(
        identifier: impl Into<String>,
        ticket_key: impl Into<String>,
        attachment_added: bool,
    ) -> Self {
        Self {
            action: UpsertAction::Updated,
            identifier: identifier.into(),
            ticket_key: ticket_key.into(),
            attachment_added,
            description_set: false,
            previous_ticket_key: None,
            persisted: true,
        }
    }
}
