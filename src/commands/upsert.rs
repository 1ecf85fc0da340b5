//! Upsert engine: create, update or skip the ticket for one identifier.
//!
//! ```text
//! validate attachment
//!        │
//!   store lookup ── not found ─────────────────────────► create
//!        │ found
//!   remote status ── in closed statuses ───────────────► create (overwrites mapping)
//!        │ open
//!   skip_existing? ── yes ─► skipped
//!        │ no
//!      update (attach file if given)
//! ```

use crate::commands::CommandResult;
use crate::jira::{NewIssue, TrackerClient};
use crate::models::{UpsertAction, UpsertReport, UpsertRequest};
use crate::storage::IdentifierStore;
use crate::{Error, Result};
use std::fmt;
use std::path::Path;

/// Jira field the description is written to after creation.
const DESCRIPTION_FIELD: &str = "description";

/// What to do when the identifier store cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageFaultPolicy {
    /// Log a warning and continue as if the identifier was never seen.
    /// A transient fault can therefore open a duplicate ticket.
    #[default]
    TreatAsMissing,
    /// Fail the run before any remote call is made.
    Abort,
}

impl StorageFaultPolicy {
    /// Parse a policy name, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "treat-as-missing" | "missing" | "create" => Some(Self::TreatAsMissing),
            "abort" | "fail" | "strict" => Some(Self::Abort),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TreatAsMissing => "treat-as-missing",
            Self::Abort => "abort",
        }
    }
}

impl fmt::Display for StorageFaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fail unless `path` is an existing regular file.
pub fn validate_attachment(path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(Error::InvalidAttachment(path.to_path_buf())),
    }
}

/// Decides between creating, updating and skipping for one identifier.
pub struct UpsertEngine<'a, T: TrackerClient + ?Sized> {
    store: &'a IdentifierStore,
    tracker: &'a T,
    storage_fault_policy: StorageFaultPolicy,
}

impl<'a, T: TrackerClient + ?Sized> UpsertEngine<'a, T> {
    pub fn new(store: &'a IdentifierStore, tracker: &'a T) -> Self {
        Self {
            store,
            tracker,
            storage_fault_policy: StorageFaultPolicy::default(),
        }
    }

    pub fn with_storage_fault_policy(mut self, policy: StorageFaultPolicy) -> Self {
        self.storage_fault_policy = policy;
        self
    }

    /// Run the upsert for `request`.
    ///
    /// Remote errors are not caught and abort the run. A failed write of a
    /// new mapping is logged and reported through `UpsertReport::persisted`.
    pub fn run(&self, request: &UpsertRequest) -> Result<UpsertReport> {
        if let Some(path) = &request.attachment {
            validate_attachment(path)?;
        }

        let Some(ticket_key) = self.lookup(&request.identifier)? else {
            return self.create(request, None);
        };

        let status = self.tracker.get_issue_status(&ticket_key)?;
        tracing::debug!(identifier = %request.identifier, key = %ticket_key, status = %status, "fetched ticket status");

        if request.is_closed_status(&status) {
            tracing::info!(key = %ticket_key, status = %status, "existing ticket is closed, creating a new one");
            return self.create(request, Some(ticket_key));
        }

        if request.skip_existing {
            tracing::info!(key = %ticket_key, "existing ticket is open, skipping");
            return Ok(UpsertReport::skipped(&request.identifier, ticket_key));
        }

        self.update(request, ticket_key)
    }

    fn lookup(&self, identifier: &str) -> Result<Option<String>> {
        match self.store.lookup(identifier) {
            Ok(key) => Ok(key),
            Err(source) => match self.storage_fault_policy {
                StorageFaultPolicy::TreatAsMissing => {
                    tracing::warn!(
                        identifier,
                        error = %source,
                        "identifier store lookup failed, treating identifier as new"
                    );
                    Ok(None)
                }
                StorageFaultPolicy::Abort => Err(Error::StorageLookup {
                    identifier: identifier.to_string(),
                    source,
                }),
            },
        }
    }

    fn update(&self, request: &UpsertRequest, ticket_key: String) -> Result<UpsertReport> {
        let attachment_added = match &request.attachment {
            Some(path) => {
                self.tracker.add_attachment(&ticket_key, path)?;
                true
            }
            None => false,
        };
        Ok(UpsertReport::updated(
            &request.identifier,
            ticket_key,
            attachment_added,
        ))
    }

    fn create(&self, request: &UpsertRequest, previous: Option<String>) -> Result<UpsertReport> {
        let issue = NewIssue {
            project_key: &request.project,
            issue_type: &request.issue_type,
            summary: &request.summary,
            labels: &request.labels,
        };
        let ticket_key = self.tracker.create_issue(&issue)?;

        // Saved before the follow-up calls so a failed upload cannot orphan the ticket.
        let persisted = match self.store.upsert(&request.identifier, &ticket_key) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    identifier = %request.identifier,
                    key = %ticket_key,
                    error = %e,
                    "could not save identifier mapping"
                );
                false
            }
        };

        let attachment_added = match &request.attachment {
            Some(path) => {
                self.tracker.add_attachment(&ticket_key, path)?;
                true
            }
            None => false,
        };

        let description_set = match &request.description {
            Some(description) => {
                self.tracker
                    .update_issue_field(&ticket_key, DESCRIPTION_FIELD, description)?;
                true
            }
            None => false,
        };

        Ok(UpsertReport {
            action: UpsertAction::Created,
            identifier: request.identifier.clone(),
            ticket_key,
            attachment_added,
            description_set,
            previous_ticket_key: previous,
            persisted,
        })
    }
}

impl CommandResult for UpsertReport {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        match self.action {
            UpsertAction::Skipped => "Issue already exists and open. Skipping.".to_string(),
            UpsertAction::Updated if !self.attachment_added => {
                "No attachment provided. Nothing to update.".to_string()
            }
            UpsertAction::Updated => String::new(),
            UpsertAction::Created => {
                let mut lines = vec![format!(
                    "Created new Jira ticket: {}. jTrack id: {}",
                    self.ticket_key, self.identifier
                )];
                if let Some(previous) = &self.previous_ticket_key {
                    lines.push(format!("Previous ticket {} is closed.", previous));
                }
                if !self.persisted {
                    lines.push(format!(
                        "Warning: could not save {} -> {}; the next run will not find this ticket.",
                        self.identifier, self.ticket_key
                    ));
                }
                lines.join("\n")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeTracker, TestEnv, TrackerCall};

    fn request() -> UpsertRequest {
        UpsertRequest::new("scan-1", "SEC", "Nightly scan findings")
    }

    // ==================== Create ====================

    #[test]
    fn test_new_identifier_creates_once_and_stores_key() {
        let store = IdentifierStore::open_in_memory().unwrap();
        let tracker = FakeTracker::new();
        let engine = UpsertEngine::new(&store, &tracker);

        let report = engine.run(&request()).unwrap();

        assert_eq!(report.action, UpsertAction::Created);
        assert_eq!(report.ticket_key, "SEC-1");
        assert!(report.persisted);
        assert_eq!(tracker.create_count(), 1);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.lookup("scan-1").unwrap(), Some("SEC-1".to_string()));
    }

    #[test]
    fn test_create_passes_issue_fields() {
        let store = IdentifierStore::open_in_memory().unwrap();
        let tracker = FakeTracker::new();
        let engine = UpsertEngine::new(&store, &tracker);
        let request = request()
            .with_issue_type("Bug")
            .with_labels(["security", "nightly"]);

        engine.run(&request).unwrap();

        assert_eq!(
            tracker.calls(),
            vec![TrackerCall::Create {
                project_key: "SEC".to_string(),
                issue_type: "Bug".to_string(),
                summary: "Nightly scan findings".to_string(),
                labels: vec!["nightly".to_string(), "security".to_string()],
            }]
        );
    }

    #[test]
    fn test_create_attaches_file_and_sets_description() {
        let env = TestEnv::new();
        let report_path = env.write_file("report.html", "<html></html>");
        let store = IdentifierStore::open_in_memory().unwrap();
        let tracker = FakeTracker::new();
        let engine = UpsertEngine::new(&store, &tracker);
        let request = request()
            .with_attachment(&report_path)
            .with_description("3 new findings");

        let report = engine.run(&request).unwrap();

        assert!(report.attachment_added);
        assert!(report.description_set);
        let calls = tracker.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[1],
            TrackerCall::Attach("SEC-1".to_string(), report_path.clone())
        );
        assert_eq!(
            calls[2],
            TrackerCall::UpdateField(
                "SEC-1".to_string(),
                "description".to_string(),
                "3 new findings".to_string()
            )
        );
    }

    #[test]
    fn test_failed_upload_after_create_keeps_mapping() {
        let env = TestEnv::new();
        let report_path = env.write_file("report.html", "<html></html>");
        let store = IdentifierStore::open_in_memory().unwrap();
        let tracker = FakeTracker::new();
        tracker.reject_attachments();
        let engine = UpsertEngine::new(&store, &tracker);
        let request = request()
            .with_attachment(&report_path)
            .with_description("3 new findings");

        let err = engine.run(&request).unwrap_err();

        assert!(matches!(
            err,
            Error::Tracker(crate::jira::TrackerError::Http(_))
        ));
        assert_eq!(store.lookup("scan-1").unwrap(), Some("SEC-1".to_string()));
        // Description is not set once the upload fails
        assert_eq!(tracker.mutation_count(), 2);

        // The rerun finds the open ticket instead of opening another one
        assert!(engine.run(&request).is_err());
        assert_eq!(tracker.create_count(), 1);
        assert_eq!(
            tracker.calls().last(),
            Some(&TrackerCall::Attach("SEC-1".to_string(), report_path.clone()))
        );
    }

    // ==================== Existing ticket ====================

    #[test]
    fn test_closed_ticket_is_replaced_and_mapping_overwritten() {
        let store = IdentifierStore::open_in_memory().unwrap();
        let tracker = FakeTracker::new();
        let engine = UpsertEngine::new(&store, &tracker);

        engine.run(&request()).unwrap();
        tracker.set_status("SEC-1", "Resolved");

        let report = engine.run(&request()).unwrap();

        assert_eq!(report.action, UpsertAction::Created);
        assert_eq!(report.ticket_key, "SEC-2");
        assert_eq!(report.previous_ticket_key, Some("SEC-1".to_string()));
        assert_eq!(tracker.create_count(), 2);
        assert_eq!(store.lookup("scan-1").unwrap(), Some("SEC-2".to_string()));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_custom_closed_statuses() {
        let store = IdentifierStore::open_in_memory().unwrap();
        let tracker = FakeTracker::new();
        let engine = UpsertEngine::new(&store, &tracker);
        let request = request().with_closed_statuses(["Done"]);

        engine.run(&request).unwrap();
        tracker.set_status("SEC-1", "Closed");
        let report = engine.run(&request).unwrap();
        assert_eq!(report.action, UpsertAction::Updated);

        tracker.set_status("SEC-1", "Done");
        let report = engine.run(&request).unwrap();
        assert_eq!(report.action, UpsertAction::Created);
    }

    #[test]
    fn test_open_ticket_with_skip_existing_is_skipped() {
        let store = IdentifierStore::open_in_memory().unwrap();
        store.upsert("scan-1", "SEC-9").unwrap();
        let tracker = FakeTracker::new();
        tracker.set_status("SEC-9", "In Progress");
        let engine = UpsertEngine::new(&store, &tracker);

        let report = engine.run(&request().with_skip_existing(true)).unwrap();

        assert_eq!(report.action, UpsertAction::Skipped);
        assert_eq!(report.ticket_key, "SEC-9");
        assert_eq!(tracker.mutation_count(), 0);
    }

    #[test]
    fn test_open_ticket_gets_attachment() {
        let env = TestEnv::new();
        let report_path = env.write_file("report.txt", "findings");
        let store = IdentifierStore::open_in_memory().unwrap();
        store.upsert("scan-1", "SEC-9").unwrap();
        let tracker = FakeTracker::new();
        tracker.set_status("SEC-9", "Open");
        let engine = UpsertEngine::new(&store, &tracker);

        let report = engine.run(&request().with_attachment(&report_path)).unwrap();

        assert_eq!(report.action, UpsertAction::Updated);
        assert!(report.attachment_added);
        assert_eq!(tracker.create_count(), 0);
        assert_eq!(
            tracker.calls(),
            vec![
                TrackerCall::Status("SEC-9".to_string()),
                TrackerCall::Attach("SEC-9".to_string(), report_path),
            ]
        );
    }

    #[test]
    fn test_open_ticket_without_attachment_makes_no_remote_change() {
        let store = IdentifierStore::open_in_memory().unwrap();
        store.upsert("scan-1", "SEC-9").unwrap();
        let tracker = FakeTracker::new();
        tracker.set_status("SEC-9", "Open");
        let engine = UpsertEngine::new(&store, &tracker);

        let report = engine
            .run(&request().with_description("ignored for existing tickets"))
            .unwrap();

        assert_eq!(report.action, UpsertAction::Updated);
        assert!(!report.attachment_added);
        assert_eq!(tracker.mutation_count(), 0);
        assert_eq!(report.to_human(), "No attachment provided. Nothing to update.");
    }

    #[test]
    fn test_second_run_with_skip_existing_is_noop() {
        let store = IdentifierStore::open_in_memory().unwrap();
        let tracker = FakeTracker::new();
        let engine = UpsertEngine::new(&store, &tracker);
        let request = request().with_skip_existing(true);

        engine.run(&request).unwrap();
        tracker.clear_calls();
        let report = engine.run(&request).unwrap();

        assert_eq!(report.action, UpsertAction::Skipped);
        assert_eq!(tracker.mutation_count(), 0);
    }

    #[test]
    fn test_remote_status_error_propagates() {
        let store = IdentifierStore::open_in_memory().unwrap();
        // Key that the fake tracker has never seen: status lookup fails
        store.upsert("scan-1", "GONE-1").unwrap();
        let tracker = FakeTracker::new();
        let engine = UpsertEngine::new(&store, &tracker);

        let err = engine.run(&request()).unwrap_err();
        assert!(matches!(
            err,
            Error::Tracker(crate::jira::TrackerError::NotFound(_))
        ));
        assert_eq!(tracker.create_count(), 0);
    }

    // ==================== Attachment validation ====================

    #[test]
    fn test_missing_attachment_fails_before_create() {
        let env = TestEnv::new();
        let store = IdentifierStore::open_in_memory().unwrap();
        let tracker = FakeTracker::new();
        let engine = UpsertEngine::new(&store, &tracker);

        let err = engine
            .run(&request().with_attachment(env.path().join("missing.html")))
            .unwrap_err();

        assert!(matches!(err, Error::InvalidAttachment(_)));
        assert!(tracker.calls().is_empty());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_missing_attachment_fails_before_update() {
        let env = TestEnv::new();
        let store = IdentifierStore::open_in_memory().unwrap();
        store.upsert("scan-1", "SEC-9").unwrap();
        let tracker = FakeTracker::new();
        tracker.set_status("SEC-9", "Open");
        let engine = UpsertEngine::new(&store, &tracker);

        let err = engine
            .run(&request().with_attachment(env.path().join("missing.html")))
            .unwrap_err();

        assert!(matches!(err, Error::InvalidAttachment(_)));
        assert!(tracker.calls().is_empty());
    }

    #[test]
    fn test_directory_is_not_a_valid_attachment() {
        let env = TestEnv::new();
        assert!(validate_attachment(env.path()).is_err());

        let file = env.write_file("ok.txt", "ok");
        assert!(validate_attachment(&file).is_ok());
    }

    // ==================== Storage faults ====================

    #[test]
    fn test_lookup_fault_treated_as_missing_by_default() {
        let store = IdentifierStore::open_in_memory().unwrap();
        store.conn().execute("DROP TABLE jira", []).unwrap();
        let tracker = FakeTracker::new();
        let engine = UpsertEngine::new(&store, &tracker);

        let report = engine.run(&request()).unwrap();

        assert_eq!(report.action, UpsertAction::Created);
        assert_eq!(tracker.create_count(), 1);
        // The write fails too; reported rather than propagated
        assert!(!report.persisted);
        assert!(report.to_human().contains("Warning: could not save"));
    }

    #[test]
    fn test_lookup_fault_aborts_with_strict_policy() {
        let store = IdentifierStore::open_in_memory().unwrap();
        store.conn().execute("DROP TABLE jira", []).unwrap();
        let tracker = FakeTracker::new();
        let engine =
            UpsertEngine::new(&store, &tracker).with_storage_fault_policy(StorageFaultPolicy::Abort);

        let err = engine.run(&request()).unwrap_err();

        assert!(matches!(err, Error::StorageLookup { .. }));
        assert!(tracker.calls().is_empty());
    }

    #[test]
    fn test_storage_fault_policy_parse() {
        assert_eq!(
            StorageFaultPolicy::parse("treat-as-missing"),
            Some(StorageFaultPolicy::TreatAsMissing)
        );
        assert_eq!(StorageFaultPolicy::parse("ABORT"), Some(StorageFaultPolicy::Abort));
        assert_eq!(StorageFaultPolicy::parse("strict"), Some(StorageFaultPolicy::Abort));
        assert_eq!(StorageFaultPolicy::parse("sometimes"), None);
        assert_eq!(StorageFaultPolicy::Abort.to_string(), "abort");
    }

    // ==================== Output ====================

    #[test]
    fn test_created_human_output() {
        let report = UpsertReport {
            action: UpsertAction::Created,
            identifier: "scan-1".to_string(),
            ticket_key: "SEC-2".to_string(),
            attachment_added: false,
            description_set: false,
            previous_ticket_key: Some("SEC-1".to_string()),
            persisted: true,
        };
        assert_eq!(
            report.to_human(),
            "Created new Jira ticket: SEC-2. jTrack id: scan-1\nPrevious ticket SEC-1 is closed."
        );
        let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(json["action"], "created");
        assert_eq!(json["previous_ticket_key"], "SEC-1");
    }

    #[test]
    fn test_skipped_human_output() {
        let report = UpsertReport::skipped("scan-1", "SEC-1");
        assert_eq!(report.to_human(), "Issue already exists and open. Skipping.");
    }
}
