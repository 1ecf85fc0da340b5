//! KDL schema for jtrack config files.
//!
//! The same schema is used for the system file, the per-directory
//! `.jtrack.kdl` file and files passed with `--config`:
//!
//! ```kdl
//! jira-url "https://example.atlassian.net"
//! jira-username "scanner-bot"
//! jira-password "api-token"
//! database "/var/lib/jtrack/jtrack.db"
//! issue-type "Bug"
//! closed-statuses "Closed" "Resolved" "Done"
//! labels "security" "nightly"
//! on-storage-error "abort"          // or "treat-as-missing"
//! timeout-secs 30
//! ```

use crate::commands::upsert::StorageFaultPolicy;
use crate::{Error, Result};
use kdl::KdlDocument;
use std::path::{Path, PathBuf};

/// Values read from one config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JtrackConfig {
    /// Jira base URL
    pub jira_url: Option<String>,

    pub jira_username: Option<String>,

    /// Password or API token (sensitive!)
    pub jira_password: Option<String>,

    /// Location of the identifier store
    pub database: Option<PathBuf>,

    /// Issue type for new tickets
    pub issue_type: Option<String>,

    /// Statuses that count as closed
    pub closed_statuses: Option<Vec<String>>,

    /// Labels for new tickets
    pub labels: Option<Vec<String>>,

    /// Raw `on-storage-error` value, checked by [`JtrackConfig::validate`]
    pub on_storage_error: Option<String>,

    /// Per-request timeout for Jira calls
    pub timeout_secs: Option<u64>,
}

impl JtrackConfig {
    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(ref policy) = self.on_storage_error {
            if StorageFaultPolicy::parse(policy).is_none() {
                return Err(format!(
                    "on-storage-error must be \"treat-as-missing\" or \"abort\", got \"{}\"",
                    policy
                ));
            }
        }
        if self.timeout_secs == Some(0) {
            return Err("timeout-secs must be greater than 0".to_string());
        }
        if let Some(ref issue_type) = self.issue_type {
            if issue_type.trim().is_empty() {
                return Err("issue-type cannot be empty".to_string());
            }
        }
        Ok(())
    }

    /// The parsed storage fault policy, if set and valid.
    pub fn storage_fault_policy(&self) -> Option<StorageFaultPolicy> {
        self.on_storage_error
            .as_deref()
            .and_then(StorageFaultPolicy::parse)
    }

    /// Parse config from a KDL document. Unknown nodes are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            jira_url: string_value(doc, "jira-url"),
            jira_username: string_value(doc, "jira-username"),
            jira_password: string_value(doc, "jira-password"),
            database: string_value(doc, "database").map(PathBuf::from),
            issue_type: string_value(doc, "issue-type"),
            closed_statuses: string_list(doc, "closed-statuses"),
            labels: string_list(doc, "labels"),
            on_storage_error: string_value(doc, "on-storage-error"),
            timeout_secs: doc
                .get("timeout-secs")
                .and_then(|node| node.entries().first())
                .and_then(|entry| entry.value().as_integer())
                .and_then(|i| u64::try_from(i).ok()),
        }
    }

    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let doc: KdlDocument = content
            .parse()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_kdl(&doc);
        config
            .validate()
            .map_err(|msg| Error::Config(format!("{}: {}", path.display(), msg)))?;
        Ok(config)
    }
}

fn string_value(doc: &KdlDocument, name: &str) -> Option<String> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .and_then(|entry| entry.value().as_string())
        .map(|s| s.to_string())
}

/// All string arguments of a node. A node without arguments counts as unset.
fn string_list(doc: &KdlDocument, name: &str) -> Option<Vec<String>> {
    let node = doc.get(name)?;
    let values: Vec<String> = node
        .entries()
        .iter()
        .filter(|entry| entry.name().is_none())
        .filter_map(|entry| entry.value().as_string())
        .map(|s| s.to_string())
        .collect();
    if values.is_empty() { None } else { Some(values) }
}
