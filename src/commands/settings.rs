//! `jtrack config show`: resolved settings and where they came from.

use crate::commands::CommandResult;
use crate::config::{Resolved, ResolvedConfig};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SettingEntry {
    pub key: &'static str,
    /// None when the setting is unset
    pub value: Option<String>,
    pub source: Option<String>,
}

impl SettingEntry {
    fn from_resolved<T>(
        key: &'static str,
        resolved: Option<&Resolved<T>>,
        fmt: impl Fn(&T) -> String,
    ) -> Self {
        Self {
            key,
            value: resolved.map(|r| fmt(&r.value)),
            source: resolved.map(|r| r.source.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigShow {
    pub settings: Vec<SettingEntry>,
}

impl CommandResult for ConfigShow {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        let width = self.settings.iter().map(|s| s.key.len()).max().unwrap_or(0);
        self.settings
            .iter()
            .map(|s| match (&s.value, &s.source) {
                (Some(value), Some(source)) => {
                    format!("{:width$}  {}  ({})", s.key, value, source, width = width)
                }
                _ => format!("{:width$}  (unset)", s.key, width = width),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Describe the resolved settings. The password is masked.
pub fn config_show(config: &ResolvedConfig) -> ConfigShow {
    let text = |s: &String| s.clone();
    let list = |v: &Vec<String>| v.join(", ");

    let password = SettingEntry {
        key: "jira-password",
        value: config.masked_password(),
        source: config.jira_password.as_ref().map(|r| r.source.to_string()),
    };

    ConfigShow {
        settings: vec![
            SettingEntry::from_resolved("jira-url", config.jira_url.as_ref(), text),
            SettingEntry::from_resolved("jira-username", config.jira_username.as_ref(), text),
            password,
            SettingEntry::from_resolved("database", Some(&config.database), |p| {
                p.display().to_string()
            }),
            SettingEntry::from_resolved("issue-type", Some(&config.issue_type), text),
            SettingEntry::from_resolved("closed-statuses", Some(&config.closed_statuses), list),
            SettingEntry::from_resolved("labels", Some(&config.labels), list),
            SettingEntry::from_resolved(
                "on-storage-error",
                Some(&config.storage_fault_policy),
                |p| p.to_string(),
            ),
            SettingEntry::from_resolved("timeout-secs", config.timeout_secs.as_ref(), |t| {
                t.to_string()
            }),
        ],
    }
}
