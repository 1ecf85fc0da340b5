//! Precedence resolution for jtrack settings.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`JTRACK_JIRA_URL`, `JTRACK_JIRA_USERNAME`,
//!    `JTRACK_JIRA_PASSWORD`, `JTRACK_DB`), then the older `JIRA_URL`,
//!    `JIRA_USER` and `JIRA_PASSWORD`
//! 3. Explicit `--config` file, which replaces the two files below
//! 4. Local `.jtrack.kdl` in the working directory
//! 5. System `config.kdl` (`~/.config/jtrack/config.kdl`, or
//!    `$JTRACK_CONFIG_DIR/config.kdl`)
//! 6. Built-in defaults
//!
//! Environment lookups go through a closure so tests never touch the
//! process environment.

use crate::commands::upsert::StorageFaultPolicy;
use crate::config::schema::JtrackConfig;
use crate::jira::JiraConnection;
use crate::models::{DEFAULT_CLOSED_STATUSES, DEFAULT_ISSUE_TYPE};
use crate::storage::DEFAULT_DB_FILE;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const JIRA_URL_ENV: &str = "JTRACK_JIRA_URL";
pub const JIRA_USERNAME_ENV: &str = "JTRACK_JIRA_USERNAME";
pub const JIRA_PASSWORD_ENV: &str = "JTRACK_JIRA_PASSWORD";
pub const DATABASE_ENV: &str = "JTRACK_DB";
/// Older names for the Jira variables, read when the `JTRACK_` ones are unset.
pub const LEGACY_JIRA_URL_ENV: &str = "JIRA_URL";
pub const LEGACY_JIRA_USERNAME_ENV: &str = "JIRA_USER";
pub const LEGACY_JIRA_PASSWORD_ENV: &str = "JIRA_PASSWORD";
/// Overrides the directory holding the system config file.
pub const CONFIG_DIR_ENV: &str = "JTRACK_CONFIG_DIR";

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = ".jtrack.kdl";
/// Name of the system config file inside the config directory.
pub const SYSTEM_CONFIG_FILE: &str = "config.kdl";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from CLI flag
    CliFlag,
    /// Value from a file passed with `--config`
    ConfigFile(PathBuf),
    /// Value from `.jtrack.kdl` in the working directory
    Local,
    /// Value from the system config file
    System,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::ConfigFile(path) => write!(f, "file:{}", path.display()),
            ValueSource::Local => write!(f, "local"),
            ValueSource::System => write!(f, "system"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// One config file together with where it was found.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub source: ValueSource,
    pub config: JtrackConfig,
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub jira_url: Option<String>,
    pub jira_username: Option<String>,
    pub jira_password: Option<String>,
    pub database: Option<PathBuf>,
    pub issue_type: Option<String>,
    pub closed_statuses: Option<Vec<String>>,
    pub labels: Option<Vec<String>>,
    /// `--strict-storage`: abort on lookup faults
    pub strict_storage: bool,
    pub timeout_secs: Option<u64>,
    /// `--config`: use only this file
    pub config_file: Option<PathBuf>,
}

/// Fully resolved settings with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub jira_url: Option<Resolved<String>>,
    pub jira_username: Option<Resolved<String>>,
    pub jira_password: Option<Resolved<String>>,
    pub database: Resolved<PathBuf>,
    pub issue_type: Resolved<String>,
    pub closed_statuses: Resolved<Vec<String>>,
    pub labels: Resolved<Vec<String>>,
    pub storage_fault_policy: Resolved<StorageFaultPolicy>,
    pub timeout_secs: Option<Resolved<u64>>,
}

impl ResolvedConfig {
    /// Connection parameters for Jira.
    ///
    /// Fails with a configuration error naming the first missing setting.
    pub fn jira_connection(&self) -> Result<JiraConnection> {
        let base_url = require(&self.jira_url, "Jira URL", "--url", JIRA_URL_ENV, "jira-url")?;
        let username = require(
            &self.jira_username,
            "Jira username",
            "--username",
            JIRA_USERNAME_ENV,
            "jira-username",
        )?;
        let password = require(
            &self.jira_password,
            "Jira password",
            "--password",
            JIRA_PASSWORD_ENV,
            "jira-password",
        )?;

        Ok(JiraConnection {
            base_url,
            username,
            password,
            timeout: self
                .timeout_secs
                .as_ref()
                .map(|r| Duration::from_secs(r.value)),
        })
    }

    /// The password replaced by asterisks, for display.
    pub fn masked_password(&self) -> Option<String> {
        self.jira_password.as_ref().map(|_| "********".to_string())
    }
}

fn require(
    value: &Option<Resolved<String>>,
    what: &str,
    flag: &str,
    env: &str,
    key: &str,
) -> Result<String> {
    value.as_ref().map(|r| r.value.clone()).ok_or_else(|| {
        Error::Config(format!(
            "{} is not configured. Pass {}, set {} or add `{}` to {}",
            what, flag, env, key, LOCAL_CONFIG_FILE
        ))
    })
}

/// Read a variable from the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Directory holding the system config file.
pub fn system_config_dir(env: &dyn Fn(&str) -> Option<String>) -> Option<PathBuf> {
    match env(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        Some(dir) => Some(PathBuf::from(dir)),
        None => dirs::config_dir().map(|d| d.join("jtrack")),
    }
}

/// Load the config files that apply, highest precedence first.
pub fn load_layers(
    explicit: Option<&Path>,
    working_dir: &Path,
    system_dir: Option<&Path>,
) -> Result<Vec<ConfigLayer>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(vec![ConfigLayer {
            source: ValueSource::ConfigFile(path.to_path_buf()),
            config: JtrackConfig::load(path)?,
        }]);
    }

    let mut layers = Vec::new();
    let local_path = working_dir.join(LOCAL_CONFIG_FILE);
    if local_path.is_file() {
        tracing::debug!(path = %local_path.display(), "loading local config");
        layers.push(ConfigLayer {
            source: ValueSource::Local,
            config: JtrackConfig::load(&local_path)?,
        });
    }
    if let Some(dir) = system_dir {
        let system_path = dir.join(SYSTEM_CONFIG_FILE);
        if system_path.is_file() {
            tracing::debug!(path = %system_path.display(), "loading system config");
            layers.push(ConfigLayer {
                source: ValueSource::System,
                config: JtrackConfig::load(&system_path)?,
            });
        }
    }
    Ok(layers)
}

/// First value found in CLI, then env, then file layers.
fn pick<T>(
    cli: Option<T>,
    env: Option<Resolved<T>>,
    layers: &[ConfigLayer],
    field: impl Fn(&JtrackConfig) -> Option<T>,
) -> Option<Resolved<T>> {
    if let Some(value) = cli {
        return Some(Resolved::new(value, ValueSource::CliFlag));
    }
    if env.is_some() {
        return env;
    }
    layers.iter().find_map(|layer| {
        field(&layer.config).map(|value| Resolved::new(value, layer.source.clone()))
    })
}

fn from_env(env: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<Resolved<String>> {
    env(name)
        .filter(|v| !v.is_empty())
        .map(|v| Resolved::new(v, ValueSource::EnvVar(name.to_string())))
}

/// Resolve settings from already loaded layers.
pub fn resolve_layers(
    overrides: &ConfigOverrides,
    layers: &[ConfigLayer],
    env: &dyn Fn(&str) -> Option<String>,
) -> ResolvedConfig {
    let jira_url = pick(
        overrides.jira_url.clone(),
        from_env(env, JIRA_URL_ENV).or_else(|| from_env(env, LEGACY_JIRA_URL_ENV)),
        layers,
        |c| c.jira_url.clone(),
    );
    let jira_username = pick(
        overrides.jira_username.clone(),
        from_env(env, JIRA_USERNAME_ENV).or_else(|| from_env(env, LEGACY_JIRA_USERNAME_ENV)),
        layers,
        |c| c.jira_username.clone(),
    );
    let jira_password = pick(
        overrides.jira_password.clone(),
        from_env(env, JIRA_PASSWORD_ENV).or_else(|| from_env(env, LEGACY_JIRA_PASSWORD_ENV)),
        layers,
        |c| c.jira_password.clone(),
    );

    let database = pick(
        overrides.database.clone(),
        from_env(env, DATABASE_ENV).map(|r| Resolved::new(PathBuf::from(r.value), r.source)),
        layers,
        |c| c.database.clone(),
    )
    .unwrap_or_else(|| Resolved::new(PathBuf::from(DEFAULT_DB_FILE), ValueSource::Default));

    let issue_type = pick(overrides.issue_type.clone(), None, layers, |c| {
        c.issue_type.clone()
    })
    .unwrap_or_else(|| Resolved::new(DEFAULT_ISSUE_TYPE.to_string(), ValueSource::Default));

    let closed_statuses = pick(overrides.closed_statuses.clone(), None, layers, |c| {
        c.closed_statuses.clone()
    })
    .unwrap_or_else(|| {
        Resolved::new(
            DEFAULT_CLOSED_STATUSES.iter().map(|s| s.to_string()).collect(),
            ValueSource::Default,
        )
    });

    let labels = pick(overrides.labels.clone(), None, layers, |c| c.labels.clone())
        .unwrap_or_else(|| Resolved::new(Vec::new(), ValueSource::Default));

    let strict = overrides.strict_storage.then_some(StorageFaultPolicy::Abort);
    let storage_fault_policy = pick(strict, None, layers, |c| c.storage_fault_policy())
        .unwrap_or_else(|| Resolved::new(StorageFaultPolicy::default(), ValueSource::Default));

    let timeout_secs = pick(overrides.timeout_secs, None, layers, |c| c.timeout_secs);

    ResolvedConfig {
        jira_url,
        jira_username,
        jira_password,
        database,
        issue_type,
        closed_statuses,
        labels,
        storage_fault_policy,
        timeout_secs,
    }
}

/// Resolve settings with the full precedence chain.
pub fn resolve_config(
    overrides: &ConfigOverrides,
    working_dir: &Path,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let system_dir = system_config_dir(env);
    let layers = load_layers(
        overrides.config_file.as_deref(),
        working_dir,
        system_dir.as_deref(),
    )?;
    Ok(resolve_layers(overrides, &layers, env))
}
