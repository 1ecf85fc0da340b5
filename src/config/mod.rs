//! Configuration for jtrack.
//!
//! Settings come from KDL files (see [`schema`]), environment variables and
//! CLI flags. Precedence:
//!
//! CLI flag > environment variable > `--config` file or local `.jtrack.kdl`
//! > system `config.kdl` > built-in defaults
//!
//! ## Security
//!
//! `jira-password` may be stored in any config file. Prefer
//! `JTRACK_JIRA_PASSWORD` on shared machines; `jtrack config show` never
//! prints the password.
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ConfigLayer, ConfigOverrides, LOCAL_CONFIG_FILE, Resolved, ResolvedConfig, ValueSource,
    process_env, resolve_config,
};
pub use schema::JtrackConfig;
