//! CLI argument definitions for jtrack.

use crate::config::ConfigOverrides;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Version string with the commit and build time baked in by build.rs.
const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("JTRACK_GIT_COMMIT"),
    "\nbuilt:  ",
    env!("JTRACK_BUILD_TIMESTAMP"),
);

/// jtrack - Keep exactly one Jira ticket per external identifier.
///
/// Run `jtrack upsert` from a scanner or CI job: the first run for an
/// identifier opens a ticket, later runs attach new evidence to it, and a
/// closed ticket is replaced by a fresh one.
#[derive(Parser, Debug)]
#[command(name = "jtrack")]
#[command(author, version, long_version = LONG_VERSION)]
#[command(about = "Create or update Jira tickets for external identifiers", long_about = None)]
pub struct Cli {
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Identifier store location (default: ./jtrack.db, or JTRACK_DB)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Read settings from this file only, ignoring .jtrack.kdl and the system config
    #[arg(long, global = true, value_name = "PATH", env = "JTRACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors and suppress the banner
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Do not print the banner
    #[arg(long, global = true)]
    pub no_banner: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, update or skip the Jira ticket for an identifier
    ///
    /// A new identifier, or one whose ticket is closed, gets a new ticket.
    /// An open ticket gets the attachment (if any), or is left alone with
    /// --skip-existing.
    Upsert(UpsertArgs),

    /// Inspect and repair stored identifier mappings
    Mappings {
        #[command(subcommand)]
        command: MappingCommands,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args, Debug)]
pub struct UpsertArgs {
    /// Jira project key (e.g., SEC)
    #[arg(short, long)]
    pub project: String,

    /// External identifier the ticket belongs to
    #[arg(short, long)]
    pub identifier: String,

    /// Summary for a new ticket
    #[arg(short, long)]
    pub summary: String,

    /// Description for a new ticket
    #[arg(short, long)]
    pub description: Option<String>,

    /// File to attach to the new or existing ticket
    #[arg(short, long, value_name = "FILE")]
    pub attachment: Option<PathBuf>,

    /// Labels for a new ticket
    #[arg(short, long = "label", alias = "labels", value_name = "LABEL", num_args = 0..)]
    pub labels: Option<Vec<String>>,

    /// Statuses that count as closed (default: Closed Resolved). With no values, none do
    #[arg(
        short = 'j',
        long = "closed-status",
        alias = "jira-closed-status",
        value_name = "STATUS",
        num_args = 0..
    )]
    pub closed_statuses: Option<Vec<String>>,

    /// Issue type for a new ticket (default: Task)
    #[arg(short = 't', long = "issue-type", alias = "jira-type", value_name = "TYPE")]
    pub issue_type: Option<String>,

    /// Leave an existing open ticket untouched
    #[arg(long)]
    pub skip_existing: bool,

    /// Fail instead of creating a ticket when the identifier store cannot be read
    #[arg(long)]
    pub strict_storage: bool,

    /// Jira base URL (or JTRACK_JIRA_URL)
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Jira username (or JTRACK_JIRA_USERNAME)
    #[arg(long)]
    pub username: Option<String>,

    /// Jira password or API token (or JTRACK_JIRA_PASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,
}

impl UpsertArgs {
    /// Settings given on the command line, for the config resolver.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            jira_url: self.url.clone(),
            jira_username: self.username.clone(),
            jira_password: self.password.clone(),
            issue_type: self.issue_type.clone(),
            closed_statuses: self.closed_statuses.clone(),
            labels: self.labels.clone(),
            strict_storage: self.strict_storage,
            timeout_secs: self.timeout,
            ..Default::default()
        }
    }
}

/// Mapping subcommands
#[derive(Subcommand, Debug)]
pub enum MappingCommands {
    /// List all stored mappings
    List,

    /// Show the ticket stored for an identifier
    Show {
        /// Identifier to look up
        identifier: String,
    },

    /// Point an identifier at a ticket without contacting Jira
    Set {
        /// Identifier to update
        identifier: String,

        /// Jira ticket key (e.g., SEC-42)
        ticket_key: String,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved settings and where each value came from
    Show,
}
