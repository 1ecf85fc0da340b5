//! jtrack - Create or update Jira tickets for external identifiers.
//!
//! This library provides the core functionality for the `jtrack` CLI tool:
//! a local SQLite table that remembers which Jira ticket belongs to which
//! identifier, and the upsert logic that decides between creating a new
//! ticket, updating an open one, or skipping.

pub mod cli;
pub mod commands;
pub mod config;
pub mod jira;
pub mod logging;
pub mod models;
pub mod storage;

use std::path::PathBuf;

pub use commands::upsert::{StorageFaultPolicy, UpsertEngine, validate_attachment};
pub use jira::{JiraClient, NewIssue, TrackerClient, TrackerError};
pub use models::{IdentifierRecord, UpsertAction, UpsertReport, UpsertRequest};
pub use storage::IdentifierStore;


/// Library-level error type for jtrack operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Could not read identifier store for '{identifier}': {source}")]
    StorageLookup {
        identifier: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Jira error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Attachment does not exist or is not a regular file: {}", .0.display())]
    InvalidAttachment(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for jtrack operations.
pub type Result<T> = std::result::Result<T, Error>;
