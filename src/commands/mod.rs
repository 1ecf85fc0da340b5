//! Command implementations for the jtrack CLI.
//!
//! This module contains the business logic for each CLI command:
//! - `upsert` - Create, update or skip the ticket for an identifier
//! - `mappings` - Inspect and repair stored identifier mappings
//! - `settings` - Show resolved configuration

pub mod mappings;
pub mod settings;
pub mod upsert;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait CommandResult {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// Print a command result in the requested format.
pub fn output<T: CommandResult>(result: &T, json: bool) {
    if json {
        println!("{}", result.to_json());
    } else {
        let text = result.to_human();
        if !text.is_empty() {
            println!("{}", text);
        }
    }
}
