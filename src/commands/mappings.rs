//! Inspect and repair stored identifier → ticket mappings.

use crate::commands::CommandResult;
use crate::models::IdentifierRecord;
use crate::storage::IdentifierStore;
use crate::{Error, Result};
use serde::Serialize;

#[derive(Serialize)]
pub struct MappingList {
    pub count: usize,
    pub mappings: Vec<IdentifierRecord>,
}

impl CommandResult for MappingList {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        if self.mappings.is_empty() {
            return "No mappings stored.".to_string();
        }

        let width = self
            .mappings
            .iter()
            .map(|m| m.identifier.len())
            .max()
            .unwrap_or(0);
        let mut lines = vec![format!("{} mapping(s):", self.count)];
        for m in &self.mappings {
            lines.push(format!(
                "  {:width$}  {}",
                m.identifier,
                m.ticket_key,
                width = width
            ));
        }
        lines.join("\n")
    }
}

/// List all stored mappings.
pub fn mapping_list(store: &IdentifierStore) -> Result<MappingList> {
    let mappings = store.list()?;
    Ok(MappingList {
        count: mappings.len(),
        mappings,
    })
}

impl CommandResult for IdentifierRecord {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        format!("{} -> {}", self.identifier, self.ticket_key)
    }
}

/// Show the ticket stored for one identifier.
pub fn mapping_show(store: &IdentifierStore, identifier: &str) -> Result<IdentifierRecord> {
    match store.lookup(identifier)? {
        Some(ticket_key) => Ok(IdentifierRecord::new(identifier, ticket_key)),
        None => Err(Error::NotFound(format!(
            "No ticket stored for identifier '{}'",
            identifier
        ))),
    }
}

#[derive(Serialize)]
pub struct MappingSet {
    pub identifier: String,
    pub ticket_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_ticket_key: Option<String>,
}

impl CommandResult for MappingSet {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        match &self.previous_ticket_key {
            Some(previous) if previous == &self.ticket_key => {
                format!("{} already maps to {}", self.identifier, self.ticket_key)
            }
            Some(previous) => format!(
                "Mapped {} -> {} (was {})",
                self.identifier, self.ticket_key, previous
            ),
            None => format!("Mapped {} -> {}", self.identifier, self.ticket_key),
        }
    }
}

/// Point an identifier at a ticket without contacting Jira.
///
/// The identifier is stored exactly as given so that `upsert` finds it.
pub fn mapping_set(
    store: &IdentifierStore,
    identifier: &str,
    ticket_key: &str,
) -> Result<MappingSet> {
    let ticket_key = ticket_key.trim();
    if identifier.trim().is_empty() {
        return Err(Error::Config("Identifier cannot be empty".to_string()));
    }
    if ticket_key.is_empty() {
        return Err(Error::Config("Ticket key cannot be empty".to_string()));
    }

    let previous_ticket_key = store.lookup(identifier)?;
    store.upsert(identifier, ticket_key)?;
    tracing::info!(identifier, key = ticket_key, "mapping updated by hand");

    Ok(MappingSet {
        identifier: identifier.to_string(),
        ticket_key: ticket_key.to_string(),
        previous_ticket_key,
    })
}
