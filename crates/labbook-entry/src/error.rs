//! Error types for the entry workflow.
//!
//! [`EntryError`] is what a save, backup or service call reports back to
//! the operator. Nothing here is fatal: every variant describes an aborted
//! operation and the caller decides how to present it.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use labbook_core::CoreError;
use labbook_storage::StorageError;

use crate::sync::SyncFailure;

/// One position that cannot be saved as entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub hole: u32,
    pub identifier: String,
    pub missing: Vec<&'static str>,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Position={} L#={}\n    {}",
            self.hole,
            self.identifier,
            self.missing.join(", ")
        )
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors produced by entry-session operations.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Sync(#[from] SyncFailure),

    /// Positions are missing required information; nothing was saved.
    #[error("Missing Information\n{}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// The identifier is already bound to a position in another irradiation.
    #[error("Labnumber {identifier} already exists in Irradiation {irradiation}")]
    IdentifierCollision {
        identifier: String,
        irradiation: String,
    },

    /// An optional external service is not configured.
    #[error("{0} is not available")]
    ServiceUnavailable(String),

    /// An external service was reachable but refused the request.
    #[error("{service} failed: {reason}")]
    ServiceFailed { service: String, reason: String },

    /// The operation needs a current irradiation and level.
    #[error("no irradiation level selected")]
    NoLevelSelected,

    /// No backup exists for the current level.
    #[error("no recover file {0}")]
    NoBackup(PathBuf),

    /// The labbook PDF could not be produced.
    #[error("failed to render PDF: {0}")]
    Report(String),

    /// Identifier generation needs a flux-monitor sample name.
    #[error("no monitor name set; set one before generating identifiers, e.g. \"FC-2\"")]
    NoMonitorName,
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {0} does not exist")]
    BadFilePath(PathBuf),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_position() {
        let err = EntryError::Validation(vec![
            ValidationIssue {
                hole: 1,
                identifier: "100".into(),
                missing: vec!["No sample", "No project"],
            },
            ValidationIssue {
                hole: 4,
                identifier: "103".into(),
                missing: vec!["No material"],
            },
        ]);
        assert_eq!(
            err.to_string(),
            "Missing Information\nPosition=1 L#=100\n    No sample, No project\nPosition=4 L#=103\n    No material"
        );
    }

    #[test]
    fn collision_names_owning_irradiation() {
        let err = EntryError::IdentifierCollision {
            identifier: "66000".into(),
            irradiation: "NM-272".into(),
        };
        assert_eq!(
            err.to_string(),
            "Labnumber 66000 already exists in Irradiation NM-272"
        );
    }
}
