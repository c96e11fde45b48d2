//! The labnumber-entry workflow.
//!
//! An [`EntrySession`] holds the editable positions of one irradiation
//! level. It is loaded through the [`sync`] module, validated and saved
//! against any [`labbook_storage::RecordStore`], backed up to YAML, and
//! tracks unsaved edits by comparing content hashes against the last
//! snapshot. The [`labbook`] module renders irradiations to PDF.

pub mod backup;
pub mod config;
pub mod dirty;
pub mod error;
pub mod labbook;
pub mod services;
pub mod session;
pub mod sync;

pub use config::EntryConfig;
pub use dirty::DirtySet;
pub use error::{ConfigError, EntryError, ValidationIssue};
pub use labbook::{collect_labbook, render_pdf, write_pdf, Labbook};
pub use services::{IgsnService, MassSpecBridge, ServiceRegistry};
pub use session::{
    add_irradiation_with_defaults, apply_flux_to_irradiation, auto_increment_irradiation,
    status_report, EntrySession, PositionAttr, Progress, SampleChoice, SaveReport, StatusEntry,
};
pub use sync::{sync_level, sync_position, LevelSync, SyncFailure};
