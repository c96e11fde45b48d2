//! Storage for the irradiation labbook.
//!
//! Provides the [`RecordStore`] trait defining the record-keeping contract,
//! the [`SqliteStore`] and [`InMemoryStore`] backends, and the flat-file
//! [`MetaRepository`] that holds tray geometry, flux values and
//! irradiation chronologies.
//!
//! # Unit of work
//!
//! Mutations are staged and only become durable on
//! [`RecordStore::commit`]. [`RecordStore::session`] wraps a closure in a
//! bounded unit of work: commit on `Ok`, rollback on `Err`.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: filters, ordering and joined position rows
//! - [`traits`]: RecordStore trait definition
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: SQL migrations and connection setup
//! - [`sqlite`]: SqliteStore implementation
//! - [`meta`]: MetaRepository trait and its filesystem backend

pub mod error;
pub mod memory;
pub mod meta;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use error::StorageError;
pub use memory::InMemoryStore;
pub use meta::{Chronology, Dose, FluxEntry, FsMetaRepository, Hole, MetaRepository};
pub use sqlite::SqliteStore;
pub use traits::RecordStore;
pub use types::{IrradiationFilter, NameOrder, PositionDetail, PositionUpdate, SampleFilter};
