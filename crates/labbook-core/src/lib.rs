//! Domain model for the irradiation labbook.
//!
//! Holds the persisted record types, their id newtypes, flux values, the
//! editable [`IrradiatedPosition`] view object and the lab-identifier
//! allocator. Nothing in this crate performs I/O.

pub mod error;
pub mod flux;
pub mod id;
pub mod identifier;
pub mod position;
pub mod records;

// Re-export commonly used types
pub use error::CoreError;
pub use flux::FluxValue;
pub use id::{
    AnalysisId, IrradiationId, LevelId, MassSpectrometerId, MaterialId, PositionId, ProjectId,
    SampleId,
};
pub use identifier::allocate_next;
pub use position::{FillState, IrradiatedPosition, Rgb};
pub use records::{
    Analysis, Irradiation, IrradiationPosition, Level, MassSpectrometer, Material, Project, Sample,
};
