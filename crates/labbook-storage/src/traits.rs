//! The [`RecordStore`] trait defining the record-keeping contract.
//!
//! Three kinds of operation:
//! - **get-or-create** (`add_*`): returns the existing row for a natural key,
//!   otherwise stages a new one. Calling twice never produces two rows.
//! - **single lookups** (`get_*`): `Ok(None)` when nothing matches,
//!   [`StorageError::AmbiguousName`] when more than one row does.
//! - **list accessors**: fully materialized, filtered and ordered.
//!
//! All backends (InMemoryStore, SqliteStore) implement this trait with
//! identical semantics. The trait is synchronous; every call runs on the
//! caller's thread.

use labbook_core::records::{
    Analysis, Irradiation, IrradiationPosition, Level, MassSpectrometer, Material, Project, Sample,
};
use labbook_core::PositionId;

use crate::error::StorageError;
use crate::types::{IrradiationFilter, NameOrder, PositionDetail, PositionUpdate, SampleFilter};

/// The storage contract for labbook records.
pub trait RecordStore {
    // -------------------------------------------------------------------
    // Unit of work
    // -------------------------------------------------------------------

    /// Makes every staged change durable.
    fn commit(&mut self) -> Result<(), StorageError>;

    /// Discards every change staged since the last commit.
    fn rollback(&mut self) -> Result<(), StorageError>;

    /// Runs `f` as one unit of work: commits if it returns `Ok`, rolls back
    /// if it returns `Err`.
    fn session<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        Self: Sized,
        E: From<StorageError>,
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                self.rollback()?;
                Err(e)
            }
        }
    }

    // -------------------------------------------------------------------
    // Projects and materials
    // -------------------------------------------------------------------

    /// Get-or-create a project. The principal investigator is only recorded
    /// when the project is created.
    fn add_project(
        &mut self,
        name: &str,
        principal_investigator: Option<&str>,
    ) -> Result<Project, StorageError>;

    fn get_project(&self, name: &str) -> Result<Option<Project>, StorageError>;

    fn get_projects(&self, order: Option<NameOrder>) -> Result<Vec<Project>, StorageError>;

    /// Get-or-create a material. The grain size is only recorded when the
    /// material is created.
    fn add_material(
        &mut self,
        name: &str,
        grainsize: Option<&str>,
    ) -> Result<Material, StorageError>;

    fn get_material(&self, name: &str) -> Result<Option<Material>, StorageError>;

    /// All material names, ascending.
    fn get_material_names(&self) -> Result<Vec<String>, StorageError>;

    // -------------------------------------------------------------------
    // Samples
    // -------------------------------------------------------------------

    /// Get-or-create a sample keyed by `(name, project)`.
    ///
    /// The project must exist. The material is looked up by name and
    /// created if missing.
    fn add_sample(
        &mut self,
        name: &str,
        project: &str,
        material: Option<&str>,
    ) -> Result<Sample, StorageError>;

    fn get_sample(&self, name: &str, project: &str) -> Result<Option<Sample>, StorageError>;

    fn get_samples(&self, filter: &SampleFilter) -> Result<Vec<Sample>, StorageError>;

    /// Records the IGSN issued for a sample.
    fn set_sample_igsn(&mut self, sample: &Sample, igsn: &str) -> Result<(), StorageError>;

    // -------------------------------------------------------------------
    // Mass spectrometers
    // -------------------------------------------------------------------

    /// Get-or-create an instrument. The kind is only recorded on creation.
    fn add_mass_spectrometer(
        &mut self,
        name: &str,
        kind: &str,
    ) -> Result<MassSpectrometer, StorageError>;

    fn get_mass_spectrometers(&self) -> Result<Vec<MassSpectrometer>, StorageError>;

    // -------------------------------------------------------------------
    // Irradiations and levels
    // -------------------------------------------------------------------

    fn add_irradiation(&mut self, name: &str) -> Result<Irradiation, StorageError>;

    fn get_irradiation(&self, name: &str) -> Result<Option<Irradiation>, StorageError>;

    fn get_irradiations(
        &self,
        filter: &IrradiationFilter,
    ) -> Result<Vec<Irradiation>, StorageError>;

    /// Get-or-create a level keyed by `(irradiation, name)`. The irradiation
    /// must exist.
    fn add_irradiation_level(
        &mut self,
        irradiation: &str,
        name: &str,
        holder: Option<&str>,
        z: Option<f64>,
        note: &str,
    ) -> Result<Level, StorageError>;

    fn get_irradiation_level(
        &self,
        irradiation: &str,
        name: &str,
    ) -> Result<Option<Level>, StorageError>;

    /// Levels of an irradiation, ascending by name.
    fn get_levels(&self, irradiation: &str) -> Result<Vec<Level>, StorageError>;

    // -------------------------------------------------------------------
    // Positions
    // -------------------------------------------------------------------

    /// Get-or-create the position row for a hole. The level must exist.
    fn add_irradiation_position(
        &mut self,
        irradiation: &str,
        level: &str,
        position: u32,
    ) -> Result<IrradiationPosition, StorageError>;

    fn get_irradiation_position(
        &self,
        irradiation: &str,
        level: &str,
        position: u32,
    ) -> Result<Option<IrradiationPosition>, StorageError>;

    /// All positions of a level joined with their sample chain, ascending by
    /// hole.
    fn get_level_positions(
        &self,
        irradiation: &str,
        level: &str,
    ) -> Result<Vec<PositionDetail>, StorageError>;

    /// The position currently carrying `identifier`.
    fn get_identifier(&self, identifier: &str) -> Result<Option<PositionDetail>, StorageError>;

    fn update_position(
        &mut self,
        id: PositionId,
        update: &PositionUpdate,
    ) -> Result<IrradiationPosition, StorageError>;

    /// Deletes the position row for a hole. Returns false if there was none.
    fn remove_irradiation_position(
        &mut self,
        irradiation: &str,
        level: &str,
        position: u32,
    ) -> Result<bool, StorageError>;

    // -------------------------------------------------------------------
    // Analyses
    // -------------------------------------------------------------------

    /// Get-or-create an analysis of the position carrying `identifier`.
    fn add_analysis(&mut self, identifier: &str, aliquot: u32) -> Result<Analysis, StorageError>;
}
