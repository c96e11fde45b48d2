//! In-memory implementation of [`RecordStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests and dry runs. It
//! keeps two copies of every table: the committed state and the working
//! state that mutations stage into. Commit copies working over committed,
//! rollback the reverse. Semantics match the SQLite backend.

use std::collections::BTreeMap;

use labbook_core::records::{
    Analysis, Irradiation, IrradiationPosition, Level, MassSpectrometer, Material, Project, Sample,
};
use labbook_core::{
    AnalysisId, IrradiationId, LevelId, MassSpectrometerId, MaterialId, PositionId, ProjectId,
    SampleId,
};

use crate::error::StorageError;
use crate::traits::RecordStore;
use crate::types::{
    at_most_one, IrradiationFilter, NameOrder, PositionDetail, PositionUpdate, SampleFilter,
};

/// All tables, keyed by row id. `BTreeMap` keeps unordered listings in
/// insertion (id) order, like the SQLite backend.
#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: i64,
    projects: BTreeMap<i64, Project>,
    materials: BTreeMap<i64, Material>,
    samples: BTreeMap<i64, Sample>,
    mass_spectrometers: BTreeMap<i64, MassSpectrometer>,
    irradiations: BTreeMap<i64, Irradiation>,
    levels: BTreeMap<i64, Level>,
    positions: BTreeMap<i64, IrradiationPosition>,
    analyses: BTreeMap<i64, Analysis>,
}

impl Tables {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory implementation of [`RecordStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    committed: Tables,
    working: Tables,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn require_level(&self, irradiation: &str, level: &str) -> Result<Level, StorageError> {
        if self.get_irradiation(irradiation)?.is_none() {
            return Err(StorageError::IrradiationNotFound(irradiation.to_string()));
        }
        self.get_irradiation_level(irradiation, level)?
            .ok_or_else(|| StorageError::LevelNotFound {
                irradiation: irradiation.to_string(),
                level: level.to_string(),
            })
    }

    fn detail(&self, position: &IrradiationPosition) -> Result<PositionDetail, StorageError> {
        let t = &self.working;
        let level = t.levels.get(&position.level.0).ok_or_else(|| {
            StorageError::IntegrityError {
                reason: format!("position {} references missing level", position.id),
            }
        })?;
        let irradiation = t.irradiations.get(&level.irradiation.0).ok_or_else(|| {
            StorageError::IntegrityError {
                reason: format!("level {} references missing irradiation", level.id),
            }
        })?;
        let sample = position.sample.and_then(|id| t.samples.get(&id.0));
        let material = sample
            .and_then(|s| s.material)
            .and_then(|id| t.materials.get(&id.0));
        let project = sample.and_then(|s| t.projects.get(&s.project.0));
        let analysis_count = t
            .analyses
            .values()
            .filter(|a| a.position == position.id)
            .count() as u32;

        Ok(PositionDetail {
            position: position.clone(),
            irradiation: irradiation.name.clone(),
            level: level.name.clone(),
            sample: sample.map(|s| s.name.clone()),
            material: material.map(|m| m.name.clone()),
            grainsize: material.and_then(|m| m.grainsize.clone()),
            project: project.map(|p| p.name.clone()),
            principal_investigator: project.and_then(|p| p.principal_investigator.clone()),
            igsn: sample.and_then(|s| s.igsn.clone()),
            analysis_count,
        })
    }
}

impl RecordStore for InMemoryStore {
    fn commit(&mut self) -> Result<(), StorageError> {
        self.committed = self.working.clone();
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        self.working = self.committed.clone();
        Ok(())
    }

    fn add_project(
        &mut self,
        name: &str,
        principal_investigator: Option<&str>,
    ) -> Result<Project, StorageError> {
        if let Some(existing) = self.get_project(name)? {
            return Ok(existing);
        }
        let id = self.working.allocate();
        let project = Project {
            id: ProjectId(id),
            name: name.to_string(),
            principal_investigator: principal_investigator.map(str::to_string),
        };
        self.working.projects.insert(id, project.clone());
        Ok(project)
    }

    fn get_project(&self, name: &str) -> Result<Option<Project>, StorageError> {
        let rows = self
            .working
            .projects
            .values()
            .filter(|p| p.name == name)
            .cloned()
            .collect();
        at_most_one("project", name, rows)
    }

    fn get_projects(&self, order: Option<NameOrder>) -> Result<Vec<Project>, StorageError> {
        let mut projects: Vec<Project> = self.working.projects.values().cloned().collect();
        if let Some(order) = order {
            order.sort_by_name(&mut projects, |p| p.name.as_str());
        }
        Ok(projects)
    }

    fn add_material(
        &mut self,
        name: &str,
        grainsize: Option<&str>,
    ) -> Result<Material, StorageError> {
        if let Some(existing) = self.get_material(name)? {
            return Ok(existing);
        }
        let id = self.working.allocate();
        let material = Material {
            id: MaterialId(id),
            name: name.to_string(),
            grainsize: grainsize.map(str::to_string),
        };
        self.working.materials.insert(id, material.clone());
        Ok(material)
    }

    fn get_material(&self, name: &str) -> Result<Option<Material>, StorageError> {
        let rows = self
            .working
            .materials
            .values()
            .filter(|m| m.name == name)
            .cloned()
            .collect();
        at_most_one("material", name, rows)
    }

    fn get_material_names(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self
            .working
            .materials
            .values()
            .map(|m| m.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn add_sample(
        &mut self,
        name: &str,
        project: &str,
        material: Option<&str>,
    ) -> Result<Sample, StorageError> {
        if let Some(existing) = self.get_sample(name, project)? {
            return Ok(existing);
        }
        let project_row = self
            .get_project(project)?
            .ok_or_else(|| StorageError::ProjectNotFound(project.to_string()))?;
        let material_id = match material {
            Some(material) => Some(self.add_material(material, None)?.id),
            None => None,
        };
        let id = self.working.allocate();
        let sample = Sample {
            id: SampleId(id),
            name: name.to_string(),
            project: project_row.id,
            material: material_id,
            igsn: None,
        };
        self.working.samples.insert(id, sample.clone());
        Ok(sample)
    }

    fn get_sample(&self, name: &str, project: &str) -> Result<Option<Sample>, StorageError> {
        let Some(project_row) = self.get_project(project)? else {
            return Ok(None);
        };
        let rows = self
            .working
            .samples
            .values()
            .filter(|s| s.name == name && s.project == project_row.id)
            .cloned()
            .collect();
        at_most_one("sample", name, rows)
    }

    fn get_samples(&self, filter: &SampleFilter) -> Result<Vec<Sample>, StorageError> {
        let project_ids: Vec<ProjectId> = self
            .working
            .projects
            .values()
            .filter(|p| filter.projects.contains(&p.name))
            .map(|p| p.id)
            .collect();
        let mut samples: Vec<Sample> = self
            .working
            .samples
            .values()
            .filter(|s| filter.projects.is_empty() || project_ids.contains(&s.project))
            .cloned()
            .collect();
        if let Some(order) = filter.order {
            order.sort_by_name(&mut samples, |s| s.name.as_str());
        }
        Ok(samples)
    }

    fn set_sample_igsn(&mut self, sample: &Sample, igsn: &str) -> Result<(), StorageError> {
        let row = self.working.samples.get_mut(&sample.id.0).ok_or_else(|| {
            StorageError::IntegrityError {
                reason: format!("sample {} vanished before its IGSN was stored", sample.id),
            }
        })?;
        row.igsn = Some(igsn.to_string());
        Ok(())
    }

    fn add_mass_spectrometer(
        &mut self,
        name: &str,
        kind: &str,
    ) -> Result<MassSpectrometer, StorageError> {
        let rows = self
            .working
            .mass_spectrometers
            .values()
            .filter(|m| m.name == name)
            .cloned()
            .collect();
        if let Some(existing) = at_most_one("mass spectrometer", name, rows)? {
            return Ok(existing);
        }
        let id = self.working.allocate();
        let ms = MassSpectrometer {
            id: MassSpectrometerId(id),
            name: name.to_string(),
            kind: kind.to_string(),
        };
        self.working.mass_spectrometers.insert(id, ms.clone());
        Ok(ms)
    }

    fn get_mass_spectrometers(&self) -> Result<Vec<MassSpectrometer>, StorageError> {
        Ok(self.working.mass_spectrometers.values().cloned().collect())
    }

    fn add_irradiation(&mut self, name: &str) -> Result<Irradiation, StorageError> {
        if let Some(existing) = self.get_irradiation(name)? {
            return Ok(existing);
        }
        let id = self.working.allocate();
        let irradiation = Irradiation {
            id: IrradiationId(id),
            name: name.to_string(),
        };
        self.working.irradiations.insert(id, irradiation.clone());
        Ok(irradiation)
    }

    fn get_irradiation(&self, name: &str) -> Result<Option<Irradiation>, StorageError> {
        let rows = self
            .working
            .irradiations
            .values()
            .filter(|i| i.name == name)
            .cloned()
            .collect();
        at_most_one("irradiation", name, rows)
    }

    fn get_irradiations(
        &self,
        filter: &IrradiationFilter,
    ) -> Result<Vec<Irradiation>, StorageError> {
        let mut irradiations: Vec<Irradiation> = self
            .working
            .irradiations
            .values()
            .filter(|i| filter.matches(&i.name))
            .cloned()
            .collect();
        if let Some(order) = filter.order {
            order.sort_by_name(&mut irradiations, |i| i.name.as_str());
        }
        if let Some(limit) = filter.limit {
            irradiations.truncate(limit);
        }
        Ok(irradiations)
    }

    fn add_irradiation_level(
        &mut self,
        irradiation: &str,
        name: &str,
        holder: Option<&str>,
        z: Option<f64>,
        note: &str,
    ) -> Result<Level, StorageError> {
        let irradiation_row = self
            .get_irradiation(irradiation)?
            .ok_or_else(|| StorageError::IrradiationNotFound(irradiation.to_string()))?;
        if let Some(existing) = self.get_irradiation_level(irradiation, name)? {
            return Ok(existing);
        }
        let id = self.working.allocate();
        let level = Level {
            id: LevelId(id),
            irradiation: irradiation_row.id,
            name: name.to_string(),
            holder: holder.map(str::to_string),
            z,
            note: note.to_string(),
        };
        self.working.levels.insert(id, level.clone());
        Ok(level)
    }

    fn get_irradiation_level(
        &self,
        irradiation: &str,
        name: &str,
    ) -> Result<Option<Level>, StorageError> {
        let Some(irradiation_row) = self.get_irradiation(irradiation)? else {
            return Ok(None);
        };
        let rows = self
            .working
            .levels
            .values()
            .filter(|l| l.irradiation == irradiation_row.id && l.name == name)
            .cloned()
            .collect();
        at_most_one("level", name, rows)
    }

    fn get_levels(&self, irradiation: &str) -> Result<Vec<Level>, StorageError> {
        let Some(irradiation_row) = self.get_irradiation(irradiation)? else {
            return Ok(Vec::new());
        };
        let mut levels: Vec<Level> = self
            .working
            .levels
            .values()
            .filter(|l| l.irradiation == irradiation_row.id)
            .cloned()
            .collect();
        NameOrder::Asc.sort_by_name(&mut levels, |l| l.name.as_str());
        Ok(levels)
    }

    fn add_irradiation_position(
        &mut self,
        irradiation: &str,
        level: &str,
        position: u32,
    ) -> Result<IrradiationPosition, StorageError> {
        let level_row = self.require_level(irradiation, level)?;
        if let Some(existing) = self.get_irradiation_position(irradiation, level, position)? {
            return Ok(existing);
        }
        let id = self.working.allocate();
        let row = IrradiationPosition {
            id: PositionId(id),
            level: level_row.id,
            position,
            identifier: None,
            sample: None,
            weight: 0.0,
            note: String::new(),
        };
        self.working.positions.insert(id, row.clone());
        Ok(row)
    }

    fn get_irradiation_position(
        &self,
        irradiation: &str,
        level: &str,
        position: u32,
    ) -> Result<Option<IrradiationPosition>, StorageError> {
        let Some(level_row) = self.get_irradiation_level(irradiation, level)? else {
            return Ok(None);
        };
        let rows = self
            .working
            .positions
            .values()
            .filter(|p| p.level == level_row.id && p.position == position)
            .cloned()
            .collect();
        let key = format!("{irradiation}{level}{position}");
        at_most_one("irradiation position", &key, rows)
    }

    fn get_level_positions(
        &self,
        irradiation: &str,
        level: &str,
    ) -> Result<Vec<PositionDetail>, StorageError> {
        let Some(level_row) = self.get_irradiation_level(irradiation, level)? else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<&IrradiationPosition> = self
            .working
            .positions
            .values()
            .filter(|p| p.level == level_row.id)
            .collect();
        rows.sort_by_key(|p| p.position);
        rows.into_iter().map(|p| self.detail(p)).collect()
    }

    fn get_identifier(&self, identifier: &str) -> Result<Option<PositionDetail>, StorageError> {
        let rows: Vec<IrradiationPosition> = self
            .working
            .positions
            .values()
            .filter(|p| p.identifier.as_deref() == Some(identifier))
            .cloned()
            .collect();
        match at_most_one("identifier", identifier, rows)? {
            Some(row) => Ok(Some(self.detail(&row)?)),
            None => Ok(None),
        }
    }

    fn update_position(
        &mut self,
        id: PositionId,
        update: &PositionUpdate,
    ) -> Result<IrradiationPosition, StorageError> {
        if let Some(identifier) = update.identifier.as_deref().filter(|i| !i.is_empty()) {
            let taken = self
                .working
                .positions
                .values()
                .any(|p| p.id != id && p.identifier.as_deref() == Some(identifier));
            if taken {
                return Err(StorageError::IntegrityError {
                    reason: format!("identifier {identifier} is already assigned"),
                });
            }
        }

        let row = self
            .working
            .positions
            .get_mut(&id.0)
            .ok_or(StorageError::PositionNotFound(id.0))?;
        if let Some(identifier) = &update.identifier {
            row.identifier = Some(identifier.clone()).filter(|i| !i.is_empty());
        }
        if let Some(sample) = update.sample {
            row.sample = Some(sample);
        }
        if let Some(weight) = update.weight {
            row.weight = weight;
        }
        if let Some(note) = &update.note {
            row.note = note.clone();
        }
        Ok(row.clone())
    }

    fn remove_irradiation_position(
        &mut self,
        irradiation: &str,
        level: &str,
        position: u32,
    ) -> Result<bool, StorageError> {
        let Some(row) = self.get_irradiation_position(irradiation, level, position)? else {
            return Ok(false);
        };
        self.working.positions.remove(&row.id.0);
        self.working.analyses.retain(|_, a| a.position != row.id);
        Ok(true)
    }

    fn add_analysis(&mut self, identifier: &str, aliquot: u32) -> Result<Analysis, StorageError> {
        let detail = self
            .get_identifier(identifier)?
            .ok_or_else(|| StorageError::IdentifierNotFound(identifier.to_string()))?;
        let position = detail.position.id;
        if let Some(existing) = self
            .working
            .analyses
            .values()
            .find(|a| a.position == position && a.aliquot == aliquot)
        {
            return Ok(existing.clone());
        }
        let id = self.working.allocate();
        let analysis = Analysis {
            id: AnalysisId(id),
            position,
            aliquot,
        };
        self.working.analyses.insert(id, analysis.clone());
        Ok(analysis)
    }
}
