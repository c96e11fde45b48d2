//! Flat-file backup of a level's positions.
//!
//! A backup is a YAML list with one mapping per position holding the
//! operator-editable fields. It is written before bulk edits and can be
//! loaded back to rebuild the positions of a level.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use labbook_core::{CoreError, IrradiatedPosition};

use crate::error::EntryError;

/// The persisted fields of one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub sample: String,
    pub hole: u32,
    #[serde(default)]
    pub alt_hole: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub principal_investigator: String,
    #[serde(default)]
    pub j: f64,
    #[serde(default)]
    pub j_err: f64,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub note: String,
}

impl From<&IrradiatedPosition> for BackupRecord {
    fn from(p: &IrradiatedPosition) -> Self {
        BackupRecord {
            identifier: p.identifier.clone(),
            material: p.material.clone(),
            sample: p.sample.clone(),
            hole: p.hole,
            alt_hole: p.alt_hole.clone(),
            project: p.project.clone(),
            principal_investigator: p.principal_investigator.clone(),
            j: p.j,
            j_err: p.j_err,
            size: p.size.clone(),
            weight: p.weight,
            note: p.note.clone(),
        }
    }
}

impl BackupRecord {
    /// Rebuilds a view object; fields outside the backup stay at defaults.
    pub fn into_position(self) -> Result<IrradiatedPosition, CoreError> {
        let mut p = IrradiatedPosition::new(self.hole)?;
        p.identifier = self.identifier;
        p.material = self.material;
        p.sample = self.sample;
        p.alt_hole = self.alt_hole;
        p.project = self.project;
        p.principal_investigator = self.principal_investigator;
        p.j = self.j;
        p.j_err = self.j_err;
        p.size = self.size;
        p.weight = self.weight;
        p.note = self.note;
        Ok(p)
    }
}

/// `<dir>/backup.<irradiation>.<level>.yaml`
pub fn backup_path(dir: &Path, irradiation: &str, level: &str) -> PathBuf {
    dir.join(format!("backup.{irradiation}.{level}.yaml"))
}

pub fn write_backup(path: &Path, positions: &[IrradiatedPosition]) -> Result<(), EntryError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let records: Vec<BackupRecord> = positions.iter().map(BackupRecord::from).collect();
    fs::write(path, serde_yaml::to_string(&records)?)?;
    Ok(())
}

pub fn read_backup(path: &Path) -> Result<Vec<IrradiatedPosition>, EntryError> {
    let text = fs::read_to_string(path)?;
    let records: Vec<BackupRecord> = serde_yaml::from_str(&text)?;
    records
        .into_iter()
        .map(|r| r.into_position().map_err(EntryError::from))
        .collect()
}
