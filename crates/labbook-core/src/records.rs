//! Persisted record types.
//!
//! These mirror the rows of the relational store one-to-one. Relationships
//! are carried as foreign-key ids; joined views live in the storage crate.

use serde::{Deserialize, Serialize};

use crate::id::{
    AnalysisId, IrradiationId, LevelId, MassSpectrometerId, MaterialId, PositionId, ProjectId,
    SampleId,
};

/// A research project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub principal_investigator: Option<String>,
}

/// A sample material / grain-size class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    pub grainsize: Option<String>,
}

/// A physical rock or mineral sample belonging to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,
    pub name: String,
    pub project: ProjectId,
    pub material: Option<MaterialId>,
    pub igsn: Option<String>,
}

/// A named instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassSpectrometer {
    pub id: MassSpectrometerId,
    pub name: String,
    pub kind: String,
}

/// A reactor irradiation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Irradiation {
    pub id: IrradiationId,
    pub name: String,
}

/// A tray within an irradiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub id: LevelId,
    pub irradiation: IrradiationId,
    pub name: String,
    /// Name of the holder geometry in the metadata repository.
    pub holder: Option<String>,
    /// Vertical offset of the tray in the irradiation package.
    pub z: Option<f64>,
    pub note: String,
}

/// One hole of a level's tray.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrradiationPosition {
    pub id: PositionId,
    pub level: LevelId,
    /// 1-based hole index.
    pub position: u32,
    pub identifier: Option<String>,
    pub sample: Option<SampleId>,
    pub weight: f64,
    pub note: String,
}

/// A measurement run against an identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: AnalysisId,
    pub position: PositionId,
    pub aliquot: u32,
}
