//! The metadata repository: flat files next to the relational store.
//!
//! Tray geometry, per-position flux values and irradiation chronologies
//! live as human-readable files so they can be versioned independently of
//! the database. [`FsMetaRepository`] lays them out as:
//!
//! ```text
//! <root>/irradiation_holders/<holder>.txt    header line, then x,y[,r] per hole
//! <root>/<irradiation>/flux/<level>.json      position -> {identifier, j, j_err}
//! <root>/<irradiation>/chronology.txt         power,start,end per dose
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use labbook_core::FluxValue;

use crate::error::StorageError;

const HOLDERS_DIR: &str = "irradiation_holders";
const HOLDER_EXTENSION: &str = "txt";
const DOSE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One hole of a holder tray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hole {
    /// 1-based, in file order.
    pub number: u32,
    pub x: f64,
    pub y: f64,
    pub radius: Option<f64>,
}

/// Flux recorded for one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxEntry {
    #[serde(default)]
    pub identifier: String,
    #[serde(flatten)]
    pub flux: FluxValue,
}

/// One reactor dose: power level over a time window.
#[derive(Debug, Clone, PartialEq)]
pub struct Dose {
    pub power: f64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// The doses making up an irradiation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chronology {
    pub doses: Vec<Dose>,
}

impl Chronology {
    /// Total irradiation time in hours.
    pub fn duration_hours(&self) -> f64 {
        self.doses
            .iter()
            .map(|d| (d.end - d.start).num_seconds() as f64 / 3600.0)
            .sum()
    }
}

/// Access to geometry, flux and chronology metadata.
pub trait MetaRepository {
    /// Flux of a position, `None` if none has been recorded.
    fn get_flux(
        &self,
        irradiation: &str,
        level: &str,
        position: u32,
    ) -> Result<Option<FluxValue>, StorageError>;

    fn update_flux(
        &mut self,
        irradiation: &str,
        level: &str,
        position: u32,
        identifier: &str,
        flux: FluxValue,
    ) -> Result<(), StorageError>;

    /// Sets the same flux on every recorded position of a level.
    fn update_fluxes(
        &mut self,
        irradiation: &str,
        level: &str,
        flux: FluxValue,
    ) -> Result<(), StorageError>;

    fn get_irradiation_holder_holes(&self, holder: &str) -> Result<Vec<Hole>, StorageError>;

    /// Names of all known holders, ascending.
    fn get_irradiation_holder_names(&self) -> Result<Vec<String>, StorageError>;

    /// The irradiation's doses; empty if none are recorded.
    fn get_chronology(&self, irradiation: &str) -> Result<Chronology, StorageError>;

    fn set_chronology(
        &mut self,
        irradiation: &str,
        chronology: &Chronology,
    ) -> Result<(), StorageError>;
}

/// Filesystem-backed [`MetaRepository`].
#[derive(Debug, Clone)]
pub struct FsMetaRepository {
    root: PathBuf,
}

impl FsMetaRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsMetaRepository { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn flux_path(&self, irradiation: &str, level: &str) -> PathBuf {
        self.root
            .join(irradiation)
            .join("flux")
            .join(format!("{level}.json"))
    }

    fn chronology_path(&self, irradiation: &str) -> PathBuf {
        self.root.join(irradiation).join("chronology.txt")
    }

    fn holder_path(&self, holder: &str) -> PathBuf {
        self.root
            .join(HOLDERS_DIR)
            .join(format!("{holder}.{HOLDER_EXTENSION}"))
    }

    fn read_fluxes(
        &self,
        irradiation: &str,
        level: &str,
    ) -> Result<BTreeMap<u32, FluxEntry>, StorageError> {
        let path = self.flux_path(irradiation, level);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write_fluxes(
        &self,
        irradiation: &str,
        level: &str,
        fluxes: &BTreeMap<u32, FluxEntry>,
    ) -> Result<(), StorageError> {
        let path = self.flux_path(irradiation, level);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(fluxes)?)?;
        Ok(())
    }

    /// Writes a holder geometry file. The header line is kept verbatim.
    pub fn write_holder(
        &self,
        holder: &str,
        header: &str,
        holes: &[(f64, f64)],
    ) -> Result<(), StorageError> {
        let path = self.holder_path(holder);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut text = format!("{header}\n");
        for (x, y) in holes {
            text.push_str(&format!("{x},{y}\n"));
        }
        fs::write(path, text)?;
        Ok(())
    }
}

/// Parses a holder file body: a header line, then one `x,y[,r]` line per
/// hole. Blank lines are ignored.
pub fn parse_holder(path: &Path, text: &str) -> Result<Vec<Hole>, StorageError> {
    let malformed = |reason: String| StorageError::MalformedMetadata {
        path: path.to_path_buf(),
        reason,
    };

    let mut holes = Vec::new();
    for (lineno, line) in text.lines().enumerate().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<f64> = line
            .split(',')
            .map(|f| f.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| malformed(format!("line {}: {e}", lineno + 1)))?;
        let (x, y, radius) = match fields.as_slice() {
            [x, y] => (*x, *y, None),
            [x, y, r] => (*x, *y, Some(*r)),
            _ => {
                return Err(malformed(format!(
                    "line {}: expected x,y[,r], found {} fields",
                    lineno + 1,
                    fields.len()
                )))
            }
        };
        holes.push(Hole {
            number: holes.len() as u32 + 1,
            x,
            y,
            radius,
        });
    }
    Ok(holes)
}

fn parse_chronology(path: &Path, text: &str) -> Result<Chronology, StorageError> {
    let malformed = |lineno: usize, reason: String| StorageError::MalformedMetadata {
        path: path.to_path_buf(),
        reason: format!("line {}: {reason}", lineno + 1),
    };

    let mut doses = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let [power, start, end] = parts.as_slice() else {
            return Err(malformed(lineno, "expected power,start,end".into()));
        };
        let power = power
            .parse::<f64>()
            .map_err(|e| malformed(lineno, e.to_string()))?;
        let start = NaiveDateTime::parse_from_str(start, DOSE_TIME_FORMAT)
            .map_err(|e| malformed(lineno, e.to_string()))?;
        let end = NaiveDateTime::parse_from_str(end, DOSE_TIME_FORMAT)
            .map_err(|e| malformed(lineno, e.to_string()))?;
        if end < start {
            return Err(malformed(lineno, "dose ends before it starts".into()));
        }
        doses.push(Dose { power, start, end });
    }
    Ok(Chronology { doses })
}

impl MetaRepository for FsMetaRepository {
    fn get_flux(
        &self,
        irradiation: &str,
        level: &str,
        position: u32,
    ) -> Result<Option<FluxValue>, StorageError> {
        Ok(self
            .read_fluxes(irradiation, level)?
            .get(&position)
            .map(|entry| entry.flux))
    }

    fn update_flux(
        &mut self,
        irradiation: &str,
        level: &str,
        position: u32,
        identifier: &str,
        flux: FluxValue,
    ) -> Result<(), StorageError> {
        let mut fluxes = self.read_fluxes(irradiation, level)?;
        let entry = FluxEntry {
            identifier: identifier.to_string(),
            flux,
        };
        if fluxes.get(&position) == Some(&entry) {
            return Ok(());
        }
        fluxes.insert(position, entry);
        debug!(irradiation, level, position, "updated flux");
        self.write_fluxes(irradiation, level, &fluxes)
    }

    fn update_fluxes(
        &mut self,
        irradiation: &str,
        level: &str,
        flux: FluxValue,
    ) -> Result<(), StorageError> {
        let mut fluxes = self.read_fluxes(irradiation, level)?;
        for entry in fluxes.values_mut() {
            entry.flux = flux;
        }
        self.write_fluxes(irradiation, level, &fluxes)
    }

    fn get_irradiation_holder_holes(&self, holder: &str) -> Result<Vec<Hole>, StorageError> {
        let path = self.holder_path(holder);
        let text = fs::read_to_string(&path)?;
        parse_holder(&path, &text)
    }

    fn get_irradiation_holder_names(&self) -> Result<Vec<String>, StorageError> {
        let dir = self.root.join(HOLDERS_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(HOLDER_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn get_chronology(&self, irradiation: &str) -> Result<Chronology, StorageError> {
        let path = self.chronology_path(irradiation);
        if !path.exists() {
            return Ok(Chronology::default());
        }
        let text = fs::read_to_string(&path)?;
        parse_chronology(&path, &text)
    }

    fn set_chronology(
        &mut self,
        irradiation: &str,
        chronology: &Chronology,
    ) -> Result<(), StorageError> {
        let path = self.chronology_path(irradiation);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut text = String::new();
        for dose in &chronology.doses {
            text.push_str(&format!(
                "{},{},{}\n",
                dose.power,
                dose.start.format(DOSE_TIME_FORMAT),
                dose.end.format(DOSE_TIME_FORMAT)
            ));
        }
        fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DOSE_TIME_FORMAT).unwrap()
    }

    #[test]
    fn holder_holes_are_numbered_in_file_order() {
        let text = "circle,0.0175\n0.0,1.0\n\n1.5,2.5,0.02\n";
        let holes = parse_holder(Path::new("h.txt"), text).unwrap();
        assert_eq!(holes.len(), 2);
        assert_eq!(holes[0].number, 1);
        assert_eq!(holes[1].number, 2);
        assert_eq!(holes[1].radius, Some(0.02));
    }

    #[test]
    fn malformed_holder_line_is_reported() {
        let err = parse_holder(Path::new("h.txt"), "hdr\n1.0\n").unwrap_err();
        assert!(matches!(err, StorageError::MalformedMetadata { .. }));
        let err = parse_holder(Path::new("h.txt"), "hdr\n1.0,abc\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn flux_roundtrips_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = FsMetaRepository::new(dir.path());
        assert_eq!(repo.get_flux("NM-1", "A", 1).unwrap(), None);

        let j = FluxValue::new(0.0021, 0.000002).unwrap();
        repo.update_flux("NM-1", "A", 1, "66000", j).unwrap();
        assert_eq!(repo.get_flux("NM-1", "A", 1).unwrap(), Some(j));
        assert_eq!(repo.get_flux("NM-1", "A", 2).unwrap(), None);

        let estimate = FluxValue::estimated(0.003).unwrap();
        repo.update_fluxes("NM-1", "A", estimate).unwrap();
        assert_eq!(repo.get_flux("NM-1", "A", 1).unwrap(), Some(estimate));
    }

    #[test]
    fn holder_names_come_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsMetaRepository::new(dir.path());
        assert!(repo.get_irradiation_holder_names().unwrap().is_empty());
        repo.write_holder("24Spokes", "circle,0.02", &[(0.0, 0.0)]).unwrap();
        repo.write_holder("8Hole", "circle,0.02", &[(0.0, 0.0), (1.0, 0.0)]).unwrap();
        assert_eq!(
            repo.get_irradiation_holder_names().unwrap(),
            vec!["24Spokes", "8Hole"]
        );
        assert_eq!(repo.get_irradiation_holder_holes("8Hole").unwrap().len(), 2);
    }

    #[test]
    fn chronology_duration_sums_doses() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = FsMetaRepository::new(dir.path());
        assert_eq!(repo.get_chronology("NM-1").unwrap().duration_hours(), 0.0);

        let chronology = Chronology {
            doses: vec![
                Dose {
                    power: 1.0,
                    start: dt("2024-01-01 00:00:00"),
                    end: dt("2024-01-01 10:00:00"),
                },
                Dose {
                    power: 1.0,
                    start: dt("2024-01-02 00:00:00"),
                    end: dt("2024-01-02 02:30:00"),
                },
            ],
        };
        repo.set_chronology("NM-1", &chronology).unwrap();
        let loaded = repo.get_chronology("NM-1").unwrap();
        assert_eq!(loaded, chronology);
        assert!((loaded.duration_hours() - 12.5).abs() < 1e-9);
    }
}
