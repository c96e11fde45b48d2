//! The labnumber-entry session.
//!
//! [`EntrySession`] is the editable state of one irradiation level: the
//! view objects for every tray hole, the current selection, and the
//! snapshot taken at the last load or save. Every operation that touches
//! the record store or metadata repository takes them as arguments, so a
//! session never holds a connection.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use labbook_core::records::Irradiation;
use labbook_core::{allocate_next, FillState, FluxValue, IrradiatedPosition};
use labbook_storage::{
    Chronology, IrradiationFilter, MetaRepository, NameOrder, PositionUpdate, RecordStore,
    StorageError,
};

use crate::backup::{backup_path, read_backup, write_backup};
use crate::config::EntryConfig;
use crate::dirty::{compute_dirty_set, snapshot, DirtySet, Snapshot};
use crate::error::{EntryError, ValidationIssue};
use crate::sync::{sync_level, sync_position, SyncFailure};

/// Receives progress while a save pass runs.
pub trait Progress {
    fn step(&mut self, done: usize, total: usize, message: &str);
}

impl Progress for () {
    fn step(&mut self, _done: usize, _total: usize, _message: &str) {}
}

/// What a save pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Positions written with their sample chain.
    pub saved: usize,
    /// Persisted positions deleted because their sample was cleared.
    pub removed: usize,
}

/// A single field assignment applied to the selected positions.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionAttr {
    Identifier(String),
    Sample(String),
    Material(String),
    Grainsize(String),
    Project(String),
    PrincipalInvestigator(String),
    AltHole(String),
    Size(String),
    Weight(f64),
    Note(String),
    Flux(FluxValue),
}

impl PositionAttr {
    fn apply(&self, p: &mut IrradiatedPosition) {
        match self {
            PositionAttr::Identifier(v) => p.identifier = v.clone(),
            PositionAttr::Sample(v) => p.sample = v.clone(),
            PositionAttr::Material(v) => p.material = v.clone(),
            PositionAttr::Grainsize(v) => p.grainsize = v.clone(),
            PositionAttr::Project(v) => p.project = v.clone(),
            PositionAttr::PrincipalInvestigator(v) => p.principal_investigator = v.clone(),
            PositionAttr::AltHole(v) => p.alt_hole = v.clone(),
            PositionAttr::Size(v) => p.size = v.clone(),
            PositionAttr::Weight(v) => p.weight = *v,
            PositionAttr::Note(v) => p.note = v.clone(),
            PositionAttr::Flux(v) => p.set_flux(*v),
        }
    }
}

/// The sample an operator is placing into tray holes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleChoice {
    pub name: String,
    pub project: String,
    pub material: String,
}

/// One unanalysed position in a status report.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEntry {
    pub level: String,
    pub position: IrradiatedPosition,
}

/// Editable state of one irradiation level.
#[derive(Debug, Clone)]
pub struct EntrySession {
    irradiation: String,
    level: String,
    tray: Option<String>,
    level_note: String,
    monitor_name: String,
    positions: Vec<IrradiatedPosition>,
    selected: Vec<usize>,
    extra: Vec<u32>,
    saved: Snapshot,
}

impl EntrySession {
    /// A session over `positions` that has never been saved.
    pub fn new(
        irradiation: &str,
        level: &str,
        monitor_name: &str,
        positions: Vec<IrradiatedPosition>,
    ) -> Self {
        EntrySession {
            irradiation: irradiation.to_string(),
            level: level.to_string(),
            tray: None,
            level_note: String::new(),
            monitor_name: monitor_name.to_string(),
            positions,
            selected: Vec::new(),
            extra: Vec::new(),
            saved: Snapshot::new(),
        }
    }

    /// Loads a level: one view per holder hole, filled from the persisted
    /// positions.
    ///
    /// A level without a holder gets one view per hole up to the highest
    /// persisted position.
    pub fn load_level<S, M>(
        store: &S,
        meta: &M,
        irradiation: &str,
        level: &str,
        monitor_name: &str,
    ) -> Result<Self, SyncFailure>
    where
        S: RecordStore + ?Sized,
        M: MetaRepository + ?Sized,
    {
        let storage = |source| SyncFailure::Storage {
            level: level.to_string(),
            source,
        };

        let row = store
            .get_irradiation_level(irradiation, level)
            .map_err(storage)?
            .ok_or_else(|| SyncFailure::LevelNotFound {
                irradiation: irradiation.to_string(),
                level: level.to_string(),
            })?;

        let mut positions: Vec<IrradiatedPosition> = match &row.holder {
            Some(holder) => meta
                .get_irradiation_holder_holes(holder)
                .map_err(|source| SyncFailure::Holder {
                    holder: holder.clone(),
                    source,
                })?
                .into_iter()
                .map(|h| IrradiatedPosition {
                    hole: h.number,
                    pos: Some((h.x, h.y)),
                    ..Default::default()
                })
                .collect(),
            None => {
                let last = store
                    .get_level_positions(irradiation, level)
                    .map_err(storage)?
                    .iter()
                    .map(|d| d.position.position)
                    .max()
                    .unwrap_or(0);
                (1..=last)
                    .map(|hole| IrradiatedPosition {
                        hole,
                        ..Default::default()
                    })
                    .collect()
            }
        };

        let outcome = sync_level(
            store,
            meta,
            irradiation,
            level,
            monitor_name,
            &mut positions,
        )?;
        debug!(
            irradiation,
            level,
            synced = outcome.synced,
            extra = outcome.extra.len(),
            "loaded level"
        );

        let saved = snapshot(&positions);
        Ok(EntrySession {
            irradiation: irradiation.to_string(),
            level: level.to_string(),
            tray: row.holder,
            level_note: row.note,
            monitor_name: monitor_name.to_string(),
            positions,
            selected: Vec::new(),
            extra: outcome.extra,
            saved,
        })
    }

    /// Reloads the current level from storage, discarding unsaved edits.
    pub fn reload<S, M>(&mut self, store: &S, meta: &M) -> Result<(), SyncFailure>
    where
        S: RecordStore + ?Sized,
        M: MetaRepository + ?Sized,
    {
        *self = Self::load_level(store, meta, &self.irradiation, &self.level, &self.monitor_name)?;
        Ok(())
    }

    pub fn irradiation(&self) -> &str {
        &self.irradiation
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    /// Holder tray name, if the level has one.
    pub fn tray(&self) -> Option<&str> {
        self.tray.as_deref()
    }

    pub fn level_note(&self) -> &str {
        &self.level_note
    }

    pub fn positions(&self) -> &[IrradiatedPosition] {
        &self.positions
    }

    /// Mutable access for direct edits. Fill state is not recomputed.
    pub fn positions_mut(&mut self) -> &mut [IrradiatedPosition] {
        &mut self.positions
    }

    /// Persisted positions that had no hole in the tray at load time.
    pub fn extra_positions(&self) -> &[u32] {
        &self.extra
    }

    pub fn position(&self, hole: u32) -> Option<&IrradiatedPosition> {
        self.positions.iter().find(|p| p.hole == hole)
    }

    // -------------------------------------------------------------------
    // Dirty tracking
    // -------------------------------------------------------------------

    pub fn dirty_set(&self) -> DirtySet {
        compute_dirty_set(&self.positions, &self.saved)
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_set().is_clean()
    }

    // -------------------------------------------------------------------
    // Save
    // -------------------------------------------------------------------

    /// Checks that every labelled position has its sample chain.
    ///
    /// A position with a sample also needs a project, since samples are
    /// keyed within their project.
    pub fn validate(&self) -> Result<(), EntryError> {
        let issues: Vec<ValidationIssue> = self
            .positions
            .iter()
            .filter_map(|p| {
                let mut missing = p.missing_fields();
                if p.identifier.is_empty() && !p.sample.is_empty() && p.project.is_empty() {
                    missing.push("No project");
                }
                (!missing.is_empty()).then(|| ValidationIssue {
                    hole: p.hole,
                    identifier: p.identifier.clone(),
                    missing,
                })
            })
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(EntryError::Validation(issues))
        }
    }

    /// Writes every position to the store, one unit of work per position.
    ///
    /// Nothing is written if validation fails. A position whose identifier
    /// already belongs to another irradiation aborts the pass: that
    /// position is rolled back, positions before it stay committed.
    pub fn save<S, M>(
        &mut self,
        store: &mut S,
        meta: &mut M,
        progress: &mut dyn Progress,
    ) -> Result<SaveReport, EntryError>
    where
        S: RecordStore,
        M: MetaRepository + ?Sized,
    {
        if self.irradiation.is_empty() || self.level.is_empty() {
            return Err(EntryError::NoLevelSelected);
        }
        self.validate()?;

        let irradiation = self.irradiation.as_str();
        let level = self.level.as_str();
        let total = self.positions.len();
        info!(irradiation, level, total, "saving level");

        let mut report = SaveReport::default();
        for (i, p) in self.positions.iter().enumerate() {
            if p.sample.is_empty() {
                let removed = store.session::<_, EntryError, _>(|s| {
                    Ok(s.remove_irradiation_position(irradiation, level, p.hole)?)
                })?;
                if removed {
                    debug!(hole = p.hole, "removed position without sample");
                    report.removed += 1;
                }
                progress.step(i + 1, total, &format!("Clearing {irradiation}{level}{}", p.hole));
                continue;
            }

            store.session(|s| save_position(s, meta, irradiation, level, p))?;
            debug!(hole = p.hole, identifier = %p.identifier, "saved position");
            progress.step(
                i + 1,
                total,
                &format!(
                    "Saving {irradiation}{level}{} identifier={}",
                    p.hole, p.identifier
                ),
            );
            report.saved += 1;
        }

        self.saved = snapshot(&self.positions);
        info!(
            irradiation,
            level,
            saved = report.saved,
            removed = report.removed,
            "changes saved"
        );
        Ok(report)
    }

    // -------------------------------------------------------------------
    // Backup
    // -------------------------------------------------------------------

    /// Backup file for this level under `dir`.
    pub fn backup_path(&self, dir: &Path) -> PathBuf {
        backup_path(dir, &self.irradiation, &self.level)
    }

    pub fn backup(&self, dir: &Path) -> Result<PathBuf, EntryError> {
        if self.irradiation.is_empty() || self.level.is_empty() {
            return Err(EntryError::NoLevelSelected);
        }
        let path = self.backup_path(dir);
        write_backup(&path, &self.positions)?;
        debug!(path = %path.display(), "wrote backup");
        Ok(path)
    }

    /// Replaces the positions with the level's backup under `dir`.
    pub fn recover(&mut self, dir: &Path) -> Result<(), EntryError> {
        if self.irradiation.is_empty() || self.level.is_empty() {
            return Err(EntryError::NoLevelSelected);
        }
        let path = self.backup_path(dir);
        if !path.exists() {
            return Err(EntryError::NoBackup(path));
        }
        self.load_positions_file(&path)
    }

    /// Replaces the positions with those in a backup-format YAML file.
    ///
    /// Canvas coordinates are kept for holes the tray already had.
    pub fn load_positions_file(&mut self, path: &Path) -> Result<(), EntryError> {
        let mut loaded = read_backup(path)?;
        for p in &mut loaded {
            p.pos = self.position(p.hole).and_then(|old| old.pos);
            p.fill = FillState::derive(p, &self.monitor_name);
        }
        info!(path = %path.display(), positions = loaded.len(), "loaded positions");
        self.positions = loaded;
        self.selected.clear();
        Ok(())
    }

    // -------------------------------------------------------------------
    // Selection and bulk edits
    // -------------------------------------------------------------------

    pub fn selected(&self) -> impl Iterator<Item = &IrradiatedPosition> {
        self.selected.iter().filter_map(|&i| self.positions.get(i))
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Selects the hole with this number, replacing the selection.
    pub fn select_hole(&mut self, hole: u32) -> bool {
        self.selected = self
            .positions
            .iter()
            .position(|p| p.hole == hole)
            .into_iter()
            .collect();
        !self.selected.is_empty()
    }

    /// Selects every `freq`-th position counting from the first, or every
    /// other one when `exclude` is set. A zero frequency selects nothing.
    pub fn select_positions(&mut self, freq: usize, exclude: bool) {
        if freq == 0 {
            self.selected.clear();
            return;
        }
        self.selected = (0..self.positions.len())
            .filter(|i| (i % freq == 0) != exclude)
            .collect();
    }

    pub(crate) fn selected_or_all(&self) -> Vec<usize> {
        if self.selected.is_empty() {
            (0..self.positions.len()).collect()
        } else {
            self.selected.clone()
        }
    }

    pub fn set_selected_attr(&mut self, attr: &PositionAttr) -> usize {
        for &i in &self.selected {
            if let Some(p) = self.positions.get_mut(i) {
                attr.apply(p);
                p.fill = FillState::derive(p, &self.monitor_name);
            }
        }
        self.selected.len()
    }

    /// Applies several fields to the selection, backing the level up to
    /// `backup_dir` before and after.
    pub fn set_selected_attrs(
        &mut self,
        attrs: &[PositionAttr],
        backup_dir: &Path,
    ) -> Result<usize, EntryError> {
        self.backup(backup_dir)?;
        if self.selected.is_empty() {
            return Ok(0);
        }
        for attr in attrs {
            self.set_selected_attr(attr);
        }
        self.backup(backup_dir)?;
        Ok(self.selected.len())
    }

    /// Toggles `sample` on the first selected position.
    ///
    /// Placing the sample already in the hole clears it. A position that
    /// already has an identifier is only changed if `confirm` agrees.
    /// Returns the new fill flag, or `None` if nothing changed.
    pub fn apply_sample(
        &mut self,
        sample: &SampleChoice,
        confirm: impl FnOnce(&IrradiatedPosition) -> bool,
    ) -> Option<bool> {
        let &i = self.selected.first()?;
        let p = self.positions.get_mut(i)?;
        if !p.identifier.is_empty() && !confirm(p) {
            return None;
        }

        if p.sample == sample.name {
            p.clear_sample();
        } else {
            p.sample = sample.name.clone();
            p.project = sample.project.clone();
            p.material = sample.material.clone();
        }
        p.fill = FillState::derive(p, &self.monitor_name);
        Some(p.fill.fill)
    }

    /// Sets the J estimated from the irradiation's duration on every
    /// selected position holding a sample, or on all of them when nothing
    /// is selected.
    pub fn estimate_j(
        &mut self,
        chronology: &Chronology,
        multiplier: f64,
    ) -> Result<FluxValue, EntryError> {
        let flux = FluxValue::estimated(chronology.duration_hours() * multiplier)?;
        for i in self.selected_or_all() {
            if let Some(p) = self.positions.get_mut(i) {
                if !p.sample.is_empty() {
                    p.set_flux(flux);
                }
            }
        }
        debug!(j = flux.value, "estimated J");
        Ok(flux)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

fn save_position<S, M>(
    store: &mut S,
    meta: &mut M,
    irradiation: &str,
    level: &str,
    p: &IrradiatedPosition,
) -> Result<(), EntryError>
where
    S: RecordStore,
    M: MetaRepository + ?Sized,
{
    let row = store.add_irradiation_position(irradiation, level, p.hole)?;
    let mut update = PositionUpdate {
        weight: Some(p.weight),
        note: Some(p.note.clone()),
        ..Default::default()
    };

    if !p.identifier.is_empty() {
        match store.get_identifier(&p.identifier)? {
            Some(owner) if owner.irradiation != irradiation => {
                warn!(
                    identifier = %p.identifier,
                    owner = %owner.irradiation,
                    "identifier already exists in another irradiation"
                );
                return Err(EntryError::IdentifierCollision {
                    identifier: p.identifier.clone(),
                    irradiation: owner.irradiation,
                });
            }
            Some(_) => {}
            None => update.identifier = Some(p.identifier.clone()),
        }
    }

    let project = store.add_project(&p.project, non_empty(&p.principal_investigator))?;
    let material = match non_empty(&p.material) {
        Some(name) => Some(store.add_material(name, non_empty(&p.grainsize))?),
        None => None,
    };
    let sample = store.add_sample(
        &p.sample,
        &project.name,
        material.as_ref().map(|m| m.name.as_str()),
    )?;
    if !p.igsn.is_empty() && sample.igsn.as_deref() != Some(p.igsn.as_str()) {
        store.set_sample_igsn(&sample, &p.igsn)?;
    }
    update.sample = Some(sample.id);
    store.update_position(row.id, &update)?;

    meta.update_flux(irradiation, level, p.hole, &p.identifier, p.flux())?;
    Ok(())
}

/// Writes `flux` to every persisted position of every level of an
/// irradiation, including positions with no flux recorded yet.
/// Returns the number of levels updated.
pub fn apply_flux_to_irradiation<S, M>(
    store: &S,
    meta: &mut M,
    irradiation: &str,
    flux: FluxValue,
) -> Result<usize, EntryError>
where
    S: RecordStore + ?Sized,
    M: MetaRepository + ?Sized,
{
    let levels = store.get_levels(irradiation)?;
    for level in &levels {
        for detail in store.get_level_positions(irradiation, &level.name)? {
            let hole = detail.position.position;
            if meta.get_flux(irradiation, &level.name, hole)?.is_none() {
                let identifier = detail.position.identifier.unwrap_or_default();
                meta.update_flux(irradiation, &level.name, hole, &identifier, flux)?;
            }
        }
        meta.update_fluxes(irradiation, &level.name, flux)?;
    }
    info!(irradiation, levels = levels.len(), j = flux.value, "set default J");
    Ok(levels.len())
}

/// Every labelled position of an irradiation that has not been analysed,
/// level by level.
pub fn status_report<S, M>(
    store: &S,
    meta: &M,
    irradiation: &str,
) -> Result<Vec<StatusEntry>, EntryError>
where
    S: RecordStore + ?Sized,
    M: MetaRepository + ?Sized,
{
    info!(irradiation, "generating irradiation status report");
    if store.get_irradiation(irradiation)?.is_none() {
        return Err(StorageError::IrradiationNotFound(irradiation.to_string()).into());
    }

    let mut entries = Vec::new();
    for level in store.get_levels(irradiation)? {
        for detail in store.get_level_positions(irradiation, &level.name)? {
            let labelled = detail
                .position
                .identifier
                .as_deref()
                .is_some_and(|id| !id.is_empty());
            if !labelled || detail.analyzed() {
                continue;
            }
            let hole = detail.position.position;
            let mut view = IrradiatedPosition {
                hole,
                ..Default::default()
            };
            let flux = meta.get_flux(irradiation, &level.name, hole)?;
            sync_position(&detail, flux, "", &mut view);
            // Sync skips positions without a sample; the label still counts.
            if view.identifier.is_empty() {
                view.identifier = detail.position.identifier.clone().unwrap_or_default();
            }
            entries.push(StatusEntry {
                level: level.name.clone(),
                position: view,
            });
        }
    }
    Ok(entries)
}

/// Proposes the name of the next irradiation: the newest name carrying
/// `prefix`, incremented. `"0"` when there is none yet.
pub fn auto_increment_irradiation<S>(store: &S, prefix: &str) -> Result<String, StorageError>
where
    S: RecordStore + ?Sized,
{
    let newest = store.get_irradiations(&IrradiationFilter {
        prefix: Some(prefix.to_string()),
        order: Some(NameOrder::Desc),
        limit: Some(1),
        ..Default::default()
    })?;
    Ok(match newest.first() {
        Some(irradiation) => allocate_next(&irradiation.name),
        None => String::from("0"),
    })
}

/// Creates an irradiation and, when `with_defaults` is set, its
/// flux-monitor project and monitor sample, in one unit of work.
pub fn add_irradiation_with_defaults<S>(
    store: &mut S,
    config: &EntryConfig,
    name: &str,
    with_defaults: bool,
) -> Result<Irradiation, EntryError>
where
    S: RecordStore,
{
    if with_defaults && config.monitor_name.trim().is_empty() {
        return Err(EntryError::NoMonitorName);
    }

    store.session(|s| {
        let irradiation = s.add_irradiation(name)?;
        if with_defaults {
            let project = config.monitor_project(name);
            s.add_project(&project, non_empty(&config.default_principal_investigator))?;
            s.add_sample(
                &config.monitor_name,
                &project,
                non_empty(&config.monitor_material),
            )?;
            info!(irradiation = name, project = %project, "added default monitor project");
        }
        Ok(irradiation)
    })
}
