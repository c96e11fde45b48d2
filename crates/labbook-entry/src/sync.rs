//! Position synchronization: persisted rows into view objects.
//!
//! Reads only. The store and metadata repository are never mutated here;
//! the view objects are.

use thiserror::Error;
use tracing::debug;

use labbook_core::{FillState, FluxValue, IrradiatedPosition};
use labbook_storage::{MetaRepository, PositionDetail, RecordStore, StorageError};

/// Why a level could not be synchronized.
#[derive(Debug, Error)]
pub enum SyncFailure {
    #[error("Failed loading Irradiation level=\"{level}\": no such level in {irradiation}")]
    LevelNotFound { irradiation: String, level: String },

    #[error("Failed loading holder \"{holder}\": {source}")]
    Holder {
        holder: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed loading Irradiation level=\"{level}\": {source}")]
    Storage {
        level: String,
        #[source]
        source: StorageError,
    },
}

/// Outcome of a successful level synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelSync {
    /// Number of views updated from persisted rows.
    pub synced: usize,
    /// Persisted positions with no matching hole in the tray.
    pub extra: Vec<u32>,
}

/// Copies a persisted position into `view`.
///
/// Positions without a sample carry nothing worth showing and leave the view
/// untouched. The fill state is recomputed from the copied fields.
pub fn sync_position(
    detail: &PositionDetail,
    flux: Option<FluxValue>,
    monitor_name: &str,
    view: &mut IrradiatedPosition,
) {
    let Some(sample) = &detail.sample else {
        return;
    };

    view.sample = sample.clone();
    if let Some(material) = &detail.material {
        view.material = material.clone();
        view.grainsize = detail.grainsize.clone().unwrap_or_default();
    }
    if let Some(project) = &detail.project {
        view.project = project.clone();
        if let Some(pi) = &detail.principal_investigator {
            view.principal_investigator = pi.clone();
        }
    }
    view.igsn = detail.igsn.clone().unwrap_or_default();
    view.identifier = detail.position.identifier.clone().unwrap_or_default();
    view.hole = detail.position.position;

    if let Some(flux) = flux.filter(FluxValue::is_set) {
        view.set_flux(flux);
    }

    view.note = detail.position.note.clone();
    view.weight = detail.position.weight;
    view.analysis_count = detail.analysis_count;
    view.analyzed = detail.analyzed();
    view.fill = FillState::derive(view, monitor_name);
}

/// Synchronizes every persisted position of a level into the view with the
/// same hole number.
pub fn sync_level<S, M>(
    store: &S,
    meta: &M,
    irradiation: &str,
    level: &str,
    monitor_name: &str,
    views: &mut [IrradiatedPosition],
) -> Result<LevelSync, SyncFailure>
where
    S: RecordStore + ?Sized,
    M: MetaRepository + ?Sized,
{
    let storage = |source| SyncFailure::Storage {
        level: level.to_string(),
        source,
    };

    let details = store
        .get_level_positions(irradiation, level)
        .map_err(storage)?;
    debug!(
        irradiation,
        level,
        persisted = details.len(),
        holes = views.len(),
        "synchronizing level"
    );

    let mut outcome = LevelSync::default();
    for detail in &details {
        let hole = detail.position.position;
        let Some(view) = views.iter_mut().find(|v| v.hole == hole) else {
            debug!(hole, "extra irradiation position for this tray");
            outcome.extra.push(hole);
            continue;
        };
        let flux = meta
            .get_flux(irradiation, level, hole)
            .map_err(storage)?;
        sync_position(detail, flux, monitor_name, view);
        outcome.synced += 1;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use labbook_core::records::IrradiationPosition;
    use labbook_core::position::FILL_PALETTE;
    use labbook_core::{LevelId, PositionId};

    fn detail(hole: u32) -> PositionDetail {
        PositionDetail {
            position: IrradiationPosition {
                id: PositionId(1),
                level: LevelId(1),
                position: hole,
                identifier: Some("66001".into()),
                sample: None,
                weight: 0.5,
                note: "n".into(),
            },
            irradiation: "NM-1".into(),
            level: "A".into(),
            sample: Some("FC-2".into()),
            material: Some("sanidine".into()),
            grainsize: Some("20-40".into()),
            project: Some("Irradiation-NM-1".into()),
            principal_investigator: Some("Ross".into()),
            igsn: None,
            analysis_count: 2,
        }
    }

    #[test]
    fn copies_sample_chain_flux_and_fill() {
        let mut view = IrradiatedPosition::new(3).unwrap();
        let flux = FluxValue::new(0.002, 0.00001).unwrap();
        sync_position(&detail(3), Some(flux), "FC-2", &mut view);

        assert_eq!(view.sample, "FC-2");
        assert_eq!(view.material, "sanidine");
        assert_eq!(view.grainsize, "20-40");
        assert_eq!(view.project, "Irradiation-NM-1");
        assert_eq!(view.principal_investigator, "Ross");
        assert_eq!(view.identifier, "66001");
        assert_eq!(view.j, 0.002);
        assert_eq!(view.j_err, 0.00001);
        assert_eq!(view.weight, 0.5);
        assert!(view.analyzed);
        assert!(view.fill.fill);
        assert!(view.fill.monitor);
        assert_eq!(view.fill.color, Some(FILL_PALETTE[3]));
    }

    #[test]
    fn unset_flux_keeps_view_value() {
        let mut view = IrradiatedPosition::new(3).unwrap();
        view.j = 0.7;
        sync_position(&detail(3), Some(FluxValue { value: 0.0, error: 0.0 }), "", &mut view);
        assert_eq!(view.j, 0.7);
        sync_position(&detail(3), None, "", &mut view);
        assert_eq!(view.j, 0.7);
    }

    #[test]
    fn position_without_sample_leaves_view_alone() {
        let mut d = detail(3);
        d.sample = None;
        let mut view = IrradiatedPosition::new(3).unwrap();
        sync_position(&d, None, "", &mut view);
        assert_eq!(view, IrradiatedPosition::new(3).unwrap());
    }
}
