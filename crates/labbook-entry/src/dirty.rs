//! Unsaved-change detection for a level's positions.
//!
//! Compares a snapshot of per-hole content hashes taken at the last load or
//! save against the current positions. Only fields that a save persists take
//! part in the hash, so display state (fill colour, analysis counts) never makes
//! a level dirty.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use labbook_core::IrradiatedPosition;

use crate::backup::BackupRecord;

/// Content hashes keyed by hole number.
pub type Snapshot = BTreeMap<u32, blake3::Hash>;

/// The holes that changed since the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    /// Holes that were not in the snapshot.
    pub new: BTreeSet<u32>,
    /// Holes whose content changed.
    pub modified: BTreeSet<u32>,
    /// Holes that were in the snapshot but are gone.
    pub removed: BTreeSet<u32>,
}

impl DirtySet {
    /// Returns true if nothing changed (empty dirty set).
    pub fn is_clean(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Total count of dirty holes (new + modified + removed).
    pub fn total(&self) -> usize {
        self.new.len() + self.modified.len() + self.removed.len()
    }
}

/// Every field a save writes: the backup record plus the sample IGSN and
/// material grainsize.
#[derive(Serialize)]
struct PersistedFields<'a> {
    #[serde(flatten)]
    record: BackupRecord,
    igsn: &'a str,
    grainsize: &'a str,
}

/// Computes a blake3 hash of a position's persisted fields.
///
/// The fields serialize in declaration order, so the JSON form is canonical.
pub fn hash_position(position: &IrradiatedPosition) -> blake3::Hash {
    let fields = PersistedFields {
        record: BackupRecord::from(position),
        igsn: &position.igsn,
        grainsize: &position.grainsize,
    };
    let mut hasher = blake3::Hasher::new();
    // A struct of strings and numbers always serializes.
    let bytes = serde_json::to_vec(&fields).unwrap_or_default();
    hasher.update(&bytes);
    hasher.finalize()
}

/// Hashes every position.
pub fn snapshot(positions: &[IrradiatedPosition]) -> Snapshot {
    positions
        .iter()
        .map(|p| (p.hole, hash_position(p)))
        .collect()
}

/// Compute the dirty set by comparing `previous` against `positions`.
pub fn compute_dirty_set(positions: &[IrradiatedPosition], previous: &Snapshot) -> DirtySet {
    let current = snapshot(positions);

    let mut dirty = DirtySet::default();
    for (&hole, &hash) in &current {
        match previous.get(&hole) {
            Some(&prev) if prev != hash => {
                dirty.modified.insert(hole);
            }
            Some(_) => {}
            None => {
                dirty.new.insert(hole);
            }
        }
    }
    for &hole in previous.keys() {
        if !current.contains_key(&hole) {
            dirty.removed.insert(hole);
        }
    }
    dirty
}
