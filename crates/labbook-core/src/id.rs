//! Row identifiers for persisted records.
//!
//! Each table gets a distinct newtype over `i64` so that a `SampleId` cannot
//! be passed where a `ProjectId` is expected. The inner value is the SQLite
//! `INTEGER PRIMARY KEY` of the row.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Project row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub i64);

/// Sample row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleId(pub i64);

/// Material row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialId(pub i64);

/// Mass spectrometer row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MassSpectrometerId(pub i64);

/// Irradiation row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrradiationId(pub i64);

/// Level row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LevelId(pub i64);

/// Irradiation position row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub i64);

/// Analysis row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnalysisId(pub i64);

// Display implementations -- just print the inner value.

macro_rules! display_inner {
    ($($ty:ident),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

display_inner!(
    ProjectId,
    SampleId,
    MaterialId,
    MassSpectrometerId,
    IrradiationId,
    LevelId,
    PositionId,
    AnalysisId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prints_inner_value() {
        assert_eq!(ProjectId(7).to_string(), "7");
        assert_eq!(PositionId(-1).to_string(), "-1");
    }

    #[test]
    fn ids_roundtrip_through_json_as_plain_integers() {
        let json = serde_json::to_string(&LevelId(42)).unwrap();
        assert_eq!(json, "42");
        let back: LevelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LevelId(42));
    }
}
