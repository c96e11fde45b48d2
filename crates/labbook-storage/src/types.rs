//! Storage-layer query types.
//!
//! Filters and ordering directives for the list accessors, the partial
//! update applied to a position, and [`PositionDetail`], the joined row the
//! position synchronizer reads from.

use serde::{Deserialize, Serialize};

use labbook_core::records::IrradiationPosition;
use labbook_core::SampleId;

/// Ordering by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameOrder {
    Asc,
    Desc,
}

impl NameOrder {
    /// SQL ordering keyword.
    pub fn sql(&self) -> &'static str {
        match self {
            NameOrder::Asc => "ASC",
            NameOrder::Desc => "DESC",
        }
    }

    /// Sorts `items` in place by the name returned from `key`.
    pub fn sort_by_name<T>(&self, items: &mut [T], key: impl Fn(&T) -> &str) {
        items.sort_by(|a, b| key(a).cmp(key(b)));
        if *self == NameOrder::Desc {
            items.reverse();
        }
    }
}

/// Filter for [`crate::RecordStore::get_samples`].
#[derive(Debug, Clone, Default)]
pub struct SampleFilter {
    /// Restrict to samples of these projects. Empty means all projects.
    pub projects: Vec<String>,
    pub order: Option<NameOrder>,
}

impl SampleFilter {
    pub fn project(name: &str) -> Self {
        SampleFilter {
            projects: vec![name.to_string()],
            order: None,
        }
    }
}

/// Filter for [`crate::RecordStore::get_irradiations`].
#[derive(Debug, Clone, Default)]
pub struct IrradiationFilter {
    /// Restrict to exactly these names.
    pub names: Option<Vec<String>>,
    /// Restrict to names starting with this prefix.
    pub prefix: Option<String>,
    pub order: Option<NameOrder>,
    pub limit: Option<usize>,
}

impl IrradiationFilter {
    /// Returns true if `name` passes the name and prefix predicates.
    pub fn matches(&self, name: &str) -> bool {
        if let Some(names) = &self.names {
            if !names.iter().any(|n| n == name) {
                return false;
            }
        }
        match &self.prefix {
            Some(prefix) => name.starts_with(prefix.as_str()),
            None => true,
        }
    }
}

/// Partial update of a persisted position. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionUpdate {
    pub identifier: Option<String>,
    pub sample: Option<SampleId>,
    pub weight: Option<f64>,
    pub note: Option<String>,
}

/// A position joined with its level, irradiation and sample chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDetail {
    pub position: IrradiationPosition,
    pub irradiation: String,
    pub level: String,
    pub sample: Option<String>,
    pub material: Option<String>,
    pub grainsize: Option<String>,
    pub project: Option<String>,
    pub principal_investigator: Option<String>,
    pub igsn: Option<String>,
    pub analysis_count: u32,
}

impl PositionDetail {
    pub fn analyzed(&self) -> bool {
        self.analysis_count > 0
    }
}

/// Reduces the rows matched by a natural-key lookup to at most one.
pub(crate) fn at_most_one<T>(
    table: &'static str,
    name: &str,
    mut rows: Vec<T>,
) -> Result<Option<T>, crate::error::StorageError> {
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        count => Err(crate::error::StorageError::AmbiguousName {
            table,
            name: name.to_string(),
            count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_by_name_respects_direction() {
        let mut names = vec!["NM-2", "NM-10", "NM-1"];
        NameOrder::Asc.sort_by_name(&mut names, |s| *s);
        assert_eq!(names, vec!["NM-1", "NM-10", "NM-2"]);
        NameOrder::Desc.sort_by_name(&mut names, |s| *s);
        assert_eq!(names, vec!["NM-2", "NM-10", "NM-1"]);
    }

    #[test]
    fn irradiation_filter_combines_names_and_prefix() {
        let filter = IrradiationFilter {
            names: Some(vec!["NM-1".into(), "X-1".into()]),
            prefix: Some("NM".into()),
            ..Default::default()
        };
        assert!(filter.matches("NM-1"));
        assert!(!filter.matches("X-1"));
        assert!(!filter.matches("NM-2"));
        assert!(IrradiationFilter::default().matches("anything"));
    }

    #[test]
    fn at_most_one_reports_duplicates() {
        assert_eq!(at_most_one::<u8>("projects", "P", vec![]).unwrap(), None);
        assert_eq!(at_most_one("projects", "P", vec![1]).unwrap(), Some(1));
        let err = at_most_one("projects", "P", vec![1, 2]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StorageError::AmbiguousName { count: 2, .. }
        ));
    }
}
