//! Contract tests run against every [`RecordStore`] backend.
//!
//! Each check is written once, generic over the store, and instantiated for
//! both `InMemoryStore` and `SqliteStore` so the two backends cannot drift.

use labbook_storage::{
    InMemoryStore, IrradiationFilter, NameOrder, PositionUpdate, RecordStore, SampleFilter,
    SqliteStore, StorageError,
};

// ---------------------------------------------------------------------------
// Shared checks
// ---------------------------------------------------------------------------

fn get_or_create_is_idempotent<S: RecordStore>(store: &mut S) {
    let p1 = store.add_project("Rift", Some("Ross")).unwrap();
    let p2 = store.add_project("Rift", None).unwrap();
    assert_eq!(p1.id, p2.id);

    let m1 = store.add_material("sanidine", Some("20-40")).unwrap();
    let m2 = store.add_material("sanidine", Some("40-60")).unwrap();
    assert_eq!(m1.id, m2.id);
    assert_eq!(m2.grainsize.as_deref(), Some("20-40"));

    let s1 = store.add_sample("S1", "Rift", Some("sanidine")).unwrap();
    let s2 = store.add_sample("S1", "Rift", Some("sanidine")).unwrap();
    assert_eq!(s1.id, s2.id);

    let ms1 = store.add_mass_spectrometer("jan", "argus").unwrap();
    let ms2 = store.add_mass_spectrometer("jan", "helix").unwrap();
    assert_eq!(ms1.id, ms2.id);

    let i1 = store.add_irradiation("NM-300").unwrap();
    let i2 = store.add_irradiation("NM-300").unwrap();
    assert_eq!(i1.id, i2.id);

    let l1 = store
        .add_irradiation_level("NM-300", "A", Some("24Spokes"), None, "")
        .unwrap();
    let l2 = store
        .add_irradiation_level("NM-300", "A", None, None, "other")
        .unwrap();
    assert_eq!(l1.id, l2.id);

    let pos1 = store.add_irradiation_position("NM-300", "A", 5).unwrap();
    let pos2 = store.add_irradiation_position("NM-300", "A", 5).unwrap();
    assert_eq!(pos1.id, pos2.id);

    store.commit().unwrap();

    assert_eq!(store.get_projects(None).unwrap().len(), 1);
    assert_eq!(store.get_samples(&SampleFilter::default()).unwrap().len(), 1);
    assert_eq!(store.get_mass_spectrometers().unwrap().len(), 1);
    assert_eq!(store.get_levels("NM-300").unwrap().len(), 1);
    assert_eq!(store.get_level_positions("NM-300", "A").unwrap().len(), 1);
}

fn missing_parents_are_typed_errors<S: RecordStore>(store: &mut S) {
    assert!(matches!(
        store.add_irradiation_level("nope", "A", None, None, ""),
        Err(StorageError::IrradiationNotFound(_))
    ));
    assert!(matches!(
        store.add_irradiation_position("nope", "A", 1),
        Err(StorageError::IrradiationNotFound(_))
    ));
    store.add_irradiation("NM-1").unwrap();
    assert!(matches!(
        store.add_irradiation_position("NM-1", "Z", 1),
        Err(StorageError::LevelNotFound { .. })
    ));
    assert!(matches!(
        store.add_sample("S", "nope", None),
        Err(StorageError::ProjectNotFound(_))
    ));
    assert!(store.get_irradiation_level("NM-1", "Z").unwrap().is_none());
    assert!(store.get_sample("S", "nope").unwrap().is_none());
}

fn session_scopes_a_unit_of_work<S: RecordStore>(store: &mut S) {
    let result: Result<(), StorageError> = store.session(|s| {
        s.add_irradiation("NM-2")?;
        s.add_irradiation_level("NM-2", "B", None, None, "")?;
        Ok(())
    });
    result.unwrap();

    let aborted: Result<(), StorageError> = store.session(|s| {
        s.add_irradiation("NM-3")?;
        s.add_irradiation_level("NM-3", "C", None, None, "")?;
        s.add_irradiation_position("NM-3", "missing", 1)?;
        Ok(())
    });
    assert!(aborted.is_err());

    assert!(store.get_irradiation("NM-2").unwrap().is_some());
    assert!(store.get_irradiation("NM-3").unwrap().is_none());
}

fn ordering_and_filters<S: RecordStore>(store: &mut S) {
    for name in ["B", "C", "A"] {
        store.add_project(name, None).unwrap();
    }
    let asc: Vec<_> = store
        .get_projects(Some(NameOrder::Asc))
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(asc, vec!["A", "B", "C"]);
    let desc: Vec<_> = store
        .get_projects(Some(NameOrder::Desc))
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(desc, vec!["C", "B", "A"]);
    let insertion: Vec<_> = store
        .get_projects(None)
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(insertion, vec!["B", "C", "A"]);

    for name in ["NM-10", "NM-12", "NM-11", "OT-1"] {
        store.add_irradiation(name).unwrap();
    }
    let latest = store
        .get_irradiations(&IrradiationFilter {
            prefix: Some("NM".into()),
            order: Some(NameOrder::Desc),
            limit: Some(2),
            ..Default::default()
        })
        .unwrap();
    let names: Vec<_> = latest.into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["NM-12", "NM-11"]);

    let none = store
        .get_irradiations(&IrradiationFilter {
            names: Some(vec![]),
            ..Default::default()
        })
        .unwrap();
    assert!(none.is_empty());
}

fn identifier_lookup_reports_owning_irradiation<S: RecordStore>(store: &mut S) {
    store.add_irradiation("NM-5").unwrap();
    store.add_irradiation_level("NM-5", "A", None, None, "").unwrap();
    let pos = store.add_irradiation_position("NM-5", "A", 2).unwrap();
    store
        .update_position(
            pos.id,
            &PositionUpdate {
                identifier: Some("12345".into()),
                weight: Some(2.0),
                ..Default::default()
            },
        )
        .unwrap();
    store.commit().unwrap();

    let detail = store.get_identifier("12345").unwrap().unwrap();
    assert_eq!(detail.irradiation, "NM-5");
    assert_eq!(detail.level, "A");
    assert_eq!(detail.position.position, 2);
    assert_eq!(detail.position.weight, 2.0);
    assert!(detail.sample.is_none());
    assert!(!detail.analyzed());

    // An empty identifier clears the column.
    store
        .update_position(
            pos.id,
            &PositionUpdate {
                identifier: Some(String::new()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(store.get_identifier("12345").unwrap().is_none());
}

fn igsn_is_stored_on_sample<S: RecordStore>(store: &mut S) {
    store.add_project("P", None).unwrap();
    let sample = store.add_sample("S", "P", None).unwrap();
    store.set_sample_igsn(&sample, "IEXXX0001").unwrap();
    let again = store.get_sample("S", "P").unwrap().unwrap();
    assert_eq!(again.igsn.as_deref(), Some("IEXXX0001"));
}

// ---------------------------------------------------------------------------
// Instantiations
// ---------------------------------------------------------------------------

macro_rules! contract_tests {
    ($module:ident, $ctor:expr) => {
        mod $module {
            use super::*;

            #[test]
            fn get_or_create() {
                get_or_create_is_idempotent(&mut $ctor);
            }

            #[test]
            fn missing_parents() {
                missing_parents_are_typed_errors(&mut $ctor);
            }

            #[test]
            fn session() {
                session_scopes_a_unit_of_work(&mut $ctor);
            }

            #[test]
            fn ordering() {
                ordering_and_filters(&mut $ctor);
            }

            #[test]
            fn identifier_lookup() {
                identifier_lookup_reports_owning_irradiation(&mut $ctor);
            }

            #[test]
            fn igsn() {
                igsn_is_stored_on_sample(&mut $ctor);
            }
        }
    };
}

contract_tests!(in_memory, InMemoryStore::new());
contract_tests!(sqlite, SqliteStore::in_memory().unwrap());
