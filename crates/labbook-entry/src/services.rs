//! Optional external services.
//!
//! IGSN registration and the mass-spectrometer database bridge are not
//! always installed. The [`ServiceRegistry`] holds whichever are present
//! and the operations here report [`EntryError::ServiceUnavailable`] when
//! the one they need is missing.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use labbook_core::IrradiatedPosition;

use crate::error::EntryError;
use crate::session::EntrySession;

pub const IGSN_SERVICE: &str = "IGSN service";
pub const MASS_SPEC_SERVICE: &str = "Mass Spec database";

/// Issues International Geo Sample Numbers.
pub trait IgsnService {
    /// A fresh IGSN for `sample`, `None` if the registry declined.
    fn new_igsn(&mut self, sample: &str) -> Result<Option<String>, EntryError>;
}

/// Copies J values into a mass-spectrometer database.
pub trait MassSpecBridge {
    fn connect(&mut self) -> bool;

    /// Returns true if anything was transferred.
    fn transfer_j(
        &mut self,
        irradiation: &str,
        level: &str,
        positions: &[IrradiatedPosition],
    ) -> Result<bool, EntryError>;
}

#[derive(Default)]
pub struct ServiceRegistry {
    igsn: Option<Box<dyn IgsnService>>,
    mass_spec: Option<Box<dyn MassSpecBridge>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_igsn(mut self, service: impl IgsnService + 'static) -> Self {
        self.igsn = Some(Box::new(service));
        self
    }

    pub fn with_mass_spec(mut self, bridge: impl MassSpecBridge + 'static) -> Self {
        self.mass_spec = Some(Box::new(bridge));
        self
    }

    pub fn igsn(&mut self) -> Result<&mut (dyn IgsnService + 'static), EntryError> {
        self.igsn.as_deref_mut().ok_or_else(|| {
            warn!("IGSN service is not configured");
            EntryError::ServiceUnavailable(IGSN_SERVICE.to_string())
        })
    }

    pub fn mass_spec(&mut self) -> Result<&mut (dyn MassSpecBridge + 'static), EntryError> {
        self.mass_spec.as_deref_mut().ok_or_else(|| {
            warn!("mass spec database is not configured");
            EntryError::ServiceUnavailable(MASS_SPEC_SERVICE.to_string())
        })
    }
}

/// Result of an IGSN request pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IgsnOutcome {
    /// Positions that received an IGSN.
    pub assigned: usize,
    /// False if the service declined a sample and the pass stopped early.
    /// The level should only be saved when this is true.
    pub complete: bool,
}

/// Requests one IGSN per distinct (sample, material, project) among the
/// selected positions (all positions if none are selected) that lack one.
pub fn request_igsns(
    session: &mut EntrySession,
    registry: &mut ServiceRegistry,
) -> Result<IgsnOutcome, EntryError> {
    let service = registry.igsn()?;
    info!(irradiation = session.irradiation(), level = session.level(), "get igsn");

    let targets = session.selected_or_all();
    let positions = session.positions_mut();

    let mut groups: BTreeMap<(String, String, String), Vec<usize>> = BTreeMap::new();
    for i in targets {
        let Some(p) = positions.get(i) else { continue };
        if !p.igsn.is_empty() || p.sample.is_empty() {
            continue;
        }
        groups
            .entry((p.sample.clone(), p.material.clone(), p.project.clone()))
            .or_default()
            .push(i);
    }

    let mut outcome = IgsnOutcome {
        assigned: 0,
        complete: true,
    };
    for ((sample, material, project), members) in groups {
        debug!(%sample, %material, %project, "requesting IGSN");
        let Some(igsn) = service.new_igsn(&sample)? else {
            warn!(%sample, "no IGSN issued");
            outcome.complete = false;
            break;
        };
        for i in members {
            positions[i].igsn = igsn.clone();
            outcome.assigned += 1;
        }
    }
    Ok(outcome)
}

/// Hands the selected positions (all if none are selected) to the
/// mass-spectrometer bridge. Returns true if J values were transferred.
pub fn transfer_j(
    session: &EntrySession,
    registry: &mut ServiceRegistry,
) -> Result<bool, EntryError> {
    let bridge = registry.mass_spec()?;
    info!(
        irradiation = session.irradiation(),
        level = session.level(),
        "transferring Js"
    );
    if !bridge.connect() {
        return Err(EntryError::ServiceFailed {
            service: MASS_SPEC_SERVICE.to_string(),
            reason: "unable to connect".to_string(),
        });
    }

    let positions: Vec<IrradiatedPosition> = session
        .selected_or_all()
        .into_iter()
        .filter_map(|i| session.positions().get(i).cloned())
        .collect();
    bridge.transfer_j(session.irradiation(), session.level(), &positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        next: u32,
        limit: u32,
    }

    impl IgsnService for Counter {
        fn new_igsn(&mut self, _sample: &str) -> Result<Option<String>, EntryError> {
            if self.next >= self.limit {
                return Ok(None);
            }
            self.next += 1;
            Ok(Some(format!("IELAB{:04}", self.next)))
        }
    }

    struct Recorder {
        online: bool,
    }

    impl MassSpecBridge for Recorder {
        fn connect(&mut self) -> bool {
            self.online
        }

        fn transfer_j(
            &mut self,
            _irradiation: &str,
            _level: &str,
            positions: &[IrradiatedPosition],
        ) -> Result<bool, EntryError> {
            Ok(positions.len() == 2)
        }
    }

    fn position(hole: u32, sample: &str) -> IrradiatedPosition {
        let mut p = IrradiatedPosition::new(hole).unwrap();
        p.sample = sample.into();
        p.material = "sanidine".into();
        p.project = "Rift".into();
        p
    }

    fn session() -> EntrySession {
        EntrySession::new(
            "NM-1",
            "A",
            "",
            vec![
                position(1, "S1"),
                position(2, "S2"),
                position(3, "S1"),
                position(4, ""),
            ],
        )
    }

    #[test]
    fn missing_service_is_unavailable() {
        let mut registry = ServiceRegistry::new();
        let mut s = session();
        assert!(matches!(
            request_igsns(&mut s, &mut registry),
            Err(EntryError::ServiceUnavailable(_))
        ));
        assert!(matches!(
            transfer_j(&s, &mut registry),
            Err(EntryError::ServiceUnavailable(_))
        ));
    }

    #[test]
    fn one_igsn_per_sample_group() {
        let mut registry = ServiceRegistry::new().with_igsn(Counter { next: 0, limit: 10 });
        let mut s = session();
        let outcome = request_igsns(&mut s, &mut registry).unwrap();
        assert_eq!(outcome.assigned, 3);
        assert!(outcome.complete);

        let igsns: Vec<&str> = s.positions().iter().map(|p| p.igsn.as_str()).collect();
        assert_eq!(igsns, vec!["IELAB0001", "IELAB0002", "IELAB0001", ""]);
    }

    #[test]
    fn declined_request_stops_the_pass() {
        let mut registry = ServiceRegistry::new().with_igsn(Counter { next: 0, limit: 1 });
        let mut s = session();
        let outcome = request_igsns(&mut s, &mut registry).unwrap();
        assert_eq!(outcome.assigned, 2);
        assert!(!outcome.complete);
    }

    #[test]
    fn transfer_sends_selection() {
        let mut registry = ServiceRegistry::new().with_mass_spec(Recorder { online: true });
        let mut s = session();
        s.select_positions(2, false);
        assert!(transfer_j(&s, &mut registry).unwrap());
    }

    #[test]
    fn offline_bridge_fails() {
        let mut registry = ServiceRegistry::new().with_mass_spec(Recorder { online: false });
        assert!(matches!(
            transfer_j(&session(), &mut registry),
            Err(EntryError::ServiceFailed { .. })
        ));
    }
}
