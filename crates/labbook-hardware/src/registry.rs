//! Device kinds and the driver registry.
//!
//! [`DeviceKind`] names every driver a station configuration may ask for,
//! under the names those configurations have always used. The
//! [`DeviceRegistry`] maps a kind to a factory; only kinds with a
//! registered factory can be instantiated.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::actuator::{Actuator, NgxGpActuator};
use crate::comm::Communicator;
use crate::error::HardwareError;
use crate::gauge::{GaugeController, MicroIonController};

macro_rules! device_kinds {
    ($($variant:ident => $name:literal,)*) => {
        /// A hardware driver kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "&'static str")]
        pub enum DeviceKind {
            $($variant,)*
        }

        impl DeviceKind {
            pub const ALL: &'static [DeviceKind] = &[$(DeviceKind::$variant,)*];

            /// The configuration name of this kind.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(DeviceKind::$variant => $name,)*
                }
            }
        }
    };
}

device_kinds! {
    CommandProcessor => "CommandProcessor",
    RemoteCommandServer => "RemoteCommandServer",
    DPi32TemperatureMonitor => "DPi32TemperatureMonitor",
    SwitchController => "SwitchController",
    DummyController => "DummyController",
    AnalogPowerMeter => "AnalogPowerMeter",
    Adc => "ADC",
    AgilentAdc => "AgilentADC",
    Eurotherm => "Eurotherm",
    ThermoRack => "ThermoRack",
    MicroIonController => "MicroIonController",
    PychronMicroIonController => "PychronMicroIonController",
    QtegraMicroIonController => "QtegraMicroIonController",
    QtegraGaugeController => "QtegraGaugeController",
    MksController => "MKSController",
    PfeifferMaxiGaugeController => "PfeifferMaxiGaugeController",
    Xgs600GaugeController => "XGS600GaugeController",
    ArgusController => "ArgusController",
    HelixController => "HelixController",
    FerrupsUps => "FerrupsUPS",
    QtegraDevice => "QtegraDevice",
    PidController => "PidController",
    PychronLaser => "PychronLaser",
    AgilentMultiplexer => "AgilentMultiplexer",
    Transducer => "Transducer",
    ApisController => "ApisController",
    Pneumatics => "Pneumatics",
    PychronPneumatics => "PychronPneumatics",
    PychronChiller => "PychronChiller",
    RemoteNewportMotionController => "RemoteNewportMotionController",
    TempHumMicroServer => "TempHumMicroServer",
    AirTransducer => "AirTransducer",
    NmgrlMagnetDumper => "NMGRLMagnetDumper",
    LamontFurnaceControl => "LamontFurnaceControl",
    Model335TemperatureController => "Model335TemperatureController",
    Model336TemperatureController => "Model336TemperatureController",
    MksSrg => "MKSSRG",
    GenericDevice => "GenericDevice",
    NgxGpActuator => "NGXGPActuator",
}

impl DeviceKind {
    /// Kinds kept only so old configurations still load.
    pub fn is_deprecated(&self) -> bool {
        matches!(self, DeviceKind::QtegraMicroIonController)
    }

    /// The kind whose driver actually serves this one.
    pub fn canonical(&self) -> DeviceKind {
        match self {
            DeviceKind::QtegraMicroIonController => DeviceKind::PychronMicroIonController,
            other => *other,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = HardwareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = DeviceKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| HardwareError::UnsupportedDevice(s.to_string()))?;
        if kind.is_deprecated() {
            warn!(kind = s, "deprecated device kind, use QtegraGaugeController instead");
        }
        Ok(kind)
    }
}

impl TryFrom<String> for DeviceKind {
    type Error = HardwareError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DeviceKind> for &'static str {
    fn from(kind: DeviceKind) -> Self {
        kind.as_str()
    }
}

/// One configured device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub name: String,
    pub kind: DeviceKind,
    /// Bus or channel address; meaning depends on the kind.
    #[serde(default)]
    pub address: String,
}

/// An instantiated driver.
pub enum Driver {
    Actuator(Box<dyn Actuator>),
    Gauge(Box<dyn GaugeController>),
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Actuator(_) => f.write_str("Driver::Actuator"),
            Driver::Gauge(_) => f.write_str("Driver::Gauge"),
        }
    }
}

pub type Factory = fn(&DeviceSpec, Box<dyn Communicator>) -> Driver;

fn micro_ion(spec: &DeviceSpec, comm: Box<dyn Communicator>) -> Driver {
    let address = if spec.address.is_empty() {
        MicroIonController::<Box<dyn Communicator>>::DEFAULT_ADDRESS
    } else {
        spec.address.as_str()
    };
    Driver::Gauge(Box::new(MicroIonController::new(comm, address)))
}

fn ngx_actuator(_spec: &DeviceSpec, comm: Box<dyn Communicator>) -> Driver {
    Driver::Actuator(Box::new(NgxGpActuator::new(comm)))
}

/// Maps device kinds to driver factories.
#[derive(Default)]
pub struct DeviceRegistry {
    factories: HashMap<DeviceKind, Factory>,
}

impl DeviceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every driver this crate implements.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        registry.register(DeviceKind::MicroIonController, micro_ion);
        registry.register(DeviceKind::PychronMicroIonController, micro_ion);
        registry.register(DeviceKind::NgxGpActuator, ngx_actuator);
        registry
    }

    pub fn register(&mut self, kind: DeviceKind, factory: Factory) {
        self.factories.insert(kind, factory);
    }

    pub fn is_supported(&self, kind: DeviceKind) -> bool {
        self.factories.contains_key(&kind.canonical())
    }

    /// Registered kinds, in declaration order.
    pub fn supported(&self) -> Vec<DeviceKind> {
        let mut kinds: Vec<DeviceKind> = self.factories.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn create(
        &self,
        spec: &DeviceSpec,
        comm: Box<dyn Communicator>,
    ) -> Result<Driver, HardwareError> {
        let factory = self
            .factories
            .get(&spec.kind.canonical())
            .ok_or_else(|| HardwareError::UnsupportedDevice(spec.kind.to_string()))?;
        debug!(name = %spec.name, kind = %spec.kind, "creating device");
        Ok(factory(spec, comm))
    }

    pub fn create_actuator(
        &self,
        spec: &DeviceSpec,
        comm: Box<dyn Communicator>,
    ) -> Result<Box<dyn Actuator>, HardwareError> {
        match self.create(spec, comm)? {
            Driver::Actuator(actuator) => Ok(actuator),
            Driver::Gauge(_) => Err(HardwareError::WrongRole {
                name: spec.name.clone(),
                expected: "an actuator",
            }),
        }
    }

    pub fn create_gauge(
        &self,
        spec: &DeviceSpec,
        comm: Box<dyn Communicator>,
    ) -> Result<Box<dyn GaugeController>, HardwareError> {
        match self.create(spec, comm)? {
            Driver::Gauge(gauge) => Ok(gauge),
            Driver::Actuator(_) => Err(HardwareError::WrongRole {
                name: spec.name.clone(),
                expected: "a gauge controller",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ScriptedCommunicator;

    fn spec(kind: DeviceKind, address: &str) -> DeviceSpec {
        DeviceSpec {
            name: "dev".into(),
            kind,
            address: address.into(),
        }
    }

    #[test]
    fn names_round_trip() {
        for kind in DeviceKind::ALL {
            assert_eq!(kind.as_str().parse::<DeviceKind>().unwrap(), *kind);
        }
        assert_eq!(DeviceKind::ALL.len(), 39);
    }

    #[test]
    fn unknown_name_is_unsupported() {
        assert!(matches!(
            "FluxCapacitor".parse::<DeviceKind>(),
            Err(HardwareError::UnsupportedDevice(name)) if name == "FluxCapacitor"
        ));
    }

    #[test]
    fn deprecated_alias_uses_micro_ion_driver() {
        let kind: DeviceKind = "QtegraMicroIonController".parse().unwrap();
        assert!(kind.is_deprecated());
        let registry = DeviceRegistry::with_builtin_drivers();
        assert!(registry.is_supported(kind));

        let comm = ScriptedCommunicator::new().expect("#01RDIG1", Some("*01_2.0E-08"));
        let mut gauge = registry.create_gauge(&spec(kind, ""), Box::new(comm)).unwrap();
        assert_eq!(gauge.get_pressure("IG1"), 2.0e-8);
    }

    #[test]
    fn unregistered_kind_is_unsupported() {
        let registry = DeviceRegistry::with_builtin_drivers();
        let err = registry
            .create(
                &spec(DeviceKind::Eurotherm, ""),
                Box::new(ScriptedCommunicator::simulation()),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "unsupported device: Eurotherm");
    }

    #[test]
    fn role_mismatch_is_reported() {
        let registry = DeviceRegistry::with_builtin_drivers();
        let result = registry.create_gauge(
            &spec(DeviceKind::NgxGpActuator, "A"),
            Box::new(ScriptedCommunicator::simulation()),
        );
        assert!(matches!(result, Err(HardwareError::WrongRole { .. })));

        let mut valve = registry
            .create_actuator(
                &spec(DeviceKind::NgxGpActuator, "A"),
                Box::new(ScriptedCommunicator::simulation()),
            )
            .unwrap();
        assert!(valve.open_channel("A"));
    }

    #[test]
    fn spec_deserializes_by_configuration_name() {
        let spec: DeviceSpec =
            serde_json::from_str(r#"{"name":"gauge1","kind":"MicroIonController","address":"02"}"#)
                .unwrap();
        assert_eq!(spec.kind, DeviceKind::MicroIonController);
        assert!(serde_json::from_str::<DeviceSpec>(r#"{"name":"x","kind":"Nope"}"#).is_err());
        assert_eq!(
            serde_json::to_string(&DeviceKind::MksSrg).unwrap(),
            r#""MKSSRG""#
        );
    }

    #[test]
    fn supported_lists_builtin_kinds() {
        let registry = DeviceRegistry::with_builtin_drivers();
        assert_eq!(
            registry.supported(),
            vec![
                DeviceKind::MicroIonController,
                DeviceKind::PychronMicroIonController,
                DeviceKind::NgxGpActuator,
            ]
        );
    }
}
