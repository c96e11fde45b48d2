//! Instrument drivers.
//!
//! Drivers talk to devices through a [`Communicator`] and are created from
//! a [`DeviceSpec`] by the [`DeviceRegistry`]. Raw replies are coerced with
//! the helpers in [`parse`].

pub mod actuator;
pub mod comm;
pub mod error;
pub mod gauge;
pub mod parse;
pub mod registry;

pub use actuator::{Actuator, NgxGpActuator};
pub use comm::{Communicator, ScriptedCommunicator, TcpCommunicator};
pub use error::HardwareError;
pub use gauge::{GaugeController, HeadlessMicroIonController, MicroIonController, NO_READING};
pub use parse::{parse_float_or, parse_int_or};
pub use registry::{DeviceKind, DeviceRegistry, DeviceSpec, Driver};
