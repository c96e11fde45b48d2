//! Granville-Phillips micro-ion gauge controller.

use tracing::warn;

use crate::comm::Communicator;
use crate::parse::parse_float_or;

/// Reads pressures from named gauges.
pub trait GaugeController {
    /// Pressure of `gauge`, or the controller's no-reading value if it gave
    /// no usable reply.
    fn get_pressure(&mut self, gauge: &str) -> f64;
}

/// Pressure reported when a gauge gives no usable reply.
pub const NO_READING: f64 = 0.0;

pub const ION_GAUGE: &str = "IG1";
pub const CONVECTRON_A: &str = "CG1";
pub const CONVECTRON_B: &str = "CG2";

/// Controller speaking the `#<addr>RD<gauge>` protocol.
pub struct MicroIonController<C> {
    comm: C,
    address: String,
    no_reading: f64,
}

/// The controller without a front panel; the protocol is identical.
pub type HeadlessMicroIonController<C> = MicroIonController<C>;

impl<C: Communicator> MicroIonController<C> {
    pub const DEFAULT_ADDRESS: &'static str = "01";

    pub fn new(comm: C, address: &str) -> Self {
        MicroIonController {
            comm,
            address: address.to_string(),
            no_reading: NO_READING,
        }
    }

    /// Replaces the pressure reported for silent or garbled gauges.
    pub fn with_no_reading(mut self, value: f64) -> Self {
        self.no_reading = value;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn communicator(&self) -> &C {
        &self.comm
    }

    pub fn get_ion_pressure(&mut self) -> f64 {
        self.get_pressure(ION_GAUGE)
    }

    pub fn get_convectron_a_pressure(&mut self) -> f64 {
        self.get_pressure(CONVECTRON_A)
    }

    pub fn get_convectron_b_pressure(&mut self) -> f64 {
        self.get_pressure(CONVECTRON_B)
    }

    /// Strips the `*<addr>_` echo from a reply.
    fn payload<'a>(&self, reply: &'a str) -> Option<&'a str> {
        let rest = reply.trim().strip_prefix('*')?.strip_prefix(self.address.as_str())?;
        Some(rest.trim_start_matches(&['_', ' '][..]))
    }
}

impl<C: Communicator> GaugeController for MicroIonController<C> {
    fn get_pressure(&mut self, gauge: &str) -> f64 {
        let cmd = format!("#{}RD{gauge}", self.address);
        let reply = self.comm.ask(&cmd);
        let payload = match reply.as_deref() {
            Some(reply) => {
                let payload = self.payload(reply);
                if payload.is_none() {
                    warn!(cmd = %cmd, reply = %reply, "reply from wrong address");
                }
                payload
            }
            None => None,
        };
        parse_float_or(payload, self.no_reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ScriptedCommunicator;

    #[test]
    fn reads_pressure_for_own_address() {
        let comm = ScriptedCommunicator::new()
            .expect("#01RDIG1", Some("*01_1.20E-09"))
            .expect("#01RDCG1", Some("*01 7.60E+02"));
        let mut gauge = MicroIonController::new(comm, "01");
        assert_eq!(
            gauge.address(),
            MicroIonController::<ScriptedCommunicator>::DEFAULT_ADDRESS
        );
        assert_eq!(gauge.get_ion_pressure(), 1.2e-9);
        assert_eq!(gauge.get_convectron_a_pressure(), 760.0);
    }

    #[test]
    fn foreign_or_garbled_replies_are_none() {
        let comm = ScriptedCommunicator::new()
            .expect("#02RDIG1", Some("*03_1.0E-09"))
            .expect("#02RDCG2", Some("*02_OFF"));
        let mut gauge: HeadlessMicroIonController<_> = MicroIonController::new(comm, "02");
        assert_eq!(gauge.get_ion_pressure(), NO_READING);
        assert_eq!(gauge.get_convectron_b_pressure(), NO_READING);
        assert_eq!(gauge.get_pressure("CG1"), NO_READING);
    }

    #[test]
    fn no_reading_value_is_configurable() {
        let comm = ScriptedCommunicator::new().expect("#01RDIG1", Some("*01_OFF"));
        let mut gauge = MicroIonController::new(comm, "01").with_no_reading(-1.0);
        assert_eq!(gauge.get_ion_pressure(), -1.0);
    }
}
