//! Valve actuators.

use tracing::{debug, warn};

use crate::comm::Communicator;
use crate::parse::parse_int_or;

/// Opens, closes and reports the state of addressed valves.
pub trait Actuator {
    /// True if the valve reports open. No reply reads as closed.
    fn get_channel_state(&mut self, address: &str) -> bool;

    /// True if the valve acknowledged and now reports open.
    fn open_channel(&mut self, address: &str) -> bool;

    /// True if the valve acknowledged and now reports closed.
    fn close_channel(&mut self, address: &str) -> bool;
}

/// The NGX controller answers commands with `E<nn>`; `E00` accepts.
const ACCEPTED: i64 = 0;
const OPEN: &str = "OPEN";

/// Status code of an `E<nn>` reply, -1 if the reply is not one.
fn reply_code(reply: &str) -> i64 {
    parse_int_or(reply.trim().strip_prefix('E'), -1)
}

/// Valve actuator on an Isotopx NGX spectrometer controller.
pub struct NgxGpActuator<C> {
    comm: C,
}

impl<C: Communicator> NgxGpActuator<C> {
    pub fn new(comm: C) -> Self {
        NgxGpActuator { comm }
    }

    pub fn communicator(&self) -> &C {
        &self.comm
    }

    /// Sends an actuation command and confirms the resulting state.
    fn actuate(&mut self, command: &str, address: &str, want_open: bool) -> bool {
        let cmd = format!("{command} {address}");
        match self.comm.ask(&cmd) {
            None if self.comm.is_simulation() => true,
            Some(reply) => match reply_code(&reply) {
                ACCEPTED => self.get_channel_state(address) == want_open,
                code => {
                    warn!(cmd = %cmd, reply = %reply, code, "valve rejected command");
                    false
                }
            },
            None => {
                warn!(cmd = %cmd, "valve did not acknowledge");
                false
            }
        }
    }
}

impl<C: Communicator> Actuator for NgxGpActuator<C> {
    fn get_channel_state(&mut self, address: &str) -> bool {
        let cmd = format!("GetValveStatus {address}");
        let reply = self.comm.ask(&cmd);
        debug!(cmd = %cmd, reply = ?reply, "channel state");
        reply.is_some_and(|r| r.trim() == OPEN)
    }

    fn open_channel(&mut self, address: &str) -> bool {
        self.actuate("OpenValve", address, true)
    }

    fn close_channel(&mut self, address: &str) -> bool {
        self.actuate("CloseValve", address, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ScriptedCommunicator;

    #[test]
    fn open_is_confirmed_by_status() {
        let comm = ScriptedCommunicator::new()
            .expect("OpenValve A", Some("E00"))
            .expect("GetValveStatus A", Some("OPEN"));
        let mut valve = NgxGpActuator::new(comm);
        assert!(valve.open_channel("A"));
        assert!(valve.communicator().is_exhausted());
    }

    #[test]
    fn close_fails_if_valve_still_open() {
        let comm = ScriptedCommunicator::new()
            .expect("CloseValve B", Some("E00"))
            .expect("GetValveStatus B", Some("OPEN"));
        let mut valve = NgxGpActuator::new(comm);
        assert!(!valve.close_channel("B"));
    }

    #[test]
    fn close_confirmed_when_status_closed() {
        let comm = ScriptedCommunicator::new()
            .expect("CloseValve B", Some("E00"))
            .expect("GetValveStatus B", Some("CLOSED"));
        let mut valve = NgxGpActuator::new(comm);
        assert!(valve.close_channel("B"));
    }

    #[test]
    fn error_code_is_a_failure() {
        let comm = ScriptedCommunicator::new().expect("OpenValve C", Some("E01"));
        let mut valve = NgxGpActuator::new(comm);
        assert!(!valve.open_channel("C"));
        assert_eq!(valve.communicator().sent(), ["OpenValve C"]);
    }

    #[test]
    fn reply_codes() {
        assert_eq!(reply_code("E00\r"), ACCEPTED);
        assert_eq!(reply_code("E12"), 12);
        assert_eq!(reply_code("OK"), -1);
        assert_eq!(reply_code("Exx"), -1);
    }

    #[test]
    fn silence_counts_as_success_only_in_simulation() {
        let mut simulated = NgxGpActuator::new(ScriptedCommunicator::simulation());
        assert!(simulated.open_channel("A"));
        assert!(simulated.close_channel("A"));
        assert!(!simulated.get_channel_state("A"));

        let mut real = NgxGpActuator::new(ScriptedCommunicator::new());
        assert!(!real.open_channel("A"));
    }
}
