//! Request/response channels to instruments.
//!
//! Every driver talks through a [`Communicator`]: send one ASCII command,
//! read one line back. A missing reply is `None`, never an error, so drivers
//! decide what silence means.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::HardwareError;

pub trait Communicator {
    /// Sends `command` and returns the trimmed reply, `None` if the device
    /// did not answer.
    fn ask(&mut self, command: &str) -> Option<String>;

    /// True when no real device is attached.
    fn is_simulation(&self) -> bool {
        false
    }
}

impl<C: Communicator + ?Sized> Communicator for Box<C> {
    fn ask(&mut self, command: &str) -> Option<String> {
        (**self).ask(command)
    }

    fn is_simulation(&self) -> bool {
        (**self).is_simulation()
    }
}

/// Line-oriented communicator over TCP.
///
/// A reply that misses the read timeout may still arrive later. The
/// connection is then dropped and reopened before the next command so the
/// late line is never taken as the answer to a different command.
#[derive(Debug)]
pub struct TcpCommunicator {
    addr: SocketAddr,
    timeout: Duration,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    terminator: &'static str,
    stale: bool,
}

fn open_stream(
    addr: SocketAddr,
    timeout: Duration,
) -> std::io::Result<(BufReader<TcpStream>, TcpStream)> {
    let stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    let writer = stream.try_clone()?;
    Ok((BufReader::new(stream), writer))
}

impl TcpCommunicator {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, HardwareError> {
        let (reader, writer) = open_stream(addr, timeout)?;
        debug!(%addr, "connected");
        Ok(TcpCommunicator {
            addr,
            timeout,
            reader,
            writer,
            terminator: "\r\n",
            stale: false,
        })
    }

    /// Line terminator appended to each command. Defaults to CRLF.
    pub fn with_terminator(mut self, terminator: &'static str) -> Self {
        self.terminator = terminator;
        self
    }

    fn reconnect(&mut self) -> std::io::Result<()> {
        let _ = self.writer.shutdown(Shutdown::Both);
        let (reader, writer) = open_stream(self.addr, self.timeout)?;
        self.reader = reader;
        self.writer = writer;
        self.stale = false;
        debug!(addr = %self.addr, "reconnected");
        Ok(())
    }

    fn exchange(&mut self, command: &str) -> std::io::Result<Option<String>> {
        if self.stale {
            self.reconnect()?;
        }
        // Anything that fails from here on leaves the stream out of step.
        self.stale = true;
        self.writer
            .write_all(format!("{command}{}", self.terminator).as_bytes())?;
        self.writer.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        self.stale = false;
        let reply = line.trim();
        Ok((!reply.is_empty()).then(|| reply.to_string()))
    }
}

impl Communicator for TcpCommunicator {
    fn ask(&mut self, command: &str) -> Option<String> {
        match self.exchange(command) {
            Ok(reply) => {
                debug!(addr = %self.addr, command, reply = ?reply, "ask");
                reply
            }
            Err(e) => {
                warn!(addr = %self.addr, command, error = %e, "no response");
                None
            }
        }
    }
}

/// Replays a fixed script of command/reply pairs.
///
/// Commands must arrive in script order; anything unexpected gets no reply.
/// With an empty script this is the simulation channel.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCommunicator {
    script: VecDeque<(String, Option<String>)>,
    sent: Vec<String>,
    simulation: bool,
}

impl ScriptedCommunicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel with no device behind it.
    pub fn simulation() -> Self {
        ScriptedCommunicator {
            simulation: true,
            ..Default::default()
        }
    }

    pub fn expect(mut self, command: &str, reply: Option<&str>) -> Self {
        self.script
            .push_back((command.to_string(), reply.map(str::to_string)));
        self
    }

    /// Every command sent so far.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// True once every scripted exchange has happened.
    pub fn is_exhausted(&self) -> bool {
        self.script.is_empty()
    }
}

impl Communicator for ScriptedCommunicator {
    fn ask(&mut self, command: &str) -> Option<String> {
        self.sent.push(command.to_string());
        match self.script.front() {
            Some((expected, _)) if expected == command => {
                self.script.pop_front().and_then(|(_, reply)| reply)
            }
            Some((expected, _)) => {
                warn!(command, expected = %expected, "unexpected command");
                None
            }
            None => None,
        }
    }

    fn is_simulation(&self) -> bool {
        self.simulation
    }
}
