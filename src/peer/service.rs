//! service.rs
//! Actuator-side counterpart of the dispatch loop.
//!
//! Receives one-byte commands, applies them to an `OutputDriver` and
//! acknowledges every datagram with `'Y'` (SHUTDOWN included). Returns after
//! SHUTDOWN.

use std::{
    io,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
};

use log::{debug, info, warn};

use crate::peer::driver::OutputDriver;
use crate::trigger::state::{ACK, Command};

const MAX_MSG_SIZE: usize = 32;

/// Counts of what the peer handled before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerReport {
    pub commands: u64,
    pub event_changes: u64,
    pub sync_changes: u64,
    pub unknown: u64,
}

pub struct ActuatorPeer {
    socket: UdpSocket,
}

impl ActuatorPeer {
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        info!("[ActuatorPeer] listening on {}", socket.local_addr()?);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serves commands until SHUTDOWN arrives.
    pub fn run<D: OutputDriver>(&self, driver: &mut D) -> io::Result<PeerReport> {
        let mut report = PeerReport::default();
        let mut buf = [0u8; MAX_MSG_SIZE];

        loop {
            let (n, from) = self.socket.recv_from(&mut buf)?;
            if n == 0 {
                continue;
            }
            report.commands += 1;

            let shutdown = match Command::decode(buf[0]) {
                Some(decoded) => {
                    debug!("[ActuatorPeer] {} from {}: {:?}", Command::from_byte(buf[0]), from, decoded);
                    if let Some(on) = decoded.sync {
                        driver.sync(on);
                        report.sync_changes += 1;
                    }
                    if let Some(on) = decoded.event {
                        driver.event(on);
                        report.event_changes += 1;
                    }
                    decoded.shutdown
                }
                None => {
                    warn!("[ActuatorPeer] unknown command {} from {}", Command::from_byte(buf[0]), from);
                    report.unknown += 1;
                    false
                }
            };

            self.socket.send_to(&[ACK], from)?;

            if shutdown {
                driver.shutdown();
                info!("[ActuatorPeer] shutdown after {} commands", report.commands);
                return Ok(report);
            }
        }
    }
}
