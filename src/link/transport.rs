//! Datagram link to the actuator peer.
//!
//! One command byte out, one reply datagram back. The socket is created,
//! used and closed on the dispatch thread only.

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
    time::Duration,
};

use log::{debug, info};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::trigger::state::Command;
use crate::utils::error::{ConnectError, TransportError};

/// Replies may carry a trailing `\r\n`; only the first byte matters.
const REPLY_BUFFER: usize = 32;

/// The request/reply channel the dispatch loop drives.
pub trait DatagramTransport: Send {
    /// Sends one command byte and blocks for the reply. Returns the reply's first byte.
    fn send_and_await_reply(&mut self, command: Command) -> Result<u8, TransportError>;

    /// Sends one command byte without waiting for a reply.
    fn send(&mut self, command: Command) -> Result<(), TransportError>;

    /// Releases the channel. Idempotent.
    fn close(&mut self);
}

/// UDP socket connected to a fixed peer.
#[derive(Debug)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    peer: SocketAddr,
    buf: [u8; REPLY_BUFFER],
}

impl UdpTransport {
    /// Resolves `host`, then binds an ephemeral local port and connects to the peer.
    ///
    /// `reply_timeout` bounds every reply wait; `None` blocks indefinitely.
    pub fn open(host: &str, port: u16, reply_timeout: Option<Duration>) -> Result<Self, ConnectError> {
        let peer = resolve(host, port)?;

        let socket = Socket::new(Domain::for_address(peer), Type::DGRAM, Some(Protocol::UDP))?;
        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        socket.bind(&SockAddr::from(local))?;
        socket.connect(&SockAddr::from(peer))?;
        socket.set_read_timeout(reply_timeout)?;

        let socket: UdpSocket = socket.into();
        info!(
            "[Transport] connected {} -> {} (reply timeout: {:?})",
            socket.local_addr()?,
            peer,
            reply_timeout
        );

        Ok(Self {
            socket: Some(socket),
            peer,
            buf: [0u8; REPLY_BUFFER],
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

impl DatagramTransport for UdpTransport {
    fn send_and_await_reply(&mut self, command: Command) -> Result<u8, TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        let stale = discard_pending(socket, &mut self.buf)?;
        if stale > 0 {
            debug!("[Transport] discarded {} stale reply datagram(s) before {}", stale, command);
        }
        socket.send(&[command.byte()])?;
        // ICMP port-unreachable from the previous send surfaces here as ConnectionRefused
        let n = socket.recv(&mut self.buf).map_err(TransportError::from_recv)?;
        Ok(if n > 0 { self.buf[0] } else { 0 })
    }

    fn send(&mut self, command: Command) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        socket.send(&[command.byte()])?;
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("[Transport] closed link to {}", self.peer);
        }
    }
}

/// Empties the receive queue so a late reply to an earlier (timed-out) request
/// cannot be taken as the reply to the next one. Returns how many datagrams were dropped.
fn discard_pending(socket: &UdpSocket, buf: &mut [u8]) -> Result<usize, TransportError> {
    socket.set_nonblocking(true)?;
    let mut dropped = 0;
    // any error ends the drain; a queued ICMP error goes with it and the next send draws a fresh one
    while socket.recv(buf).is_ok() {
        dropped += 1;
    }
    socket.set_nonblocking(false)?;
    Ok(dropped)
}

/// Prefers an IPv4 address so `localhost` lands on a service bound to 127.0.0.1.
fn resolve(host: &str, port: u16) -> Result<SocketAddr, ConnectError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|_| ConnectError::HostResolution(host.to_string()))?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| ConnectError::NoAddress(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::state::{ACK, EVENT_OFF, EVENT_ON, SHUTDOWN};
    use std::{io, thread};

    fn echo_once(reply: &'static [u8]) -> (u16, thread::JoinHandle<u8>) {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = server.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 8];
            let (_, from) = server.recv_from(&mut buf).unwrap();
            server.send_to(reply, from).unwrap();
            buf[0]
        });
        (port, handle)
    }

    #[test]
    fn round_trip_returns_first_reply_byte() {
        let (port, server) = echo_once(b"Y\r\n");
        let mut t = UdpTransport::open("127.0.0.1", port, Some(Duration::from_secs(2))).unwrap();
        assert!(t.is_open());
        assert_eq!(t.send_and_await_reply(Command::from_byte(EVENT_ON)).unwrap(), ACK);
        assert_eq!(server.join().unwrap(), EVENT_ON);
    }

    #[test]
    fn localhost_resolves() {
        let t = UdpTransport::open("localhost", 11666, None).unwrap();
        assert_eq!(t.peer().port(), 11666);
    }

    #[test]
    fn unresolvable_host_fails_to_open() {
        let err = UdpTransport::open("no-such-host.invalid", 11666, None).unwrap_err();
        assert!(matches!(err, ConnectError::HostResolution(_)));
    }

    #[test]
    fn silent_peer_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = silent.local_addr().unwrap().port();
        let mut t = UdpTransport::open("127.0.0.1", port, Some(Duration::from_millis(50))).unwrap();
        let err = t.send_and_await_reply(Command::from_byte(EVENT_ON)).unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }

    #[test]
    fn close_is_idempotent_and_blocks_further_sends() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = peer.local_addr().unwrap().port();
        let mut t = UdpTransport::open("127.0.0.1", port, Some(Duration::from_millis(50))).unwrap();
        t.close();
        t.close();
        assert!(!t.is_open());
        assert!(matches!(t.send(Command::from_byte(SHUTDOWN)), Err(TransportError::Closed)));
        assert!(matches!(
            t.send_and_await_reply(Command::from_byte(EVENT_ON)),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn late_reply_is_not_taken_for_the_next_request() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = peer.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let mut buf = [0u8; 8];
            // first request answered after the client gave up, second at once, third never
            let (_, from) = peer.recv_from(&mut buf).unwrap();
            thread::sleep(Duration::from_millis(80));
            peer.send_to(&[ACK], from).unwrap();
            let (_, from) = peer.recv_from(&mut buf).unwrap();
            peer.send_to(&[ACK], from).unwrap();
            peer.recv_from(&mut buf).unwrap();
            buf[0]
        });

        let mut t = UdpTransport::open("127.0.0.1", port, Some(Duration::from_millis(60))).unwrap();
        let first = Command::from_byte(EVENT_ON);
        assert!(matches!(t.send_and_await_reply(first), Err(TransportError::Timeout)));
        assert_eq!(t.send_and_await_reply(first).unwrap(), ACK);
        // the second ack is now queued behind the one just consumed
        thread::sleep(Duration::from_millis(20));
        let next = Command::from_byte(EVENT_OFF);
        assert!(matches!(t.send_and_await_reply(next), Err(TransportError::Timeout)));
        assert_eq!(server.join().unwrap(), EVENT_OFF);
    }

    #[test]
    fn refused_port_surfaces_as_io_error() {
        let port = {
            let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let mut t = UdpTransport::open("127.0.0.1", port, Some(Duration::from_secs(2))).unwrap();
        match t.send_and_await_reply(Command::from_byte(EVENT_ON)) {
            Err(TransportError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionRefused),
            other => panic!("expected a refused link, got {:?}", other),
        }
    }
}
