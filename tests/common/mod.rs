//! Shared fixtures for the loopback tests.

#![allow(dead_code)]

use std::{
    net::UdpSocket,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{Receiver, Sender, unbounded};
use fastevent_trigger::DispatchConfig;

pub const WAIT: Duration = Duration::from_secs(2);

/// Loopback actuator stand-in: forwards every received byte to the test and acks it.
pub struct RecordingPeer {
    pub port: u16,
    pub received: Receiver<u8>,
    thread: Option<JoinHandle<()>>,
}

impl RecordingPeer {
    /// Acks with `'Y'` and stops after SHUTDOWN.
    pub fn start() -> Self {
        Self::start_with_reply(Some(b'Y'))
    }

    /// `None` never replies (the dispatch side will hit its reply timeout).
    pub fn start_with_reply(reply: Option<u8>) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind recording peer");
        socket
            .set_read_timeout(Some(Duration::from_secs(10)))
            .expect("peer read timeout");
        let port = socket.local_addr().expect("peer addr").port();
        let (tx, rx) = unbounded();
        let thread = thread::spawn(move || serve(socket, reply, tx));
        Self { port, received: rx, thread: Some(thread) }
    }

    pub fn config(&self) -> DispatchConfig {
        DispatchConfig::default()
            .with_peer("127.0.0.1", self.port)
            .with_reply_timeout(Some(Duration::from_millis(500)))
    }

    /// Next byte the peer saw, or `None` if nothing arrived within `WAIT`.
    pub fn next(&self) -> Option<u8> {
        self.received.recv_timeout(WAIT).ok()
    }

    /// Everything received until the peer thread exits.
    pub fn drain(mut self) -> Vec<u8> {
        if let Some(t) = self.thread.take() {
            t.join().expect("peer thread panicked");
        }
        self.received.try_iter().collect()
    }
}

fn serve(socket: UdpSocket, reply: Option<u8>, tx: Sender<u8>) {
    let mut buf = [0u8; 32];
    while let Ok((n, from)) = socket.recv_from(&mut buf) {
        if n == 0 {
            continue;
        }
        let byte = buf[0];
        let _ = tx.send(byte);
        if let Some(r) = reply {
            let _ = socket.send_to(&[r], from);
        }
        if byte == b'X' {
            break;
        }
    }
}

/// A port nothing listens on: bound then released.
pub fn unused_port() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind probe");
    socket.local_addr().expect("probe addr").port()
}
