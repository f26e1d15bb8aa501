//! Error types for the trigger dispatch subsystem.
//!
//! Producers never see any of these: `set_event`/`set_sync` are infallible.
//! Transport faults are absorbed inside the dispatch loop and only surface
//! through logging and the final `LoopReport`.

use std::io;
use thiserror::Error;

/// Failure to open the datagram transport.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to resolve host: {0}")]
    HostResolution(String),

    #[error("host {0} resolved to no usable address")]
    NoAddress(String),

    #[error("failed to set up socket: {0}")]
    Socket(#[from] io::Error),
}

/// Failure of a single request/reply exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("datagram I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("no reply from peer before the timeout")]
    Timeout,

    #[error("unexpected reply byte 0x{0:02x}")]
    UnexpectedReply(u8),
}

impl TransportError {
    /// Maps a receive error to `Timeout` when it is the socket's read timeout firing.
    pub fn from_recv(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout,
            _ => TransportError::Io(err),
        }
    }
}

/// Failures of the public `DispatchHandle` façade.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("dispatch subsystem was already shut down")]
    AlreadyShutdown,

    #[error("dispatch thread did not terminate within the shutdown timeout")]
    ShutdownTimedOut,

    #[error("dispatch thread panicked")]
    WorkerPanicked,
}

/// Invalid environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}
