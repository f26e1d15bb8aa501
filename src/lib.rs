//! # FastEvent trigger dispatch
//!
//! Low-latency delivery of evaluation results to an external actuator.
//!
//! Producers (per-packet evaluation code) call `set_event`/`set_sync` on a
//! [`DispatchHandle`]. A dedicated max-priority thread picks up the latest
//! requested state, sends only what changed as a single UDP byte, waits for
//! the peer's acknowledgment and profiles the round trip. `shutdown()` sends
//! the terminal byte and joins the thread.
//!
//! ## Modules
//! - `trigger`: state snapshot, shared register, public handle.
//! - `link`: datagram transport and the dispatch loop state machine.
//! - `peer`: actuator-side service (dummy driver, test peer).
//! - `utils`: configuration, errors, latency profiling, transaction log.

pub mod link;
pub mod peer;
pub mod trigger;
pub mod utils;

pub use link::dispatch_loop::{DispatchLoop, ExitReason, LoopPhase, LoopReport};
pub use link::transport::{DatagramTransport, UdpTransport};
pub use trigger::{handle::DispatchHandle, register::SharedStateRegister, state::{Command, StateSnapshot}};
pub use utils::{config::DispatchConfig, error::{ConfigError, ConnectError, DispatchError, TransportError}};
