//! dispatch_loop.rs
//! Consumer side of the trigger pipeline: turns requested-state changes into wire commands.
//!
//! STARTING → WAITING → SENDING → AWAITING_REPLY → (WAITING | TERMINATING) → TERMINATED
//!
//! - waits on the shared register (condvar, no polling)
//! - sends only the flags that changed since the last acknowledged state
//! - profiles each request/reply round trip
//! - fail-stop on transport errors; SHUTDOWN byte is sent best-effort on the way out
//!
//! Everything here is owned by the dispatch thread. Nothing is shared except the register.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Instant,
};

use log::{debug, error, info, trace, warn};

use crate::link::transport::DatagramTransport;
use crate::trigger::{
    register::SharedStateRegister,
    state::{ACK, Command, StateSnapshot},
};
use crate::utils::{
    config::DispatchConfig,
    error::{ConnectError, TransportError},
    latency::LatencyProfiler,
    transaction_log::TransactionLog,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Starting,
    Waiting,
    Sending,
    AwaitingReply,
    Terminating,
    Terminated,
}

impl LoopPhase {
    const ALL: [LoopPhase; 6] = [
        LoopPhase::Starting,
        LoopPhase::Waiting,
        LoopPhase::Sending,
        LoopPhase::AwaitingReply,
        LoopPhase::Terminating,
        LoopPhase::Terminated,
    ];
}

/// Lets other threads observe the loop's phase without touching loop state.
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(LoopPhase::Starting as u8))
    }

    pub fn get(&self) -> LoopPhase {
        LoopPhase::ALL[self.0.load(Ordering::Acquire) as usize]
    }

    fn set(&self, phase: LoopPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A producer called `shutdown()`.
    Shutdown,
    /// An exchange failed (after retries); the actuator link is gone for this session.
    TransportFailed,
}

/// What the loop hands back when its thread exits.
#[derive(Debug, Clone)]
pub struct LoopReport {
    pub exit: ExitReason,
    /// Commands acknowledged by the peer.
    pub commands_sent: u64,
    /// Commands that could not be sent because the transport never opened.
    pub commands_dropped: u64,
    pub shutdown_sent: bool,
    pub last_observed: StateSnapshot,
    pub profiler: LatencyProfiler,
}

pub struct DispatchLoop<T: DatagramTransport> {
    register: Arc<SharedStateRegister>,
    transport: Option<T>,
    config: DispatchConfig,
    phase: LoopPhase,
    phase_cell: Arc<PhaseCell>,
    exit: ExitReason,
    last_observed: StateSnapshot,
    profiler: LatencyProfiler,
    txlog: Option<TransactionLog>,
    epoch: Instant,
    commands_sent: u64,
    commands_dropped: u64,
}

impl<T: DatagramTransport> DispatchLoop<T> {
    /// STARTING: opens the transport through `connect`.
    ///
    /// A failed open is logged and leaves the loop without a transport; it still
    /// drains state changes so producers are never blocked.
    pub fn start<C>(register: Arc<SharedStateRegister>, connect: C, config: DispatchConfig) -> Self
    where
        C: FnOnce() -> Result<T, ConnectError>,
    {
        Self::start_observed(register, connect, config, Arc::new(PhaseCell::new()))
    }

    /// As `start`, publishing every phase change to `phase_cell`.
    pub fn start_observed<C>(
        register: Arc<SharedStateRegister>,
        connect: C,
        config: DispatchConfig,
        phase_cell: Arc<PhaseCell>,
    ) -> Self
    where
        C: FnOnce() -> Result<T, ConnectError>,
    {
        phase_cell.set(LoopPhase::Starting);
        let transport = match connect() {
            Ok(t) => Some(t),
            Err(e) => {
                error!(
                    "[DispatchLoop] failed to open link to {}: {}; triggers will not be delivered",
                    config.peer_address(),
                    e
                );
                None
            }
        };
        let txlog = config
            .transaction_log
            .as_deref()
            .and_then(TransactionLog::open_or_disable);

        phase_cell.set(LoopPhase::Waiting);
        Self {
            register,
            transport,
            config,
            phase: LoopPhase::Waiting,
            phase_cell,
            exit: ExitReason::Shutdown,
            last_observed: StateSnapshot::initial(),
            profiler: LatencyProfiler::new(),
            txlog,
            epoch: Instant::now(),
            commands_sent: 0,
            commands_dropped: 0,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn phase_cell(&self) -> Arc<PhaseCell> {
        self.phase_cell.clone()
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn last_observed(&self) -> StateSnapshot {
        self.last_observed
    }

    /// Runs until shutdown or transport failure, then tears down.
    pub fn run(mut self) -> LoopReport {
        info!("[DispatchLoop] running (link open: {})", self.has_transport());
        while self.step() != LoopPhase::Terminating {}
        self.terminate()
    }

    /// One dispatch cycle starting from WAITING.
    ///
    /// Blocks until the register changes, then sends the diff (if any) and
    /// returns the phase reached: `Waiting` to continue, `Terminating` to stop.
    pub fn step(&mut self) -> LoopPhase {
        if self.phase != LoopPhase::Waiting {
            return self.phase;
        }

        let next = self.register.wait_for_change(&self.last_observed);
        trace!("[DispatchLoop] woke with {} (last {})", next, self.last_observed);

        if next.shutdown_requested {
            debug!("[DispatchLoop] shutdown requested at rev {}", next.revision);
            self.set_phase(LoopPhase::Terminating);
            return self.phase;
        }

        let command = Command::diff(&self.last_observed, &next);
        if command.is_empty() {
            // unreachable through the register's no-op rule
            self.last_observed = next;
            return self.phase;
        }

        if self.transport.is_none() {
            warn!(
                "[DispatchLoop] no link to {}; dropping command {} (rev {})",
                self.config.peer_address(),
                command,
                next.revision
            );
            self.commands_dropped += 1;
            self.last_observed = next;
            return self.phase;
        }

        self.set_phase(LoopPhase::Sending);
        trace!("[DispatchLoop] sending {} for rev {}", command, next.revision);
        self.set_phase(LoopPhase::AwaitingReply);
        match self.exchange(command) {
            Ok((start, end)) => {
                if self.config.profile_latency {
                    self.profiler.record(end - start);
                }
                let (start_ns, end_ns) = (self.nanos_since_epoch(start), self.nanos_since_epoch(end));
                if let Some(log) = self.txlog.as_mut() {
                    log.record(&next, command, start_ns, end_ns);
                }
                self.commands_sent += 1;
                self.last_observed = next;
                self.set_phase(LoopPhase::Waiting);
            }
            Err(e) => {
                error!(
                    "[DispatchLoop] failed to communicate with {} (command {}): {}",
                    self.config.peer_address(),
                    command,
                    e
                );
                if let Some(t) = self.transport.as_mut() {
                    t.close();
                }
                self.transport = None;
                self.exit = ExitReason::TransportFailed;
                self.set_phase(LoopPhase::Terminating);
            }
        }
        self.phase
    }

    /// TERMINATING → TERMINATED: best-effort SHUTDOWN byte, close, report.
    pub fn terminate(mut self) -> LoopReport {
        self.set_phase(LoopPhase::Terminating);

        let mut shutdown_sent = false;
        if let Some(mut transport) = self.transport.take() {
            match transport.send(Command::SHUTDOWN) {
                Ok(()) => shutdown_sent = true,
                Err(e) => warn!("[DispatchLoop] failed to send shutdown byte: {}", e),
            }
            transport.close();
        }

        if self.config.profile_latency {
            self.profiler.report();
        }
        if let Some(log) = self.txlog.take() {
            log.finish();
        }

        self.set_phase(LoopPhase::Terminated);
        info!(
            "[DispatchLoop] terminated ({:?}): sent={} dropped={} shutdown_sent={}",
            self.exit, self.commands_sent, self.commands_dropped, shutdown_sent
        );

        LoopReport {
            exit: self.exit,
            commands_sent: self.commands_sent,
            commands_dropped: self.commands_dropped,
            shutdown_sent,
            last_observed: self.last_observed,
            profiler: self.profiler,
        }
    }

    /// Send + await reply, retried up to `max_retries` extra times.
    ///
    /// Returns the start and end of the attempt that succeeded; failed attempts
    /// are not part of the measured round trip.
    fn exchange(&mut self, command: Command) -> Result<(Instant, Instant), TransportError> {
        let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;
        let mut attempt = 0u32;
        loop {
            let start = Instant::now();
            let result = transport.send_and_await_reply(command).and_then(|reply| {
                if self.config.validate_ack && reply != ACK {
                    Err(TransportError::UnexpectedReply(reply))
                } else {
                    Ok(())
                }
            });
            match result {
                Ok(()) => return Ok((start, Instant::now())),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "[DispatchLoop] exchange of {} failed ({}); retry {}/{}",
                        command, e, attempt, self.config.max_retries
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn set_phase(&mut self, phase: LoopPhase) {
        self.phase = phase;
        self.phase_cell.set(phase);
    }

    fn nanos_since_epoch(&self, t: Instant) -> u64 {
        t.saturating_duration_since(self.epoch).as_nanos() as u64
    }
}
