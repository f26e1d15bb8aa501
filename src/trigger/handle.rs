//! handle.rs
//! Public façade of the trigger subsystem.
//!
//! - constructing a handle spawns the dispatch thread at ThreadPriority::Max
//! - `set_event`/`set_sync` only touch the register mutex; never network I/O
//! - `shutdown` flags the register, then waits (bounded) for the thread to exit
//!
//! One handle per session, shared by reference (or `Arc`) with every producer.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{Receiver, RecvTimeoutError, bounded};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::link::{
    dispatch_loop::{DispatchLoop, LoopPhase, LoopReport, PhaseCell},
    transport::{DatagramTransport, UdpTransport},
};
use crate::trigger::{register::SharedStateRegister, state::StateSnapshot};
use crate::utils::{
    config::DispatchConfig,
    error::{ConnectError, DispatchError},
};

const THREAD_NAME: &str = "fastevent-dispatch";

struct Worker {
    join: JoinHandle<LoopReport>,
    // disconnects when the dispatch thread exits, even on panic
    done: Receiver<()>,
}

pub struct DispatchHandle {
    register: Arc<SharedStateRegister>,
    phase: Arc<PhaseCell>,
    worker: Mutex<Option<Worker>>,
    shutdown_timeout: Option<Duration>,
}

impl DispatchHandle {
    /// Starts the subsystem against the UDP peer named in `config`.
    pub fn spawn(config: DispatchConfig) -> Result<Self, DispatchError> {
        let host = config.host.clone();
        let port = config.port;
        let reply_timeout = config.reply_timeout;
        Self::spawn_with(config, move || UdpTransport::open(&host, port, reply_timeout))
    }

    /// Starts the subsystem with a custom transport.
    ///
    /// `connect` runs on the dispatch thread, so the transport never crosses threads
    /// after it is opened.
    pub fn spawn_with<T, C>(config: DispatchConfig, connect: C) -> Result<Self, DispatchError>
    where
        T: DatagramTransport + 'static,
        C: FnOnce() -> Result<T, ConnectError> + Send + 'static,
    {
        let register = Arc::new(SharedStateRegister::new());
        let phase = Arc::new(PhaseCell::new());
        let shutdown_timeout = config.shutdown_timeout;
        let (done_tx, done_rx) = bounded::<()>(1);

        let loop_register = register.clone();
        let loop_phase = phase.clone();
        let join = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn_with_priority(ThreadPriority::Max, move |priority| {
                if let Err(e) = priority {
                    warn!("[DispatchHandle] could not raise dispatch thread priority: {:?}", e);
                }
                if let Some(core) = config.pin_core {
                    pin_current_thread(core);
                }
                let report = DispatchLoop::start_observed(loop_register, connect, config, loop_phase).run();
                let _ = done_tx.send(());
                report
            })
            .map_err(DispatchError::Spawn)?;

        info!("[DispatchHandle] dispatch thread started");
        Ok(Self {
            register,
            phase,
            worker: Mutex::new(Some(Worker { join, done: done_rx })),
            shutdown_timeout,
        })
    }

    /// Requests the EVENT line. Never blocks on I/O.
    #[inline]
    pub fn set_event(&self, on: bool) {
        self.register.update(|s| s.with_event(on));
    }

    /// Requests the SYNC line. Never blocks on I/O.
    #[inline]
    pub fn set_sync(&self, on: bool) {
        self.register.update(|s| s.with_sync(on));
    }

    /// Latest requested state (not necessarily delivered yet).
    pub fn requested(&self) -> StateSnapshot {
        self.register.snapshot()
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase.get()
    }

    /// True once the dispatch thread has exited, whether by shutdown or by a transport failure.
    pub fn is_terminated(&self) -> bool {
        self.phase.get() == LoopPhase::Terminated
            || self
                .worker
                .lock()
                .as_ref()
                .is_none_or(|w| w.join.is_finished())
    }

    /// Flags shutdown and waits for the dispatch thread to terminate.
    ///
    /// Returns the loop's report. A second call fails with `AlreadyShutdown`;
    /// a thread that outlives `shutdown_timeout` yields `ShutdownTimedOut` and is
    /// left detached.
    pub fn shutdown(&self) -> Result<LoopReport, DispatchError> {
        let worker = self.worker.lock().take().ok_or(DispatchError::AlreadyShutdown)?;
        self.register.update(|s| s.with_shutdown());
        debug!("[DispatchHandle] shutdown requested");

        let finished = match self.shutdown_timeout {
            Some(timeout) => match worker.done.recv_timeout(timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                Err(RecvTimeoutError::Timeout) => false,
            },
            None => {
                let _ = worker.done.recv();
                true
            }
        };
        if !finished {
            error!(
                "[DispatchHandle] dispatch thread still running after {:?}; detaching it",
                self.shutdown_timeout
            );
            return Err(DispatchError::ShutdownTimedOut);
        }

        worker.join.join().map_err(|_| DispatchError::WorkerPanicked)
    }
}

impl Drop for DispatchHandle {
    fn drop(&mut self) {
        if self.worker.get_mut().is_some() {
            if let Err(e) = self.shutdown() {
                error!("[DispatchHandle] shutdown on drop failed: {}", e);
            }
        }
    }
}

fn pin_current_thread(core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(core_id) if core_affinity::set_for_current(*core_id) => {
            info!("[DispatchHandle] dispatch thread pinned to core {}", core);
        }
        Some(_) => error!("[DispatchHandle] failed to pin dispatch thread to core {}", core),
        None => error!("[DispatchHandle] core {} not found among available cores", core),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::state::Command;
    use crate::utils::error::TransportError;
    use std::time::Instant;

    struct EchoAck;

    impl DatagramTransport for EchoAck {
        fn send_and_await_reply(&mut self, _command: Command) -> Result<u8, TransportError> {
            Ok(b'Y')
        }
        fn send(&mut self, _command: Command) -> Result<(), TransportError> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    /// Never replies: models a peer that swallows datagrams with no receive timeout.
    struct BlackHole;

    impl DatagramTransport for BlackHole {
        fn send_and_await_reply(&mut self, _command: Command) -> Result<u8, TransportError> {
            thread::sleep(Duration::from_secs(3600));
            Ok(b'Y')
        }
        fn send(&mut self, _command: Command) -> Result<(), TransportError> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    fn wait_for(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn second_shutdown_is_rejected() {
        let handle = DispatchHandle::spawn_with(DispatchConfig::default(), || Ok(EchoAck)).unwrap();
        handle.set_event(true);
        let report = handle.shutdown().unwrap();
        assert!(report.shutdown_sent);
        assert!(handle.is_terminated());
        assert!(matches!(handle.shutdown(), Err(DispatchError::AlreadyShutdown)));
    }

    #[test]
    fn requests_are_visible_immediately() {
        let handle = DispatchHandle::spawn_with(DispatchConfig::default(), || Ok(EchoAck)).unwrap();
        handle.set_sync(true);
        handle.set_event(true);
        handle.set_event(true);
        let s = handle.requested();
        assert!(s.sync_on && s.event_on);
        assert_eq!(s.revision, 2);
        handle.shutdown().unwrap();
    }

    #[test]
    fn stuck_peer_is_bounded_by_shutdown_timeout() {
        let config = DispatchConfig::default().with_shutdown_timeout(Some(Duration::from_millis(100)));
        let handle = DispatchHandle::spawn_with(config, || Ok(BlackHole)).unwrap();
        handle.set_event(true);
        wait_for(|| handle.phase() == LoopPhase::AwaitingReply);
        assert!(matches!(handle.shutdown(), Err(DispatchError::ShutdownTimedOut)));
        assert!(matches!(handle.shutdown(), Err(DispatchError::AlreadyShutdown)));
    }

    #[test]
    fn drop_shuts_down() {
        let phase = {
            let handle = DispatchHandle::spawn_with(DispatchConfig::default(), || Ok(EchoAck)).unwrap();
            handle.set_event(true);
            handle.phase.clone()
        };
        assert_eq!(phase.get(), LoopPhase::Terminated);
    }
}
