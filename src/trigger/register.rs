//! Mailbox holding the latest requested `StateSnapshot`.
//!
//! Producers write through `update`; the single dispatch thread blocks in
//! `wait_for_change`. Only the current snapshot is kept, so rapid flips
//! coalesce into the net change seen at the next wake-up.
//!
//! One mutex guards the snapshot; the condvar is only ever waited on by the
//! dispatch thread.

use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::trigger::state::StateSnapshot;

pub struct SharedStateRegister {
    current: Mutex<StateSnapshot>,
    changed: Condvar,
}

impl Default for SharedStateRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStateRegister {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(StateSnapshot::initial()),
            changed: Condvar::new(),
        }
    }

    /// Applies `mutator` to the current snapshot.
    ///
    /// The candidate replaces the current snapshot (with a bumped revision) and
    /// wakes the consumer only if one of the three flags differs. Returns
    /// whether the update was accepted.
    pub fn update<F>(&self, mutator: F) -> bool
    where
        F: FnOnce(StateSnapshot) -> StateSnapshot,
    {
        let mut current = self.current.lock();
        let candidate = mutator(*current);
        if !candidate.differs_from(&current) {
            return false;
        }
        *current = StateSnapshot {
            revision: current.revision + 1,
            ..candidate
        };
        trace!("[Register] accepted {}", *current);
        self.changed.notify_one();
        true
    }

    /// Blocks until the requested output lines differ from `last_observed`,
    /// or shutdown was newly requested. Returns a copy of the new snapshot.
    pub fn wait_for_change(&self, last_observed: &StateSnapshot) -> StateSnapshot {
        let mut current = self.current.lock();
        while !Self::changed_since(&current, last_observed) {
            self.changed.wait(&mut current);
        }
        *current
    }

    /// Copy of the current request.
    pub fn snapshot(&self) -> StateSnapshot {
        *self.current.lock()
    }

    fn changed_since(current: &StateSnapshot, last_observed: &StateSnapshot) -> bool {
        !current.equivalent(last_observed)
            || (current.shutdown_requested && !last_observed.shutdown_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{RecvTimeoutError, bounded};
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn accepted_updates_bump_revision() {
        let reg = SharedStateRegister::new();
        assert!(reg.update(|s| s.with_event(true)));
        assert!(reg.update(|s| s.with_sync(true)));
        assert!(reg.update(|s| s.with_shutdown()));
        let s = reg.snapshot();
        assert_eq!(s.revision, 3);
        assert!(s.event_on && s.sync_on && s.shutdown_requested);
    }

    #[test]
    fn no_op_updates_are_rejected() {
        let reg = SharedStateRegister::new();
        assert!(!reg.update(|s| s.with_event(false)));
        assert!(reg.update(|s| s.with_event(true)));
        assert!(!reg.update(|s| s.with_event(true)));
        // a mutator cannot smuggle in its own revision
        assert!(!reg.update(|s| StateSnapshot { revision: 100, ..s }));
        assert_eq!(reg.snapshot().revision, 1);
    }

    #[test]
    fn flip_and_flip_back_bumps_twice_but_nets_nothing() {
        let reg = Arc::new(SharedStateRegister::new());
        let observed = reg.snapshot();
        reg.update(|s| s.with_event(true));
        reg.update(|s| s.with_event(false));
        assert_eq!(reg.snapshot().revision, 2);

        let (tx, rx) = bounded(1);
        let waiter = {
            let reg = reg.clone();
            thread::spawn(move || {
                let _ = tx.send(reg.wait_for_change(&observed));
            })
        };
        assert_eq!(rx.recv_timeout(Duration::from_millis(20)), Err(RecvTimeoutError::Timeout));

        reg.update(|s| s.with_shutdown());
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap().shutdown_requested);
        waiter.join().unwrap();
    }

    #[test]
    fn wait_returns_immediately_when_already_changed() {
        let reg = SharedStateRegister::new();
        let observed = reg.snapshot();
        reg.update(|s| s.with_sync(true));
        let s = reg.wait_for_change(&observed);
        assert!(s.sync_on);
        assert_eq!(s.revision, 1);
    }

    #[test]
    fn shutdown_wakes_waiter_even_without_flag_change() {
        let reg = Arc::new(SharedStateRegister::new());
        let observed = reg.snapshot();
        let waiter = {
            let reg = reg.clone();
            thread::spawn(move || reg.wait_for_change(&observed))
        };
        thread::sleep(Duration::from_millis(20));
        reg.update(|s| s.with_shutdown());
        let s = waiter.join().unwrap();
        assert!(s.shutdown_requested);
        assert!(s.equivalent(&observed));
    }

    #[test]
    fn concurrent_producers_never_lose_revisions() {
        let reg = Arc::new(SharedStateRegister::new());
        let producers: Vec<_> = (0..4)
            .map(|id| {
                let reg = reg.clone();
                thread::spawn(move || {
                    let mut accepted = 0u64;
                    for i in 0..500 {
                        let on = (i + id) % 2 == 0;
                        let ok = if id % 2 == 0 {
                            reg.update(|s| s.with_event(on))
                        } else {
                            reg.update(|s| s.with_sync(on))
                        };
                        accepted += ok as u64;
                    }
                    accepted
                })
            })
            .collect();
        let total: u64 = producers.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(reg.snapshot().revision, total);
    }
}
