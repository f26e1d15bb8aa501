//! Requested output state and the one-byte wire command derived from it.
//!
//! Wire alphabet (shared with the actuator service):
//! `'1'` sync on, `'2'` sync off, `'A'` event on, `'D'` event off,
//! `'X'` shutdown, `'Y'` acknowledgment.
//! A command carries only the flags that changed; when both flags change in
//! the same cycle their bytes are OR-ed into a single datagram.

use std::fmt;

pub const SYNC_ON: u8 = b'1';
pub const SYNC_OFF: u8 = b'2';
pub const EVENT_ON: u8 = b'A';
pub const EVENT_OFF: u8 = b'D';
pub const SHUTDOWN: u8 = b'X';
pub const ACK: u8 = b'Y';

/// Tri-state output request plus revision counter.
///
/// Replaced, never mutated in place, on every accepted producer update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    pub event_on: bool,
    pub sync_on: bool,
    pub shutdown_requested: bool,
    pub revision: u64,
}

impl StateSnapshot {
    pub const fn initial() -> Self {
        Self {
            event_on: false,
            sync_on: false,
            shutdown_requested: false,
            revision: 0,
        }
    }

    pub fn with_event(self, event_on: bool) -> Self {
        Self { event_on, ..self }
    }

    pub fn with_sync(self, sync_on: bool) -> Self {
        Self { sync_on, ..self }
    }

    pub fn with_shutdown(self) -> Self {
        Self { shutdown_requested: true, ..self }
    }

    /// Same output lines, ignoring revision and shutdown.
    pub fn equivalent(&self, other: &StateSnapshot) -> bool {
        self.event_on == other.event_on && self.sync_on == other.sync_on
    }

    /// Differs in any of the three flags.
    pub fn differs_from(&self, other: &StateSnapshot) -> bool {
        !self.equivalent(other) || self.shutdown_requested != other.shutdown_requested
    }
}

impl fmt::Display for StateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "State(rev={},event={},sync={},shutdown={})",
            self.revision, self.event_on, self.sync_on, self.shutdown_requested
        )
    }
}

/// One wire byte: the OR of the per-flag codes that changed, or `SHUTDOWN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command(u8);

/// What a received command byte asks the actuator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decoded {
    pub event: Option<bool>,
    pub sync: Option<bool>,
    pub shutdown: bool,
}

impl Command {
    pub const EMPTY: Command = Command(0);
    pub const SHUTDOWN: Command = Command(SHUTDOWN);

    /// Minimal diff from `last` (what the peer has) to `next` (what is requested).
    ///
    /// Shutdown is not part of the diff; the loop handles it separately.
    pub fn diff(last: &StateSnapshot, next: &StateSnapshot) -> Command {
        Self::encode(
            (next.event_on != last.event_on).then_some(next.event_on),
            (next.sync_on != last.sync_on).then_some(next.sync_on),
        )
    }

    /// Builds the byte for an optional event change and an optional sync change.
    pub fn encode(event: Option<bool>, sync: Option<bool>) -> Command {
        let mut byte = 0u8;
        if let Some(on) = event {
            byte |= if on { EVENT_ON } else { EVENT_OFF };
        }
        if let Some(on) = sync {
            byte |= if on { SYNC_ON } else { SYNC_OFF };
        }
        Command(byte)
    }

    /// Inverts `encode`. `None` for bytes outside the alphabet.
    pub fn decode(byte: u8) -> Option<Decoded> {
        if byte == SHUTDOWN {
            return Some(Decoded { shutdown: true, ..Decoded::default() });
        }
        if byte == 0 {
            return None;
        }
        const CHANGES: [Option<bool>; 3] = [None, Some(true), Some(false)];
        for event in CHANGES {
            for sync in CHANGES {
                if Self::encode(event, sync).0 == byte {
                    return Some(Decoded { event, sync, shutdown: false });
                }
            }
        }
        None
    }

    pub fn from_byte(byte: u8) -> Command {
        Command(byte)
    }

    #[inline]
    pub fn byte(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_shutdown(self) -> bool {
        self.0 == SHUTDOWN
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_ascii_graphic() {
            write!(f, "'{}'", self.0 as char)
        } else {
            write!(f, "0x{:02x}", self.0)
        }
    }
}
