//! Optional per-transaction CSV log written by the dispatch thread.
//!
//! One row per completed round trip: revision, start/end (ns since the loop
//! started), resulting sync/event state and the command byte sent. Costs a
//! buffered write per transaction, so it is off unless configured.

use std::{
    fs::{File, create_dir_all},
    io::BufWriter,
    path::Path,
};

use csv::Writer;
use log::{debug, error};
use serde::Serialize;

use crate::trigger::state::{Command, StateSnapshot};

#[derive(Debug, Serialize)]
struct TransactionRow {
    revision: u64,
    start_ns: u64,
    end_ns: u64,
    sync: bool,
    event: bool,
    command: String,
}

pub struct TransactionLog {
    wtr: Writer<BufWriter<File>>,
    rows: u64,
}

impl TransactionLog {
    /// Creates (truncating) the CSV file, creating parent directories as needed.
    pub fn create(path: &Path) -> Result<Self, csv::Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let wtr = Writer::from_writer(BufWriter::new(file));
        Ok(Self { wtr, rows: 0 })
    }

    /// Opens the log or logs why it could not be opened.
    pub fn open_or_disable(path: &Path) -> Option<Self> {
        match Self::create(path) {
            Ok(log) => {
                debug!("[TransactionLog] writing to {:?}", path);
                Some(log)
            }
            Err(e) => {
                error!("[TransactionLog] failed to open {:?}: {}; transaction logging disabled", path, e);
                None
            }
        }
    }

    pub fn record(&mut self, state: &StateSnapshot, command: Command, start_ns: u64, end_ns: u64) {
        let row = TransactionRow {
            revision: state.revision,
            start_ns,
            end_ns,
            sync: state.sync_on,
            event: state.event_on,
            command: command.to_string(),
        };
        if let Err(e) = self.wtr.serialize(&row) {
            error!("[TransactionLog] failed to write row: {}", e);
            return;
        }
        self.rows += 1;
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flushes buffered rows.
    pub fn finish(mut self) {
        if let Err(e) = self.wtr.flush() {
            error!("[TransactionLog] flush failed: {}", e);
        }
        debug!("[TransactionLog] closed after {} rows", self.rows);
    }
}
