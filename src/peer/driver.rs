//! Output drivers: what the actuator service does with decoded commands.

use log::info;

/// Receives the decoded output lines. Implementations drive real hardware or just record.
pub trait OutputDriver {
    fn sync(&mut self, on: bool);
    fn event(&mut self, on: bool);
    fn shutdown(&mut self) {}
}

/// Logs every line change; stands in for hardware during bring-up and tests.
#[derive(Debug, Default)]
pub struct LoggingDriver {
    pub sync_on: bool,
    pub event_on: bool,
}

impl OutputDriver for LoggingDriver {
    fn sync(&mut self, on: bool) {
        self.sync_on = on;
        info!("[LoggingDriver] sync -> {}", on);
    }

    fn event(&mut self, on: bool) {
        self.event_on = on;
        info!("[LoggingDriver] event -> {}", on);
    }

    fn shutdown(&mut self) {
        info!("[LoggingDriver] shutting down");
    }
}
