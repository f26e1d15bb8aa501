//! Stand-alone dummy actuator service.
//!
//! Binds `FASTEVENT_PEER_BIND` (default `127.0.0.1:<FASTEVENT_PORT or 11666>`),
//! logs every decoded EVENT/SYNC change and acknowledges each command.
//! Exits when the dispatch side sends SHUTDOWN.

use std::process::ExitCode;

use fastevent_trigger::{
    DispatchConfig,
    peer::{driver::LoggingDriver, service::ActuatorPeer},
};
use log::{error, info};

fn main() -> ExitCode {
    env_logger::init();

    let config = match DispatchConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let bind = std::env::var("FASTEVENT_PEER_BIND").unwrap_or_else(|_| format!("127.0.0.1:{}", config.port));

    let peer = match ActuatorPeer::bind(&bind) {
        Ok(p) => p,
        Err(e) => {
            error!("failed to bind {}: {}", bind, e);
            return ExitCode::FAILURE;
        }
    };
    println!("dummy peer listening on {}", bind);

    let mut driver = LoggingDriver::default();
    match peer.run(&mut driver) {
        Ok(report) => {
            info!("peer report: {:?}", report);
            println!(
                "handled {} commands ({} event, {} sync, {} unknown)",
                report.commands, report.event_changes, report.sync_changes, report.unknown
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("peer failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
