//! # FastEvent trigger console
//! Operator console for the trigger dispatch subsystem.
//!
//! Starts a `DispatchHandle` against the configured actuator peer and lets the
//! operator drive the EVENT/SYNC lines by hand, fire random bursts, or run a
//! paced pulse train to measure round-trip latency.
//!
//! ## Configuration
//! - `FASTEVENT_HOST` / `FASTEVENT_PORT`: actuator peer (default `localhost:11666`).
//! - `FASTEVENT_REPLY_TIMEOUT_MS`, `FASTEVENT_MAX_RETRIES`, `FASTEVENT_VALIDATE_ACK`.
//! - `FASTEVENT_TRANSACTION_LOG`: CSV file with one row per round trip.
//! - `RUST_LOG`: log verbosity.
//!
//! Pair it with the `dummy_peer` binary for a local loopback setup.

use std::{
    io::{Write, stdin, stdout},
    process::ExitCode,
    time::{Duration, Instant},
};

use fastevent_trigger::{DispatchConfig, DispatchHandle, ExitReason};
use log::{error, info};
use rand::random_range;
use spin_sleep::{SpinSleeper, SpinStrategy};

const DEFAULT_BURST: usize = 100;
const DEFAULT_PULSES: usize = 200;
const DEFAULT_PULSE_PERIOD_US: u64 = 2_000;

fn main() -> ExitCode {
    env_logger::init();
    info!("=== FASTEVENT TRIGGER START ===");

    let config = match DispatchConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("actuator peer: {}", config.peer_address());

    let handle = match DispatchHandle::spawn(config) {
        Ok(h) => h,
        Err(e) => {
            error!("failed to start dispatch subsystem: {}", e);
            return ExitCode::FAILURE;
        }
    };

    loop {
        if handle.is_terminated() {
            println!("Dispatch link is down; shutting down.");
            break;
        }
        match prompt_menu().as_str() {
            "1" => handle.set_event(true),
            "2" => handle.set_event(false),
            "3" => handle.set_sync(true),
            "4" => handle.set_sync(false),
            "5" => {
                let n = prompt_usize("Number of random commands", DEFAULT_BURST);
                random_burst(&handle, n);
            }
            "6" => {
                let n = prompt_usize("Number of pulses", DEFAULT_PULSES);
                let period = prompt_usize("Pulse period in µs", DEFAULT_PULSE_PERIOD_US as usize);
                pulse_train(&handle, n, Duration::from_micros(period as u64));
            }
            "7" | "" => break,
            other => println!("Unrecognized option '{}', please try again.", other),
        }
        println!("requested: {}", handle.requested());
    }

    match handle.shutdown() {
        Ok(report) => {
            println!(
                "Session ended ({:?}): {} commands acknowledged, {} dropped.",
                report.exit, report.commands_sent, report.commands_dropped
            );
            info!("=== FASTEVENT TRIGGER FINISHED ===");
            if report.exit == ExitReason::TransportFailed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("shutdown failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn prompt_menu() -> String {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│     FASTEVENT TRIGGER CONSOLE               │");
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) EVENT on                                │");
    println!("│  2) EVENT off                               │");
    println!("│  3) SYNC on                                 │");
    println!("│  4) SYNC off                                │");
    println!("│  5) Random burst                            │");
    println!("│  6) Pulse train (event toggles)             │");
    println!("│  7) Exit                                    │");
    println!("└─────────────────────────────────────────────┘");
    print!("Select [1-7] (default: 7): ");
    let _ = stdout().flush();

    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().to_string()
}

fn prompt_usize(label: &str, default: usize) -> usize {
    print!("{} [default: {}]: ", label, default);
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().parse::<usize>().unwrap_or(default)
}

/// Random sync/event requests as fast as the caller can issue them.
/// Most of them coalesce; only net changes reach the wire.
fn random_burst(handle: &DispatchHandle, n: usize) {
    let start = Instant::now();
    for _ in 0..n {
        match random_range(0..4) {
            0 => handle.set_sync(true),
            1 => handle.set_sync(false),
            2 => handle.set_event(true),
            _ => handle.set_event(false),
        }
    }
    println!("issued {} requests in {:?}", n, start.elapsed());
}

/// Periodic event toggles with spin-assisted sleeping for a steady cadence.
fn pulse_train(handle: &DispatchHandle, n: usize, period: Duration) {
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
    let mut next_release = Instant::now() + period;
    let mut on = handle.requested().event_on;

    for _ in 0..n {
        on = !on;
        handle.set_event(on);

        let now = Instant::now();
        if now < next_release {
            sleeper.sleep(next_release - now);
        }
        next_release += period;
    }
    println!("sent {} pulses at {:?} period", n, period);
}
